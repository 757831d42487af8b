use std::path::PathBuf;
use thiserror::Error;

/// Failures that callers are expected to tell apart. They travel inside
/// `anyhow::Error`; use `err.downcast_ref::<AnnDataError>()` to classify.
#[derive(Debug, Error)]
pub enum AnnDataError {
    /// An element does not fit the axis it is attached to.
    #[error("{axis} axis mismatch: expected length {expected}, got {got}")]
    AxisMismatch {
        axis: String,
        expected: usize,
        got: usize,
    },

    #[error("destination '{}' is unavailable: {reason}", .path.display())]
    DestinationUnavailable { path: PathBuf, reason: String },

    #[error("cannot convert {from} to {to}")]
    UnsupportedConversion { from: String, to: String },

    /// Stored content violates an internal invariant.
    #[error("corrupt store content: {0}")]
    Corrupt(String),

    #[error("'{}' not found", .0.display())]
    NotFound(PathBuf),
}

impl AnnDataError {
    pub fn axis_mismatch(axis: impl Into<String>, expected: usize, got: usize) -> Self {
        Self::AxisMismatch {
            axis: axis.into(),
            expected,
            got,
        }
    }

    pub fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::DestinationUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unsupported(from: impl ToString, to: impl ToString) -> Self {
        Self::UnsupportedConversion {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn corrupt(msg: impl ToString) -> Self {
        Self::Corrupt(msg.to_string())
    }

    /// Returns the classified error behind `err`, if any.
    pub fn of(err: &anyhow::Error) -> Option<&AnnDataError> {
        err.downcast_ref()
    }
}
