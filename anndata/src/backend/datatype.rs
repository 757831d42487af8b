use crate::data::{DynArray, DynScalar};

use anyhow::{bail, Result};
use core::fmt::{Debug, Display, Formatter};
use ndarray::{Array, ArrayD, Dimension};
use serde::{Deserialize, Serialize};

/// All data types that can be stored in an AnnData object.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataType {
    Array(ScalarType),
    Categorical,
    CsrMatrix(ScalarType),
    CscMatrix(ScalarType),
    DataFrame,
    Scalar(ScalarType),
    Mapping,
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Array(t) => write!(f, "Array({})", t),
            DataType::Categorical => write!(f, "Categorical"),
            DataType::CsrMatrix(t) => write!(f, "CsrMatrix({})", t),
            DataType::CscMatrix(t) => write!(f, "CscMatrix({})", t),
            DataType::DataFrame => write!(f, "DataFrame"),
            DataType::Scalar(t) => write!(f, "Scalar({})", t),
            DataType::Mapping => write!(f, "Mapping"),
        }
    }
}

/// All scalar types that are supported in an AnnData object. Platform-width
/// integers have no variant of their own: they are stored as 64-bit values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    String,
}

impl ScalarType {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, ScalarType::Bool | ScalarType::String)
    }

    pub fn is_integer(&self) -> bool {
        self.is_numeric() && !matches!(self, ScalarType::F32 | ScalarType::F64)
    }
}

impl Display for ScalarType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarType::I8 => write!(f, "i8"),
            ScalarType::I16 => write!(f, "i16"),
            ScalarType::I32 => write!(f, "i32"),
            ScalarType::I64 => write!(f, "i64"),
            ScalarType::U8 => write!(f, "u8"),
            ScalarType::U16 => write!(f, "u16"),
            ScalarType::U32 => write!(f, "u32"),
            ScalarType::U64 => write!(f, "u64"),
            ScalarType::F32 => write!(f, "f32"),
            ScalarType::F64 => write!(f, "f64"),
            ScalarType::Bool => write!(f, "bool"),
            ScalarType::String => write!(f, "string"),
        }
    }
}

/// Element types a backend knows how to store.
pub trait BackendData: Send + Sync + Clone + Default + PartialEq + Debug + 'static {
    const DTYPE: ScalarType;

    fn into_dyn(&self) -> DynScalar;
    fn from_dyn(x: DynScalar) -> Result<Self>;
    fn into_dyn_arr<D: Dimension>(arr: Array<Self, D>) -> DynArray;
    fn from_dyn_arr(x: DynArray) -> Result<ArrayD<Self>>;
}

macro_rules! impl_backend_data {
    ($($ty:ty, $variant:ident),*) => {
        $(
            impl BackendData for $ty {
                const DTYPE: ScalarType = ScalarType::$variant;

                fn into_dyn(&self) -> DynScalar {
                    DynScalar::$variant(self.clone())
                }

                fn from_dyn(x: DynScalar) -> Result<Self> {
                    match x {
                        DynScalar::$variant(x) => Ok(x),
                        v => bail!("expecting {} but found {}", ScalarType::$variant, v.dtype()),
                    }
                }

                fn into_dyn_arr<D: Dimension>(arr: Array<Self, D>) -> DynArray {
                    DynArray::$variant(arr.into_dyn())
                }

                fn from_dyn_arr(x: DynArray) -> Result<ArrayD<Self>> {
                    match x {
                        DynArray::$variant(x) => Ok(x),
                        v => bail!("expecting {} array but found {}", ScalarType::$variant, v.dtype()),
                    }
                }
            }
        )*
    };
}

impl_backend_data!(
    i8, I8, i16, I16, i32, I32, i64, I64, u8, U8, u16, U16, u32, U32, u64, U64, f32, F32, f64,
    F64, bool, Bool, String, String
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_type_names_are_stable() {
        let names: Vec<String> = [ScalarType::U16, ScalarType::F64, ScalarType::String]
            .iter()
            .map(|t| serde_json::to_value(t).unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["u16", "f64", "string"]);
        assert_eq!(
            serde_json::from_str::<ScalarType>("\"i8\"").unwrap(),
            ScalarType::I8
        );
        for ty in [ScalarType::I32, ScalarType::Bool, ScalarType::F32] {
            assert_eq!(
                serde_json::to_value(ty).unwrap().as_str().unwrap(),
                ty.to_string()
            );
        }
    }
}
