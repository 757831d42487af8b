mod anndata;
pub mod backend;
pub mod container;
pub mod data;
pub mod error;
mod macros;
pub mod traits;

pub use crate::anndata::{AnnData, AnnDataBuilder};
pub use backend::Backend;
pub use container::{ArrayElem, AxisArrays, DataFrameElem, Dim, Elem, ElemCollection};
pub use data::{
    ArrayData, ArrayKind, Column, Data, DataFrame, DataFrameIndex, HasShape, Readable,
    ReadableArray, Selectable, Writable, WritableArray,
};
pub use error::AnnDataError;
pub use traits::AnnDataOp;
