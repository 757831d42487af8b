mod base;
mod collection;

pub use base::{
    ArrayElem, DataFrameElem, Elem, Inner, InnerArrayElem, InnerDataFrameElem, InnerElem, Slot,
};
pub use collection::{
    Axis, AxisArrays, Dim, ElemCollection, InnerAxisArrays, InnerElemCollection,
};
