pub mod array;
pub mod data_traits;
pub mod index;
pub mod mapping;
pub mod scalar;

pub use array::*;
pub use data_traits::*;
pub use index::DataFrameIndex;
pub use mapping::*;
pub use scalar::*;

use crate::backend::{Backend, DataContainer, DataType, GroupOp};

use ::ndarray::{Array, Dimension};
use anyhow::{bail, Result};
use nalgebra_sparse::{csc::CscMatrix, csr::CsrMatrix};

/// Anything that can live in `uns`.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    ArrayData(ArrayData),
    Scalar(DynScalar),
    Mapping(Mapping),
}

/// Types that can be converted to Data
impl<T: Clone + Into<Data>> From<&T> for Data {
    fn from(data: &T) -> Self {
        data.clone().into()
    }
}

impl From<&str> for Data {
    fn from(data: &str) -> Self {
        Data::Scalar(data.into())
    }
}

macro_rules! impl_into_data {
    ($from_type:ty, $to_type:ident) => {
        impl From<$from_type> for Data {
            fn from(data: $from_type) -> Self {
                Data::Scalar(DynScalar::$to_type(data))
            }
        }
        impl<D: Dimension> From<Array<$from_type, D>> for Data {
            fn from(data: Array<$from_type, D>) -> Self {
                Data::ArrayData(ArrayData::Array(DynArray::$to_type(data.into_dyn())))
            }
        }
        impl From<CsrMatrix<$from_type>> for Data {
            fn from(data: CsrMatrix<$from_type>) -> Self {
                Data::ArrayData(ArrayData::CsrMatrix(DynCsrMatrix::$to_type(data)))
            }
        }
        impl From<CscMatrix<$from_type>> for Data {
            fn from(data: CscMatrix<$from_type>) -> Self {
                Data::ArrayData(ArrayData::CscMatrix(DynCscMatrix::$to_type(data)))
            }
        }
    };
}

impl_into_data!(i8, I8);
impl_into_data!(i16, I16);
impl_into_data!(i32, I32);
impl_into_data!(i64, I64);
impl_into_data!(u8, U8);
impl_into_data!(u16, U16);
impl_into_data!(u32, U32);
impl_into_data!(u64, U64);
impl_into_data!(f32, F32);
impl_into_data!(f64, F64);
impl_into_data!(bool, Bool);
impl_into_data!(String, String);

macro_rules! impl_into_data2 {
    ($from_type:ty, $to_type:ident) => {
        impl From<$from_type> for Data {
            fn from(data: $from_type) -> Self {
                Data::$to_type(data)
            }
        }
    };
}

impl_into_data2!(DynScalar, Scalar);
impl_into_data2!(ArrayData, ArrayData);
impl_into_data2!(Mapping, Mapping);

macro_rules! impl_into_data3 {
    ($($from_type:ty),*) => {
        $(
            impl From<$from_type> for Data {
                fn from(data: $from_type) -> Self {
                    Data::ArrayData(data.into())
                }
            }
        )*
    };
}

impl_into_data3!(DynArray, DynCsrMatrix, DynCscMatrix, CategoricalArray, DataFrame);

macro_rules! impl_try_from_for_scalar {
    ($($from:ident, $to:ident), *) => {
        $(
            impl TryFrom<Data> for $to {
                type Error = anyhow::Error;
                fn try_from(data: Data) -> Result<Self> {
                    match data {
                        Data::Scalar(DynScalar::$from(data)) => Ok(data),
                        _ => bail!("cannot convert data to {}", stringify!($to)),
                    }
                }
            }

            impl<D: Dimension> TryFrom<Data> for Array<$to, D> {
                type Error = anyhow::Error;
                fn try_from(v: Data) -> Result<Self> {
                    match v {
                        Data::ArrayData(data) => data.try_into(),
                        _ => bail!("cannot convert data to {} array", stringify!($to)),
                    }
                }
            }
        )*
    };
}

impl_try_from_for_scalar!(
    I8, i8, I16, i16, I32, i32, I64, i64, U8, u8, U16, u16, U32, u32, U64, u64, F32, f32, F64, f64,
    Bool, bool, String, String
);

macro_rules! impl_try_from_for_array_data {
    ($($to:ty),*) => {
        $(
            impl TryFrom<Data> for $to {
                type Error = anyhow::Error;
                fn try_from(v: Data) -> Result<Self> {
                    match v {
                        Data::ArrayData(data) => data.try_into(),
                        _ => bail!("cannot convert data to {}", stringify!($to)),
                    }
                }
            }
        )*
    };
}

impl_try_from_for_array_data!(DynArray, DynCsrMatrix, DynCscMatrix, CategoricalArray, DataFrame);

impl TryFrom<Data> for ArrayData {
    type Error = anyhow::Error;

    fn try_from(v: Data) -> Result<Self> {
        match v {
            Data::ArrayData(data) => Ok(data),
            _ => bail!("cannot convert data to array data"),
        }
    }
}

impl TryFrom<Data> for DynScalar {
    type Error = anyhow::Error;

    fn try_from(v: Data) -> Result<Self> {
        match v {
            Data::Scalar(data) => Ok(data),
            _ => bail!("cannot convert data to a scalar"),
        }
    }
}

impl TryFrom<Data> for Mapping {
    type Error = anyhow::Error;

    fn try_from(v: Data) -> Result<Self> {
        match v {
            Data::Mapping(data) => Ok(data),
            _ => bail!("cannot convert data to mapping"),
        }
    }
}

impl Element for Data {
    fn data_type(&self) -> DataType {
        match self {
            Data::ArrayData(data) => data.data_type(),
            Data::Scalar(data) => data.data_type(),
            Data::Mapping(data) => data.data_type(),
        }
    }

    fn metadata(&self) -> MetaData {
        match self {
            Data::ArrayData(data) => data.metadata(),
            Data::Scalar(data) => data.metadata(),
            Data::Mapping(data) => data.metadata(),
        }
    }
}

impl Writable for Data {
    fn write<B: Backend, G: GroupOp<B>>(
        &self,
        location: &G,
        name: &str,
    ) -> Result<DataContainer<B>> {
        match self {
            Data::ArrayData(data) => data.write(location, name),
            Data::Scalar(data) => data.write(location, name),
            Data::Mapping(data) => data.write(location, name),
        }
    }
}

impl Readable for Data {
    fn read<B: Backend>(container: &DataContainer<B>) -> Result<Self> {
        match container.encoding_type()? {
            DataType::Scalar(_) => DynScalar::read(container).map(Data::Scalar),
            DataType::Mapping => Mapping::read(container).map(Data::Mapping),
            _ => ArrayData::read(container).map(Data::ArrayData),
        }
    }
}
