use crate::backend::*;
use crate::data::data_traits::*;

use anyhow::{bail, Result};

/// A single value of any supported scalar type.
#[derive(Debug, Clone, PartialEq)]
pub enum DynScalar {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
}

impl DynScalar {
    pub fn dtype(&self) -> ScalarType {
        macro_rules! fun {
            ($variant:ident, $val:expr) => {
                ScalarType::$variant
            };
        }
        crate::macros::dyn_map!(self, DynScalar, fun)
    }
}

/// macro to implement `From` trait for `DynScalar`
macro_rules! impl_from_dynscalar {
    ($($from:ident, $to:ident),*) => {
        $(
            impl From<$from> for DynScalar {
                fn from(val: $from) -> Self {
                    DynScalar::$to(val)
                }
            }

            impl TryFrom<DynScalar> for $from {
                type Error = anyhow::Error;
                fn try_from(val: DynScalar) -> Result<Self> {
                    <$from as BackendData>::from_dyn(val)
                }
            }

            impl Element for $from {
                fn data_type(&self) -> DataType {
                    DataType::Scalar(ScalarType::$to)
                }

                fn metadata(&self) -> MetaData {
                    let encoding_type = if <$from as BackendData>::DTYPE == ScalarType::String {
                        "string"
                    } else {
                        "numeric-scalar"
                    };
                    MetaData::new(encoding_type, "0.2.0", None)
                }
            }

            impl Readable for $from {
                fn read<B: Backend>(container: &DataContainer<B>) -> Result<Self> {
                    let dataset = container.as_dataset()?;
                    match dataset.dtype()? {
                        ScalarType::$to => Ok(dataset.read_scalar()?),
                        ty => bail!("cannot read {} as {}", ty, stringify!($from)),
                    }
                }
            }

            impl Writable for $from {
                fn write<B: Backend, G: GroupOp<B>>(&self, location: &G, name: &str) -> Result<DataContainer<B>> {
                    let dataset = location.new_scalar_dataset(name, self)?;
                    let mut container = DataContainer::Dataset(dataset);
                    self.metadata().save(&mut container)?;
                    Ok(container)
                }
            }
        )*
    };
}

impl_from_dynscalar!(
    i8, I8, i16, I16, i32, I32, i64, I64, u8, U8, u16, U16, u32, U32, u64, U64, f32, F32, f64, F64,
    bool, Bool, String, String
);

impl From<usize> for DynScalar {
    fn from(val: usize) -> Self {
        DynScalar::U64(val as u64)
    }
}

impl From<&str> for DynScalar {
    fn from(val: &str) -> Self {
        DynScalar::String(val.to_string())
    }
}

impl Element for DynScalar {
    fn data_type(&self) -> DataType {
        crate::macros::dyn_map_fun!(self, DynScalar, data_type)
    }

    fn metadata(&self) -> MetaData {
        crate::macros::dyn_map_fun!(self, DynScalar, metadata)
    }
}

impl Writable for DynScalar {
    fn write<B: Backend, G: GroupOp<B>>(
        &self,
        location: &G,
        name: &str,
    ) -> Result<DataContainer<B>> {
        crate::macros::dyn_map_fun!(self, DynScalar, write, location, name)
    }
}

impl Readable for DynScalar {
    fn read<B: Backend>(container: &DataContainer<B>) -> Result<Self> {
        let dataset = container.as_dataset()?;

        macro_rules! fun {
            ($variant:ident, $ty:ty) => {
                DynScalar::$variant(dataset.read_scalar::<$ty>()?)
            };
        }

        Ok(crate::macros::dyn_match!(dataset.dtype()?, ScalarType, fun))
    }
}
