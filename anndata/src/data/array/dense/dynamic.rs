use crate::{
    backend::*,
    data::{
        data_traits::*,
        scalar::DynScalar,
        slice::{SelectInfoBounds, SelectInfoElem, Shape},
    },
};

use anyhow::{bail, Result};
use ndarray::{Array, ArrayD, Dimension, IxDyn};

/// A dynamic-typed array.
#[derive(Debug, Clone, PartialEq)]
pub enum DynArray {
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    Bool(ArrayD<bool>),
    String(ArrayD<String>),
}

impl DynArray {
    pub fn dtype(&self) -> ScalarType {
        macro_rules! fun {
            ($variant:ident, $val:expr) => {
                ScalarType::$variant
            };
        }
        crate::macros::dyn_map!(self, DynArray, fun)
    }

    pub fn ndim(&self) -> usize {
        crate::macros::dyn_map_fun!(self, DynArray, ndim)
    }

    pub fn shape(&self) -> Shape {
        crate::macros::dyn_map_fun!(self, DynArray, shape).into()
    }

    pub fn len(&self) -> usize {
        crate::macros::dyn_map_fun!(self, DynArray, len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An all-default array of the given type and shape.
    pub fn default_of(dtype: ScalarType, shape: &Shape) -> Self {
        macro_rules! fun {
            ($variant:ident, $ty:ty) => {
                DynArray::$variant(ArrayD::<$ty>::default(IxDyn(shape.as_ref())))
            };
        }
        crate::macros::dyn_match!(dtype, ScalarType, fun)
    }
}

macro_rules! impl_dynarray_traits {
    ($($scalar_ty:ty, $ident:ident),*) => {
        $(
            impl<D: Dimension> From<Array<$scalar_ty, D>> for DynArray {
                fn from(data: Array<$scalar_ty, D>) -> Self {
                    DynArray::$ident(data.into_dyn())
                }
            }

            impl<D: Dimension> TryFrom<DynArray> for Array<$scalar_ty, D> {
                type Error = anyhow::Error;
                fn try_from(arr: DynArray) -> Result<Self, Self::Error> {
                    match arr {
                        DynArray::$ident(x) => Ok(x.into_dimensionality::<D>()?),
                        v => bail!("Cannot convert {} array to {}", v.dtype(), stringify!($scalar_ty)),
                    }
                }
            }
        )*
    };
}

impl_dynarray_traits!(
    i8, I8, i16, I16, i32, I32, i64, I64, u8, U8, u16, U16, u32, U32, u64, U64, f32, F32, f64, F64,
    bool, Bool, String, String
);

// Platform-width integers get a fixed 64-bit representation.
impl<D: Dimension> From<Array<usize, D>> for DynArray {
    fn from(data: Array<usize, D>) -> Self {
        DynArray::U64(data.mapv(|x| x as u64).into_dyn())
    }
}

impl<D: Dimension> From<Array<isize, D>> for DynArray {
    fn from(data: Array<isize, D>) -> Self {
        DynArray::I64(data.mapv(|x| x as i64).into_dyn())
    }
}

impl Element for DynArray {
    fn data_type(&self) -> DataType {
        crate::macros::dyn_map_fun!(self, DynArray, data_type)
    }

    fn metadata(&self) -> MetaData {
        crate::macros::dyn_map_fun!(self, DynArray, metadata)
    }
}

impl Writable for DynArray {
    fn write<B: Backend, G: GroupOp<B>>(
        &self,
        location: &G,
        name: &str,
    ) -> Result<DataContainer<B>> {
        crate::macros::dyn_map_fun!(self, DynArray, write, location, name)
    }
}

impl Readable for DynArray {
    fn read<B: Backend>(container: &DataContainer<B>) -> Result<Self> {
        container.as_dataset()?.read_dyn_array()
    }
}

impl HasShape for DynArray {
    fn shape(&self) -> Shape {
        DynArray::shape(self)
    }
}

impl Indexable for DynArray {
    fn get(&self, index: &[usize]) -> Option<DynScalar> {
        macro_rules! fun {
            ($variant:ident, $exp:expr) => {
                $exp.get(index).map(|x| x.clone().into())
            };
        }
        crate::macros::dyn_map!(self, DynArray, fun)
    }
}

impl Selectable for DynArray {
    fn select<S>(&self, info: &[S]) -> Self
    where
        S: AsRef<SelectInfoElem>,
    {
        macro_rules! fun {
            ($variant:ident, $exp:expr) => {
                DynArray::$variant(Selectable::select($exp, info))
            };
        }
        crate::macros::dyn_map!(self, DynArray, fun)
    }
}

impl WritableArray for DynArray {}

impl ReadableArray for DynArray {
    fn get_shape<B: Backend>(container: &DataContainer<B>) -> Result<Shape> {
        Ok(container.as_dataset()?.shape())
    }

    fn read_select<B, S>(container: &DataContainer<B>, info: &[S]) -> Result<Self>
    where
        B: Backend,
        S: AsRef<SelectInfoElem>,
    {
        let dataset = container.as_dataset()?;
        SelectInfoBounds::new(info, &dataset.shape())?;
        dataset.read_dyn_array_slice(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2};

    #[test]
    fn usize_is_stored_as_u64() {
        let arr: DynArray = Array2::<usize>::from_elem((2, 3), 7).into();
        assert_eq!(arr.dtype(), ScalarType::U64);
        assert_eq!(arr.shape(), vec![2, 3].into());

        let arr: DynArray = ndarray::arr1(&[-1isize, 2]).into();
        assert_eq!(arr.dtype(), ScalarType::I64);
    }

    #[test]
    fn dtype_and_conversion() {
        let arr: DynArray = arr2(&[[1.5f32, 2.0], [3.0, 4.0]]).into();
        assert_eq!(arr.data_type(), DataType::Array(ScalarType::F32));
        assert_eq!(arr.get(&[1, 0]), Some(DynScalar::F32(3.0)));
        assert!(Array2::<f64>::try_from(arr.clone()).is_err());
        assert_eq!(Array2::<f32>::try_from(arr).unwrap()[[1, 1]], 4.0);
    }
}
