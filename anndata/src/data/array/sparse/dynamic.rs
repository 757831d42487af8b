use super::{csc_to_csr, csc_to_dense, csr_to_csc, csr_to_dense, dense_to_csc, dense_to_csr};
use crate::backend::*;
use crate::data::{
    array::DynArray,
    data_traits::*,
    scalar::DynScalar,
    slice::{SelectInfoElem, Shape},
};
use crate::error::AnnDataError;

use anyhow::{bail, Result};
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use ndarray::Ix2;

#[derive(Debug, Clone)]
pub enum DynCsrMatrix {
    I8(CsrMatrix<i8>),
    I16(CsrMatrix<i16>),
    I32(CsrMatrix<i32>),
    I64(CsrMatrix<i64>),
    U8(CsrMatrix<u8>),
    U16(CsrMatrix<u16>),
    U32(CsrMatrix<u32>),
    U64(CsrMatrix<u64>),
    F32(CsrMatrix<f32>),
    F64(CsrMatrix<f64>),
    Bool(CsrMatrix<bool>),
    String(CsrMatrix<String>),
}

#[derive(Debug, Clone)]
pub enum DynCscMatrix {
    I8(CscMatrix<i8>),
    I16(CscMatrix<i16>),
    I32(CscMatrix<i32>),
    I64(CscMatrix<i64>),
    U8(CscMatrix<u8>),
    U16(CscMatrix<u16>),
    U32(CscMatrix<u32>),
    U64(CscMatrix<u64>),
    F32(CscMatrix<f32>),
    F64(CscMatrix<f64>),
    Bool(CscMatrix<bool>),
    String(CscMatrix<String>),
}

/// Conversions between the typed and dynamic forms of one sparse layout.
macro_rules! impl_dyn_sparse_convert {
    ($dyn_ty:ident, $ty:ident, $($scalar:ty, $variant:ident),*) => {
        $(
            impl From<$ty<$scalar>> for $dyn_ty {
                fn from(data: $ty<$scalar>) -> Self {
                    $dyn_ty::$variant(data)
                }
            }

            impl TryFrom<$dyn_ty> for $ty<$scalar> {
                type Error = anyhow::Error;
                fn try_from(data: $dyn_ty) -> Result<Self> {
                    match data {
                        $dyn_ty::$variant(data) => Ok(data),
                        _ => bail!(
                            "Cannot convert {} to {}<{}>",
                            data.data_type(),
                            stringify!($ty),
                            stringify!($scalar)
                        ),
                    }
                }
            }
        )*
    };
}

impl_dyn_sparse_convert!(
    DynCsrMatrix, CsrMatrix, i8, I8, i16, I16, i32, I32, i64, I64, u8, U8, u16, U16, u32, U32,
    u64, U64, f32, F32, f64, F64, bool, Bool, String, String
);
impl_dyn_sparse_convert!(
    DynCscMatrix, CscMatrix, i8, I8, i16, I16, i32, I32, i64, I64, u8, U8, u16, U16, u32, U32,
    u64, U64, f32, F32, f64, F64, bool, Bool, String, String
);

/// Element traits for a dynamic sparse type, dispatching to the typed matrix.
macro_rules! impl_dyn_sparse_traits {
    ($dyn_ty:ident, $ty:ident, $data_type:ident) => {
        impl $dyn_ty {
            pub fn dtype(&self) -> ScalarType {
                macro_rules! fun {
                    ($variant:ident, $val:expr) => {
                        ScalarType::$variant
                    };
                }
                crate::macros::dyn_map!(self, $dyn_ty, fun)
            }

            /// Number of stored entries.
            pub fn nnz(&self) -> usize {
                crate::macros::dyn_map_fun!(self, $dyn_ty, nnz)
            }
        }

        impl Element for $dyn_ty {
            fn data_type(&self) -> DataType {
                DataType::$data_type(self.dtype())
            }

            fn metadata(&self) -> MetaData {
                crate::macros::dyn_map_fun!(self, $dyn_ty, metadata)
            }
        }

        impl Writable for $dyn_ty {
            fn write<B: Backend, G: GroupOp<B>>(
                &self,
                location: &G,
                name: &str,
            ) -> Result<DataContainer<B>> {
                crate::macros::dyn_map_fun!(self, $dyn_ty, write, location, name)
            }
        }

        impl Readable for $dyn_ty {
            fn read<B: Backend>(container: &DataContainer<B>) -> Result<Self> {
                match container.encoding_type()? {
                    DataType::$data_type(ty) => {
                        macro_rules! fun {
                            ($variant:ident, $scalar:ty) => {
                                $ty::<$scalar>::read(container).map(Into::into)
                            };
                        }
                        crate::macros::dyn_match!(ty, ScalarType, fun)
                    }
                    ty => bail!(
                        "cannot read {} from a container holding {}",
                        stringify!($ty),
                        ty
                    ),
                }
            }
        }

        impl HasShape for $dyn_ty {
            fn shape(&self) -> Shape {
                macro_rules! fun {
                    ($variant:ident, $val:expr) => {
                        HasShape::shape($val)
                    };
                }
                crate::macros::dyn_map!(self, $dyn_ty, fun)
            }
        }

        impl Indexable for $dyn_ty {
            fn get(&self, index: &[usize]) -> Option<DynScalar> {
                macro_rules! fun {
                    ($variant:ident, $val:expr) => {
                        Indexable::get($val, index)
                    };
                }
                crate::macros::dyn_map!(self, $dyn_ty, fun)
            }
        }

        impl Selectable for $dyn_ty {
            fn select<S>(&self, info: &[S]) -> Self
            where
                S: AsRef<SelectInfoElem>,
            {
                macro_rules! fun {
                    ($variant:ident, $val:expr) => {
                        $dyn_ty::$variant(Selectable::select($val, info))
                    };
                }
                crate::macros::dyn_map!(self, $dyn_ty, fun)
            }
        }

        impl ReadableArray for $dyn_ty {
            fn get_shape<B: Backend>(container: &DataContainer<B>) -> Result<Shape> {
                <$ty<u8> as ReadableArray>::get_shape(container)
            }

            fn read_select<B, S>(container: &DataContainer<B>, info: &[S]) -> Result<Self>
            where
                B: Backend,
                S: AsRef<SelectInfoElem>,
            {
                match container.encoding_type()? {
                    DataType::$data_type(ty) => {
                        macro_rules! fun {
                            ($variant:ident, $scalar:ty) => {
                                $ty::<$scalar>::read_select(container, info).map(Into::into)
                            };
                        }
                        crate::macros::dyn_match!(ty, ScalarType, fun)
                    }
                    ty => bail!(
                        "cannot read {} from a container holding {}",
                        stringify!($ty),
                        ty
                    ),
                }
            }
        }

        impl WritableArray for $dyn_ty {}
    };
}

impl_dyn_sparse_traits!(DynCsrMatrix, CsrMatrix, CsrMatrix);
impl_dyn_sparse_traits!(DynCscMatrix, CscMatrix, CscMatrix);

/// Stored entries equal to zero are not part of the value.
fn same_entries<'a, T, I>(a: I, b: I) -> bool
where
    T: PartialEq + Default + 'a,
    I: Iterator<Item = (usize, usize, &'a T)>,
{
    let zero = T::default();
    a.filter(|x| *x.2 != zero).eq(b.filter(|x| *x.2 != zero))
}

/// Two matrices are equal when they have the same shape and the same
/// non-zero entries, whether or not zeros were stored explicitly.
macro_rules! impl_sparse_eq {
    ($dyn_ty:ident, $($variant:ident),*) => {
        impl PartialEq for $dyn_ty {
            fn eq(&self, other: &Self) -> bool {
                match (self, other) {
                    $(($dyn_ty::$variant(a), $dyn_ty::$variant(b)) => {
                        a.nrows() == b.nrows()
                            && a.ncols() == b.ncols()
                            && same_entries(a.triplet_iter(), b.triplet_iter())
                    })*
                    _ => false,
                }
            }
        }
    };
}

impl_sparse_eq!(DynCsrMatrix, I8, I16, I32, I64, U8, U16, U32, U64, F32, F64, Bool, String);
impl_sparse_eq!(DynCscMatrix, I8, I16, I32, I64, U8, U16, U32, U64, F32, F64, Bool, String);

/// Dispatch over the numeric variants of a `DynArray`. Booleans and strings
/// have no zero to leave out and cannot be compressed.
macro_rules! match_numeric {
    ($arr:expr, $target:expr, $fun:ident) => {
        match $arr {
            DynArray::I8(x) => $fun!(I8, x),
            DynArray::I16(x) => $fun!(I16, x),
            DynArray::I32(x) => $fun!(I32, x),
            DynArray::I64(x) => $fun!(I64, x),
            DynArray::U8(x) => $fun!(U8, x),
            DynArray::U16(x) => $fun!(U16, x),
            DynArray::U32(x) => $fun!(U32, x),
            DynArray::U64(x) => $fun!(U64, x),
            DynArray::F32(x) => $fun!(F32, x),
            DynArray::F64(x) => $fun!(F64, x),
            v => bail!(AnnDataError::unsupported(
                format!("{} array", v.dtype()),
                $target
            )),
        }
    };
}

impl DynCsrMatrix {
    /// Materialize as a 2-dimensional dense array.
    pub fn to_dense(&self) -> Result<DynArray> {
        macro_rules! fun {
            ($variant:ident, $val:expr) => {
                DynArray::from(csr_to_dense($val)?)
            };
        }
        Ok(crate::macros::dyn_map!(self, DynCsrMatrix, fun))
    }

    pub fn to_csc(&self) -> Result<DynCscMatrix> {
        macro_rules! fun {
            ($variant:ident, $val:expr) => {
                DynCscMatrix::$variant(csr_to_csc($val)?)
            };
        }
        Ok(crate::macros::dyn_map!(self, DynCsrMatrix, fun))
    }

    /// Compress a 2-dimensional numeric array, dropping zeros.
    pub fn from_dense(arr: &DynArray) -> Result<Self> {
        macro_rules! fun {
            ($variant:ident, $val:expr) => {
                DynCsrMatrix::$variant(dense_to_csr(dense_view($val)?)?)
            };
        }
        Ok(match_numeric!(arr, "CSR matrix", fun))
    }
}

impl DynCscMatrix {
    /// Materialize as a 2-dimensional dense array.
    pub fn to_dense(&self) -> Result<DynArray> {
        macro_rules! fun {
            ($variant:ident, $val:expr) => {
                DynArray::from(csc_to_dense($val)?)
            };
        }
        Ok(crate::macros::dyn_map!(self, DynCscMatrix, fun))
    }

    pub fn to_csr(&self) -> Result<DynCsrMatrix> {
        macro_rules! fun {
            ($variant:ident, $val:expr) => {
                DynCsrMatrix::$variant(csc_to_csr($val)?)
            };
        }
        Ok(crate::macros::dyn_map!(self, DynCscMatrix, fun))
    }

    /// Compress a 2-dimensional numeric array, dropping zeros.
    pub fn from_dense(arr: &DynArray) -> Result<Self> {
        macro_rules! fun {
            ($variant:ident, $val:expr) => {
                DynCscMatrix::$variant(dense_to_csc(dense_view($val)?)?)
            };
        }
        Ok(match_numeric!(arr, "CSC matrix", fun))
    }
}

fn dense_view<T>(arr: &ndarray::ArrayD<T>) -> Result<ndarray::ArrayView2<'_, T>> {
    if arr.ndim() != 2 {
        bail!(AnnDataError::unsupported(
            format!("{}-dimensional array", arr.ndim()),
            "sparse matrix"
        ));
    }
    Ok(arr.view().into_dimensionality::<Ix2>()?)
}


#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn layout_conversions() {
        let dense: DynArray = array![[0.0f32, 1.5], [2.5, 0.0], [0.0, 0.0]].into();
        let csr = DynCsrMatrix::from_dense(&dense).unwrap();
        assert_eq!(csr.data_type(), DataType::CsrMatrix(ScalarType::F32));
        assert_eq!(csr.nnz(), 2);
        assert_eq!(csr.shape(), vec![3, 2].into());

        let csc = csr.to_csc().unwrap();
        assert_eq!(csc.to_dense().unwrap(), dense);
        assert_eq!(csc.to_csr().unwrap(), csr);
        assert_eq!(csr.to_dense().unwrap(), dense);
        assert_eq!(csc.get(&[1, 0]), Some(DynScalar::F32(2.5)));
    }

    #[test]
    fn explicit_zeros_do_not_count() {
        let stored = CsrMatrix::try_from_csr_data(2, 3, vec![0, 2, 3], vec![0, 2, 1], vec![4i32, 0, 5])
            .unwrap();
        let pruned =
            CsrMatrix::try_from_csr_data(2, 3, vec![0, 1, 2], vec![0, 1], vec![4i32, 5]).unwrap();
        assert_eq!(DynCsrMatrix::from(stored.clone()), DynCsrMatrix::from(pruned.clone()));
        assert_eq!(
            DynCsrMatrix::from(stored.clone()).to_csc().unwrap(),
            DynCsrMatrix::from(pruned.clone()).to_csc().unwrap()
        );

        let other =
            CsrMatrix::try_from_csr_data(2, 3, vec![0, 1, 2], vec![0, 2], vec![4i32, 5]).unwrap();
        assert_ne!(DynCsrMatrix::from(stored.clone()), DynCsrMatrix::from(other));
        let wider =
            CsrMatrix::try_from_csr_data(2, 4, vec![0, 1, 2], vec![0, 1], vec![4i32, 5]).unwrap();
        assert_ne!(DynCsrMatrix::from(pruned), DynCsrMatrix::from(wider));
        let as_i64 = CsrMatrix::try_from_csr_data(2, 3, vec![0, 1, 2], vec![0, 1], vec![4i64, 5])
            .unwrap();
        assert_ne!(DynCsrMatrix::from(stored), DynCsrMatrix::from(as_i64));
    }

    #[test]
    fn non_numeric_cannot_be_compressed() {
        let labels: DynArray = array![["a".to_string()]].into();
        let err = DynCsrMatrix::from_dense(&labels).unwrap_err();
        assert!(matches!(
            AnnDataError::of(&err),
            Some(AnnDataError::UnsupportedConversion { .. })
        ));

        let vector: DynArray = array![1u8, 0, 2].into();
        assert!(DynCscMatrix::from_dense(&vector).is_err());
    }
}
