mod dataframe;
mod dense;
pub mod slice;
mod sparse;
pub(crate) mod utils;

pub use dataframe::{Column, DataFrame};
pub use dense::{CategoricalArray, DynArray};
pub use slice::{SelectInfoBounds, SelectInfoElem, SelectInfoElemBounds, Shape};
pub use sparse::{DynCscMatrix, DynCsrMatrix};

use crate::backend::*;
use crate::data::{data_traits::*, scalar::DynScalar};
use crate::error::AnnDataError;

use ::ndarray::{Array, Dimension};
use anyhow::{bail, Result};
use nalgebra_sparse::{csc::CscMatrix, csr::CsrMatrix};

/// Storage layouts a two-dimensional matrix can be converted between.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArrayKind {
    Dense,
    Csr,
    Csc,
}

impl std::fmt::Display for ArrayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArrayKind::Dense => write!(f, "dense array"),
            ArrayKind::Csr => write!(f, "CSR matrix"),
            ArrayKind::Csc => write!(f, "CSC matrix"),
        }
    }
}

/// Any array-like element. Every site that stores, reads or compares
/// elements matches on these variants exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Array(DynArray),
    CsrMatrix(DynCsrMatrix),
    CscMatrix(DynCscMatrix),
    Categorical(CategoricalArray),
    DataFrame(DataFrame),
}

impl ArrayData {
    /// The layout of this element, if it is a plain matrix.
    pub fn kind(&self) -> Option<ArrayKind> {
        match self {
            ArrayData::Array(_) => Some(ArrayKind::Dense),
            ArrayData::CsrMatrix(_) => Some(ArrayKind::Csr),
            ArrayData::CscMatrix(_) => Some(ArrayKind::Csc),
            ArrayData::Categorical(_) | ArrayData::DataFrame(_) => None,
        }
    }

    /// Explicit change of layout. Values and shape are kept; zeros are
    /// dropped when compressing.
    pub fn convert(&self, kind: ArrayKind) -> Result<Self> {
        let converted: ArrayData = match (self, kind) {
            (ArrayData::Array(x), ArrayKind::Dense) => x.clone().into(),
            (ArrayData::Array(x), ArrayKind::Csr) => DynCsrMatrix::from_dense(x)?.into(),
            (ArrayData::Array(x), ArrayKind::Csc) => DynCscMatrix::from_dense(x)?.into(),
            (ArrayData::CsrMatrix(x), ArrayKind::Dense) => x.to_dense()?.into(),
            (ArrayData::CsrMatrix(x), ArrayKind::Csr) => x.clone().into(),
            (ArrayData::CsrMatrix(x), ArrayKind::Csc) => x.to_csc()?.into(),
            (ArrayData::CscMatrix(x), ArrayKind::Dense) => x.to_dense()?.into(),
            (ArrayData::CscMatrix(x), ArrayKind::Csr) => x.to_csr()?.into(),
            (ArrayData::CscMatrix(x), ArrayKind::Csc) => x.clone().into(),
            (other, kind) => bail!(AnnDataError::unsupported(other.data_type(), kind)),
        };
        Ok(converted)
    }

    /// Materialize as a dense array.
    pub fn to_dense(&self) -> Result<DynArray> {
        match self.convert(ArrayKind::Dense)? {
            ArrayData::Array(x) => Ok(x),
            other => bail!(AnnDataError::unsupported(other.data_type(), ArrayKind::Dense)),
        }
    }

    /// Rows and columns of a matrix-like element. The kind is kept: sparse
    /// stays sparse. Remaining axes of higher-dimensional arrays are kept whole.
    pub fn slice<R, C>(&self, rows: R, cols: C) -> Result<Self>
    where
        R: Into<SelectInfoElem>,
        C: Into<SelectInfoElem>,
    {
        let shape = self.shape();
        if shape.ndim() < 2 {
            bail!("cannot take a 2-dimensional slice of an element of shape {}", shape);
        }
        let mut selection = vec![rows.into(), cols.into()];
        selection.resize(shape.ndim(), SelectInfoElem::full());
        SelectInfoBounds::new(&selection, &shape)?;
        Ok(self.select(&selection))
    }
}

impl<T: Clone + Into<ArrayData>> From<&T> for ArrayData {
    fn from(data: &T) -> Self {
        data.clone().into()
    }
}

macro_rules! impl_from_variant {
    ($($ty:ty, $variant:ident),*) => {
        $(
            impl From<$ty> for ArrayData {
                fn from(data: $ty) -> Self {
                    ArrayData::$variant(data)
                }
            }

            impl TryFrom<ArrayData> for $ty {
                type Error = anyhow::Error;
                fn try_from(value: ArrayData) -> Result<Self, Self::Error> {
                    match value {
                        ArrayData::$variant(data) => Ok(data),
                        _ => bail!("cannot convert {} to {}", value.data_type(), stringify!($ty)),
                    }
                }
            }
        )*
    };
}

impl_from_variant!(
    DynArray, Array, DynCsrMatrix, CsrMatrix, DynCscMatrix, CscMatrix,
    CategoricalArray, Categorical, DataFrame, DataFrame
);

/// macro for implementing From trait for Data from a list of types
macro_rules! impl_into_array_data {
    ($($ty:ty),*) => {
        $(
            impl<D: Dimension> From<Array<$ty, D>> for ArrayData {
                fn from(data: Array<$ty, D>) -> Self {
                    ArrayData::Array(data.into_dyn().into())
                }
            }
            impl From<CsrMatrix<$ty>> for ArrayData {
                fn from(data: CsrMatrix<$ty>) -> Self {
                    ArrayData::CsrMatrix(data.into())
                }
            }
            impl From<CscMatrix<$ty>> for ArrayData {
                fn from(data: CscMatrix<$ty>) -> Self {
                    ArrayData::CscMatrix(data.into())
                }
            }

            impl<D: Dimension> TryFrom<ArrayData> for Array<$ty, D> {
                type Error = anyhow::Error;
                fn try_from(value: ArrayData) -> Result<Self, Self::Error> {
                    match value {
                        ArrayData::Array(data) => data.try_into(),
                        _ => bail!("cannot convert {} to {} array", value.data_type(), stringify!($ty)),
                    }
                }
            }
            impl TryFrom<ArrayData> for CsrMatrix<$ty> {
                type Error = anyhow::Error;
                fn try_from(value: ArrayData) -> Result<Self, Self::Error> {
                    match value {
                        ArrayData::CsrMatrix(data) => data.try_into(),
                        _ => bail!("cannot convert {} to {} CSR matrix", value.data_type(), stringify!($ty)),
                    }
                }
            }
            impl TryFrom<ArrayData> for CscMatrix<$ty> {
                type Error = anyhow::Error;
                fn try_from(value: ArrayData) -> Result<Self, Self::Error> {
                    match value {
                        ArrayData::CscMatrix(data) => data.try_into(),
                        _ => bail!("cannot convert {} to {} CSC matrix", value.data_type(), stringify!($ty)),
                    }
                }
            }
        )*
    };
}

impl_into_array_data!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool, String);

impl<D: Dimension> From<Array<usize, D>> for ArrayData {
    fn from(data: Array<usize, D>) -> Self {
        ArrayData::Array(data.into())
    }
}

impl Element for ArrayData {
    fn data_type(&self) -> DataType {
        match self {
            ArrayData::Array(data) => data.data_type(),
            ArrayData::CsrMatrix(data) => data.data_type(),
            ArrayData::CscMatrix(data) => data.data_type(),
            ArrayData::Categorical(data) => data.data_type(),
            ArrayData::DataFrame(data) => data.data_type(),
        }
    }

    fn metadata(&self) -> MetaData {
        match self {
            ArrayData::Array(data) => data.metadata(),
            ArrayData::CsrMatrix(data) => data.metadata(),
            ArrayData::CscMatrix(data) => data.metadata(),
            ArrayData::Categorical(data) => data.metadata(),
            ArrayData::DataFrame(data) => data.metadata(),
        }
    }
}

impl Writable for ArrayData {
    fn write<B: Backend, G: GroupOp<B>>(
        &self,
        location: &G,
        name: &str,
    ) -> Result<DataContainer<B>> {
        match self {
            ArrayData::Array(data) => data.write(location, name),
            ArrayData::CsrMatrix(data) => data.write(location, name),
            ArrayData::CscMatrix(data) => data.write(location, name),
            ArrayData::Categorical(data) => data.write(location, name),
            ArrayData::DataFrame(data) => data.write(location, name),
        }
    }
}

impl Readable for ArrayData {
    fn read<B: Backend>(container: &DataContainer<B>) -> Result<Self> {
        match container.encoding_type()? {
            DataType::Categorical => CategoricalArray::read(container).map(ArrayData::Categorical),
            DataType::Array(_) => DynArray::read(container).map(ArrayData::Array),
            DataType::CsrMatrix(_) => DynCsrMatrix::read(container).map(ArrayData::CsrMatrix),
            DataType::CscMatrix(_) => DynCscMatrix::read(container).map(ArrayData::CscMatrix),
            DataType::DataFrame => DataFrame::read(container).map(ArrayData::DataFrame),
            ty => bail!("cannot read type '{}' as array data", ty),
        }
    }
}

impl HasShape for ArrayData {
    fn shape(&self) -> Shape {
        match self {
            ArrayData::Array(data) => data.shape(),
            ArrayData::CsrMatrix(data) => HasShape::shape(data),
            ArrayData::CscMatrix(data) => HasShape::shape(data),
            ArrayData::Categorical(data) => data.shape(),
            ArrayData::DataFrame(data) => data.shape(),
        }
    }
}

impl Indexable for ArrayData {
    fn get(&self, index: &[usize]) -> Option<DynScalar> {
        match self {
            ArrayData::Array(data) => Indexable::get(data, index),
            ArrayData::CsrMatrix(data) => Indexable::get(data, index),
            ArrayData::CscMatrix(data) => Indexable::get(data, index),
            ArrayData::Categorical(data) => Indexable::get(data, index),
            ArrayData::DataFrame(data) => Indexable::get(data, index),
        }
    }
}

impl Selectable for ArrayData {
    fn select<S>(&self, info: &[S]) -> Self
    where
        S: AsRef<SelectInfoElem>,
    {
        match self {
            ArrayData::Array(data) => Selectable::select(data, info).into(),
            ArrayData::CsrMatrix(data) => Selectable::select(data, info).into(),
            ArrayData::CscMatrix(data) => Selectable::select(data, info).into(),
            ArrayData::Categorical(data) => Selectable::select(data, info).into(),
            ArrayData::DataFrame(data) => Selectable::select(data, info).into(),
        }
    }
}

impl ReadableArray for ArrayData {
    fn get_shape<B: Backend>(container: &DataContainer<B>) -> Result<Shape> {
        match container.encoding_type()? {
            DataType::Categorical => CategoricalArray::get_shape(container),
            DataType::Array(_) => DynArray::get_shape(container),
            DataType::CsrMatrix(_) => DynCsrMatrix::get_shape(container),
            DataType::CscMatrix(_) => DynCscMatrix::get_shape(container),
            DataType::DataFrame => DataFrame::get_shape(container),
            ty => bail!("cannot read shape information from type '{}'", ty),
        }
    }

    fn read_select<B, S>(container: &DataContainer<B>, info: &[S]) -> Result<Self>
    where
        B: Backend,
        S: AsRef<SelectInfoElem>,
    {
        match container.encoding_type()? {
            DataType::Categorical => {
                CategoricalArray::read_select(container, info).map(ArrayData::Categorical)
            }
            DataType::Array(_) => DynArray::read_select(container, info).map(ArrayData::Array),
            DataType::CsrMatrix(_) => {
                DynCsrMatrix::read_select(container, info).map(ArrayData::CsrMatrix)
            }
            DataType::CscMatrix(_) => {
                DynCscMatrix::read_select(container, info).map(ArrayData::CscMatrix)
            }
            DataType::DataFrame => DataFrame::read_select(container, info).map(ArrayData::DataFrame),
            ty => bail!("cannot read type '{}' as array data", ty),
        }
    }
}

impl WritableArray for ArrayData {}
impl WritableArray for &ArrayData {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemory;
    use ndarray::{array, Array2};

    #[test]
    fn explicit_conversions() {
        let dense: ArrayData = array![[0i32, 3], [4, 0], [0, 0]].into();
        let csr = dense.convert(ArrayKind::Csr).unwrap();
        assert_eq!(csr.kind(), Some(ArrayKind::Csr));
        let csc = csr.convert(ArrayKind::Csc).unwrap();
        assert_eq!(csc.data_type(), DataType::CscMatrix(ScalarType::I32));
        assert_eq!(csc.to_dense().unwrap(), dense.to_dense().unwrap());
        assert_eq!(csc.convert(ArrayKind::Csr).unwrap(), csr);

        let cat: ArrayData = ["a", "b"].into_iter().collect::<CategoricalArray>().into();
        let err = cat.convert(ArrayKind::Csr).unwrap_err();
        assert!(matches!(
            AnnDataError::of(&err),
            Some(AnnDataError::UnsupportedConversion { .. })
        ));
        assert!(cat.to_dense().is_err());
    }

    #[test]
    fn slice_keeps_kind() {
        let arr = Array2::from_shape_fn((6, 5), |(i, j)| if (i + j) % 3 == 0 { (i * j) as f64 } else { 0.0 });
        let csr = ArrayData::from(arr.clone()).convert(ArrayKind::Csr).unwrap();
        let sub = csr.slice(1usize..4, vec![4usize, 0]).unwrap();
        assert_eq!(sub.kind(), Some(ArrayKind::Csr));
        assert_eq!(sub.shape(), vec![3, 2].into());
        let expected = ArrayData::from(arr).slice(1usize..4, vec![4usize, 0]).unwrap();
        assert_eq!(expected.kind(), Some(ArrayKind::Dense));
        assert_eq!(sub.to_dense().unwrap(), expected.to_dense().unwrap());
        assert_eq!(sub.get(&[1, 0]), Some(DynScalar::F64(8.0)));

        assert!(csr.slice(0usize..7, ..).is_err());
        let vector: ArrayData = array![1u8, 2].into();
        assert!(vector.slice(.., ..).is_err());
    }

    #[test]
    fn dispatch_on_read() {
        let store = InMemory::new("array").unwrap();
        let elements: Vec<ArrayData> = vec![
            array![[1u16, 0], [0, 2]].into(),
            ArrayData::from(array![[1u16, 0], [0, 2]]).convert(ArrayKind::Csr).unwrap(),
            ArrayData::from(array![[1u16, 0], [0, 2]]).convert(ArrayKind::Csc).unwrap(),
            ["x", "y", "x"].into_iter().collect::<CategoricalArray>().into(),
        ];
        for (i, elem) in elements.into_iter().enumerate() {
            let container: DataContainer<InMemory> = elem.write(&store, &i.to_string()).unwrap();
            assert_eq!(ArrayData::read(&container).unwrap(), elem);
            assert_eq!(ArrayData::get_shape(&container).unwrap(), elem.shape());
        }
    }
}
