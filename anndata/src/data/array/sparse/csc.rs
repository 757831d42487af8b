use super::{read_compressed, read_compressed_select, read_compressed_shape, select_borrowed, write_compressed};
use crate::backend::*;
use crate::data::{
    data_traits::*,
    scalar::DynScalar,
    slice::{SelectInfoElem, Shape},
};

use anyhow::Result;
use nalgebra_sparse::{csc::CscMatrix, SparseEntry};
use std::collections::HashMap;

impl<T: BackendData> Element for CscMatrix<T> {
    fn data_type(&self) -> DataType {
        DataType::CscMatrix(T::DTYPE)
    }

    fn metadata(&self) -> MetaData {
        let mut metadata = HashMap::new();
        metadata.insert(
            "shape".to_string(),
            serde_json::json!([self.nrows(), self.ncols()]),
        );
        MetaData::new("csc_matrix", "0.1.0", Some(metadata))
    }
}

impl<T> HasShape for CscMatrix<T> {
    fn shape(&self) -> Shape {
        vec![self.nrows(), self.ncols()].into()
    }
}

impl<T: BackendData> Indexable for CscMatrix<T> {
    fn get(&self, index: &[usize]) -> Option<DynScalar> {
        let (i, j) = match index {
            &[i, j] if i < self.nrows() && j < self.ncols() => (i, j),
            _ => return None,
        };
        match self.get_entry(i, j)? {
            SparseEntry::NonZero(v) => Some(v.into_dyn()),
            SparseEntry::Zero => Some(T::default().into_dyn()),
        }
    }
}

impl<T: Clone> Selectable for CscMatrix<T> {
    fn select<S>(&self, info: &[S]) -> Self
    where
        S: AsRef<SelectInfoElem>,
    {
        select_borrowed(&HasShape::shape(self), 1, self.csc_data(), info).into_csc_unchecked()
    }
}

impl<T: BackendData> Writable for CscMatrix<T> {
    fn write<B: Backend, G: GroupOp<B>>(
        &self,
        location: &G,
        name: &str,
    ) -> Result<DataContainer<B>> {
        write_compressed(location, name, self.metadata(), self.csc_data())
    }
}

impl<T: BackendData> Readable for CscMatrix<T> {
    fn read<B: Backend>(container: &DataContainer<B>) -> Result<Self> {
        read_compressed::<B, T>(container, 1)?.into_csc()
    }
}

impl<T: BackendData> ReadableArray for CscMatrix<T> {
    fn get_shape<B: Backend>(container: &DataContainer<B>) -> Result<Shape> {
        read_compressed_shape(container, 1)
    }

    fn read_select<B, S>(container: &DataContainer<B>, info: &[S]) -> Result<Self>
    where
        B: Backend,
        S: AsRef<SelectInfoElem>,
    {
        read_compressed_select::<B, T, S>(container, 1, info)?.into_csc()
    }
}

impl<T: BackendData> WritableArray for &CscMatrix<T> {}
impl<T: BackendData> WritableArray for CscMatrix<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemory;
    use crate::error::AnnDataError;
    use nalgebra::base::DMatrix;
    use nalgebra_sparse::CooMatrix;
    use ndarray::Array;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn dense_select(csc: &CscMatrix<i64>, rows: &[usize], cols: &[usize]) -> CscMatrix<i64> {
        let mut dm = DMatrix::<i64>::zeros(csc.nrows(), csc.ncols());
        csc.triplet_iter().for_each(|(r, c, v)| dm[(r, c)] = *v);
        CscMatrix::from(&dm.select_rows(rows).select_columns(cols))
    }

    #[test]
    fn select_matches_dense() {
        let (n, m) = (80, 110);
        let nnz = 600;
        let csc: CscMatrix<i64> = (&CooMatrix::try_from_triplets(
            n,
            m,
            Array::random(nnz, Uniform::new(0, n)).to_vec(),
            Array::random(nnz, Uniform::new(0, m)).to_vec(),
            Array::random(nnz, Uniform::new(1, 1000)).to_vec(),
        )
        .unwrap())
            .into();
        let ridx = Array::random(50, Uniform::new(0, n)).to_vec();
        let cidx = Array::random(130, Uniform::new(0, m)).to_vec();
        let all_rows: Vec<usize> = (0..n).collect();

        let info: [SelectInfoElem; 2] = [(..).into(), (7..91).into()];
        assert_eq!(
            csc.select(&info),
            dense_select(&csc, &all_rows, &(7..91).collect::<Vec<_>>())
        );
        let info: [SelectInfoElem; 2] = [ridx.clone().into(), cidx.clone().into()];
        assert_eq!(csc.select(&info), dense_select(&csc, &ridx, &cidx));
        let info: [SelectInfoElem; 2] = [(3..30).into(), cidx.clone().into()];
        assert_eq!(
            csc.select(&info),
            dense_select(&csc, &(3..30).collect::<Vec<_>>(), &cidx)
        );
    }

    #[test]
    fn unsorted_lanes_are_sorted_on_read() {
        let store = InMemory::new("csc").unwrap();
        let mut group = store.new_group("m").unwrap();
        group.new_attr("encoding-type", "csc_matrix").unwrap();
        group.new_attr("shape", vec![3usize, 2]).unwrap();
        group
            .new_array_dataset("data", ndarray::arr1(&[1.0f64, 2.0, 3.0]).into(), Default::default())
            .unwrap();
        group
            .new_array_dataset("indices", ndarray::arr1(&[2i32, 0, 1]).into(), Default::default())
            .unwrap();
        group
            .new_array_dataset("indptr", ndarray::arr1(&[0i64, 2, 3]).into(), Default::default())
            .unwrap();

        let container = DataContainer::<InMemory>::Group(group);
        let csc = CscMatrix::<f64>::read(&container).unwrap();
        assert_eq!(csc.row_indices(), &[0, 2, 1]);
        assert_eq!(csc.values(), &[2.0, 1.0, 3.0]);

        container
            .as_group()
            .unwrap()
            .delete("indptr")
            .unwrap();
        container
            .as_group()
            .unwrap()
            .new_array_dataset("indptr", ndarray::arr1(&[0i64, 3]).into(), Default::default())
            .unwrap();
        let err = CscMatrix::<f64>::get_shape(&container).unwrap_err();
        assert!(matches!(
            AnnDataError::of(&err),
            Some(AnnDataError::Corrupt(_))
        ));
    }
}
