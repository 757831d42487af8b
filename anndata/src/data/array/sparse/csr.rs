use super::{read_compressed, read_compressed_select, read_compressed_shape, select_borrowed, write_compressed};
use crate::backend::*;
use crate::data::{
    data_traits::*,
    scalar::DynScalar,
    slice::{SelectInfoElem, Shape},
};

use anyhow::Result;
use nalgebra_sparse::{csr::CsrMatrix, SparseEntry};
use std::collections::HashMap;

impl<T: BackendData> Element for CsrMatrix<T> {
    fn data_type(&self) -> DataType {
        DataType::CsrMatrix(T::DTYPE)
    }

    fn metadata(&self) -> MetaData {
        let mut metadata = HashMap::new();
        metadata.insert(
            "shape".to_string(),
            serde_json::json!([self.nrows(), self.ncols()]),
        );
        MetaData::new("csr_matrix", "0.1.0", Some(metadata))
    }
}

impl<T> HasShape for CsrMatrix<T> {
    fn shape(&self) -> Shape {
        vec![self.nrows(), self.ncols()].into()
    }
}

impl<T: BackendData> Indexable for CsrMatrix<T> {
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

impl<T: Clone> Selectable for CsrMatrix<T> {
    fn select<S>(&self, info: &[S]) -> Self
    where
        S: AsRef<SelectInfoElem>,
    {
        select_borrowed(&HasShape::shape(self), 0, self.csr_data(), info).into_csr_unchecked()
    }
}

impl<T: BackendData> Writable for CsrMatrix<T> {
    fn write<B: Backend, G: GroupOp<B>>(
        &self,
        location: &G,
        name: &str,
    ) -> Result<DataContainer<B>> {
        write_compressed(location, name, self.metadata(), self.csr_data())
    }
}

impl<T: BackendData> Readable for CsrMatrix<T> {
    fn read<B: Backend>(container: &DataContainer<B>) -> Result<Self> {
        read_compressed::<B, T>(container, 0)?.into_csr()
    }
}

impl<T: BackendData> ReadableArray for CsrMatrix<T> {
    fn get_shape<B: Backend>(container: &DataContainer<B>) -> Result<Shape> {
        read_compressed_shape(container, 0)
    }

    fn read_select<B, S>(container: &DataContainer<B>, info: &[S]) -> Result<Self>
    where
        B: Backend,
        S: AsRef<SelectInfoElem>,
    {
        read_compressed_select::<B, T, S>(container, 0, info)?.into_csr()
    }
}

impl<T: BackendData> WritableArray for &CsrMatrix<T> {}
impl<T: BackendData> WritableArray for CsrMatrix<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemory;
    use nalgebra::base::DMatrix;
    use nalgebra_sparse::CooMatrix;
    use ndarray::Array;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn dense_select(csr: &CsrMatrix<i64>, rows: &[usize], cols: &[usize]) -> CsrMatrix<i64> {
        let mut dm = DMatrix::<i64>::zeros(csr.nrows(), csr.ncols());
        csr.triplet_iter().for_each(|(r, c, v)| dm[(r, c)] = *v);
        CsrMatrix::from(&dm.select_rows(rows).select_columns(cols))
    }

    fn random_csr(n: usize, m: usize, nnz: usize) -> CsrMatrix<i64> {
        let row_indices = Array::random(nnz, Uniform::new(0, n)).to_vec();
        let col_indices = Array::random(nnz, Uniform::new(0, m)).to_vec();
        let values = Array::random(nnz, Uniform::new(1, 10000)).to_vec();
        (&CooMatrix::try_from_triplets(n, m, row_indices, col_indices, values).unwrap()).into()
    }

    #[test]
    fn select_matches_dense() {
        let (n, m) = (120, 90);
        let csr = random_csr(n, m, 800);
        let all_rows: Vec<usize> = (0..n).collect();
        let all_cols: Vec<usize> = (0..m).collect();
        let ridx = Array::random(150, Uniform::new(0, n)).to_vec();
        let cidx = Array::random(60, Uniform::new(0, m)).to_vec();

        let select = |rows: SelectInfoElem, cols: SelectInfoElem| csr.select(&[rows, cols]);

        assert_eq!(
            select((2..77).into(), (..).into()),
            dense_select(&csr, &(2..77).collect::<Vec<_>>(), &all_cols)
        );
        assert_eq!(
            select(ridx.clone().into(), (..).into()),
            dense_select(&csr, &ridx, &all_cols)
        );
        assert_eq!(
            select((..).into(), cidx.clone().into()),
            dense_select(&csr, &all_rows, &cidx)
        );
        assert_eq!(
            select(ridx.clone().into(), cidx.clone().into()),
            dense_select(&csr, &ridx, &cidx)
        );
        assert_eq!(
            select(
                ndarray::Slice::new(0, None, -3).into(),
                (10..40).into()
            ),
            dense_select(
                &csr,
                &(0..n).rev().step_by(3).collect::<Vec<_>>(),
                &(10..40).collect::<Vec<_>>()
            )
        );
    }

    #[test]
    fn write_then_read_slices() {
        let csr = random_csr(50, 30, 200);
        let store = InMemory::new("csr").unwrap();
        let container: DataContainer<InMemory> = csr.write(&store, "m").unwrap();

        assert_eq!(CsrMatrix::<i64>::read(&container).unwrap(), csr);
        assert_eq!(
            CsrMatrix::<i64>::get_shape(&container).unwrap(),
            vec![50, 30].into()
        );

        let info: [SelectInfoElem; 2] = [(5..20).into(), (..).into()];
        assert_eq!(
            CsrMatrix::<i64>::read_select(&container, &info).unwrap(),
            csr.select(&info)
        );
        let info: [SelectInfoElem; 2] = [vec![49, 0, 0].into(), (3..9).into()];
        assert_eq!(
            CsrMatrix::<i64>::read_select(&container, &info).unwrap(),
            csr.select(&info)
        );
        let info: [SelectInfoElem; 2] = [vec![50].into(), (..).into()];
        assert!(CsrMatrix::<i64>::read_select(&container, &info).is_err());
    }

    #[test]
    fn get_reads_zero_and_stored_values() {
        let csr: CsrMatrix<f32> = CsrMatrix::try_from_csr_data(
            2,
            3,
            vec![0, 1, 2],
            vec![2, 0],
            vec![1.5, -2.0],
        )
        .unwrap();
        assert_eq!(csr.get(&[0, 2]), Some(DynScalar::F32(1.5)));
        assert_eq!(csr.get(&[0, 1]), Some(DynScalar::F32(0.0)));
        assert_eq!(csr.get(&[2, 0]), None);
    }
}
