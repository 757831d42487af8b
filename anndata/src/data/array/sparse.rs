mod csc;
mod csr;
mod dynamic;

pub use dynamic::{DynCscMatrix, DynCsrMatrix};

use crate::backend::*;
use crate::data::{
    array::utils::{
        canonicalize_cs, cs_major_index, cs_major_minor_index, cs_major_slice, cs_transpose,
        read_index_vec, write_cs_indices,
    },
    data_traits::*,
    slice::{SelectInfoBounds, SelectInfoElem, SelectInfoElemBounds, Shape, SliceBounds},
};
use crate::error::AnnDataError;

use anyhow::{bail, Result};
use nalgebra_sparse::{pattern::SparsityPattern, CscMatrix, CsrMatrix};
use ndarray::{Array2, ArrayView1, ArrayView2, Ix1};
use num::Zero;

/// The arrays of a compressed sparse matrix. `major` is the compressed axis:
/// rows for CSR, columns for CSC.
#[derive(Debug)]
pub(crate) struct Compressed<T> {
    major: usize,
    minor: usize,
    offsets: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<T>,
}

impl<T: Clone> Compressed<T> {
    /// Build from untrusted arrays, sorting lanes as needed.
    fn new(
        major: usize,
        minor: usize,
        offsets: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<T>,
    ) -> Result<Self> {
        let (indices, data) = canonicalize_cs(major, minor, &offsets, indices, data)?;
        Ok(Self {
            major,
            minor,
            offsets,
            indices,
            data,
        })
    }

    fn select(&self, major: &SelectInfoElemBounds, minor: &SelectInfoElemBounds) -> Self {
        select_compressed(
            self.minor,
            &self.offsets,
            &self.indices,
            &self.data,
            major,
            minor,
        )
    }

    fn into_csr(self) -> Result<CsrMatrix<T>> {
        CsrMatrix::try_from_csr_data(self.major, self.minor, self.offsets, self.indices, self.data)
            .map_err(|e| AnnDataError::corrupt(e).into())
    }

    fn into_csc(self) -> Result<CscMatrix<T>> {
        CscMatrix::try_from_csc_data(self.minor, self.major, self.offsets, self.indices, self.data)
            .map_err(|e| AnnDataError::corrupt(e).into())
    }

    fn into_pattern(self) -> (SparsityPattern, Vec<T>) {
        // Lanes produced by selection are sorted, unique and in range.
        let pattern = unsafe {
            SparsityPattern::from_offset_and_indices_unchecked(
                self.major,
                self.minor,
                self.offsets,
                self.indices,
            )
        };
        (pattern, self.data)
    }

    fn into_csr_unchecked(self) -> CsrMatrix<T> {
        let (pattern, values) = self.into_pattern();
        CsrMatrix::try_from_pattern_and_values(pattern, values).expect("one value per index")
    }

    fn into_csc_unchecked(self) -> CscMatrix<T> {
        let (pattern, values) = self.into_pattern();
        CscMatrix::try_from_pattern_and_values(pattern, values).expect("one value per index")
    }

    fn to_dense(&self, row_major: bool) -> Result<Array2<T>>
    where
        T: Default,
    {
        let (nrows, ncols) = if row_major {
            (self.major, self.minor)
        } else {
            (self.minor, self.major)
        };
        if nrows.checked_mul(ncols).is_none() {
            bail!(AnnDataError::unsupported(
                format!("sparse matrix of shape {} x {}", nrows, ncols),
                "dense array"
            ));
        }
        let mut dense = Array2::<T>::default((nrows, ncols));
        for i in 0..self.major {
            for jj in self.offsets[i]..self.offsets[i + 1] {
                let j = self.indices[jj];
                let pos = if row_major { (i, j) } else { (j, i) };
                dense[pos] = self.data[jj].clone();
            }
        }
        Ok(dense)
    }

    fn transpose(&self) -> Self {
        let (offsets, indices, data) =
            cs_transpose(self.major, self.minor, &self.offsets, &self.indices, &self.data);
        Self {
            major: self.minor,
            minor: self.major,
            offsets,
            indices,
            data,
        }
    }
}

impl<T: Clone + Zero> Compressed<T> {
    /// Collect the non-zero entries of a dense matrix, lane by lane.
    fn from_dense(arr: ArrayView2<'_, T>, row_major: bool) -> Self {
        let lanes = if row_major {
            arr.rows()
        } else {
            arr.columns()
        };
        let (major, minor) = if row_major {
            (arr.nrows(), arr.ncols())
        } else {
            (arr.ncols(), arr.nrows())
        };
        let mut offsets = Vec::with_capacity(major + 1);
        offsets.push(0);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        for lane in lanes {
            for (j, v) in lane.iter().enumerate() {
                if !v.is_zero() {
                    indices.push(j);
                    data.push(v.clone());
                }
            }
            offsets.push(indices.len());
        }
        Self {
            major,
            minor,
            offsets,
            indices,
            data,
        }
    }
}

fn full_bounds(len: usize) -> SelectInfoElemBounds {
    SelectInfoElemBounds::Slice(SliceBounds {
        start: 0,
        end: len,
        step: 1,
    })
}

fn select_compressed<T: Clone>(
    minor_len: usize,
    offsets: &[usize],
    indices: &[usize],
    data: &[T],
    major: &SelectInfoElemBounds,
    minor: &SelectInfoElemBounds,
) -> Compressed<T> {
    let (new_offsets, new_indices, new_data) = if minor.is_full(minor_len) {
        match major.as_range() {
            Some(range) => {
                let (o, i, d) = cs_major_slice(range.start, range.end, offsets, indices, data);
                (o, i.to_vec(), d.to_vec())
            }
            None => cs_major_index(&major.to_vec(), offsets, indices, data),
        }
    } else {
        cs_major_minor_index(
            &major.to_vec(),
            &minor.to_vec(),
            minor_len,
            offsets,
            indices,
            data,
        )
    };
    Compressed {
        major: major.len(),
        minor: minor.len(),
        offsets: new_offsets,
        indices: new_indices,
        data: new_data,
    }
}

/// Select on a matrix given by borrowed compressed arrays. `major_axis` is 0
/// for CSR and 1 for CSC.
fn select_borrowed<T: Clone, S: AsRef<SelectInfoElem>>(
    shape: &Shape,
    major_axis: usize,
    (offsets, indices, data): (&[usize], &[usize], &[T]),
    info: &[S],
) -> Compressed<T> {
    assert_eq!(info.len(), 2, "sparse matrices take a 2-dimensional selection");
    let minor_axis = 1 - major_axis;
    let major = SelectInfoElemBounds::new(info[major_axis].as_ref(), shape[major_axis]);
    let minor = SelectInfoElemBounds::new(info[minor_axis].as_ref(), shape[minor_axis]);
    select_compressed(shape[minor_axis], offsets, indices, data, &major, &minor)
}

fn write_compressed<B, G, T>(
    location: &G,
    name: &str,
    metadata: MetaData,
    (offsets, indices, data): (&[usize], &[usize], &[T]),
) -> Result<DataContainer<B>>
where
    B: Backend,
    G: GroupOp<B>,
    T: BackendData,
{
    let mut group = location.new_group(name)?;
    metadata.save::<B, _>(&mut group)?;
    group.new_array_dataset("data", ArrayView1::from(data).into(), Default::default())?;
    write_cs_indices::<B, _>(&group, offsets, indices)?;
    Ok(DataContainer::Group(group))
}

/// The `shape` attribute, checked against the lengths of the stored arrays.
fn read_compressed_shape<B: Backend>(
    container: &DataContainer<B>,
    major_axis: usize,
) -> Result<Shape> {
    let group = container.as_group()?;
    let shape: Vec<usize> = group.get_attr("shape")?;
    if shape.len() != 2 {
        bail!(AnnDataError::corrupt(format!(
            "sparse matrix at '{}' has a {}-dimensional shape",
            group.path().display(),
            shape.len()
        )));
    }
    let indptr = group.open_dataset("indptr")?.shape();
    if indptr.ndim() != 1 || indptr[0] != shape[major_axis] + 1 {
        bail!(AnnDataError::corrupt(format!(
            "indptr at '{}' has shape {}, expecting {}",
            group.path().display(),
            indptr,
            shape[major_axis] + 1
        )));
    }
    let indices = group.open_dataset("indices")?.shape();
    let data = group.open_dataset("data")?.shape();
    if indices != data {
        bail!(AnnDataError::corrupt(format!(
            "sparse matrix at '{}' has {} indices but {} values",
            group.path().display(),
            indices,
            data
        )));
    }
    Ok(shape.into())
}

fn read_compressed<B: Backend, T: BackendData>(
    container: &DataContainer<B>,
    major_axis: usize,
) -> Result<Compressed<T>> {
    let shape = read_compressed_shape(container, major_axis)?;
    let group = container.as_group()?;
    let offsets = read_index_vec::<B>(&group.open_dataset("indptr")?, None)?;
    let indices = read_index_vec::<B>(&group.open_dataset("indices")?, None)?;
    let data = group.open_dataset("data")?.read_array::<T, Ix1>()?.to_vec();
    Compressed::new(
        shape[major_axis],
        shape[1 - major_axis],
        offsets,
        indices,
        data,
    )
}

/// Read a selection. A contiguous range along the compressed axis only reads
/// the covered part of the stored arrays.
fn read_compressed_select<B, T, S>(
    container: &DataContainer<B>,
    major_axis: usize,
    info: &[S],
) -> Result<Compressed<T>>
where
    B: Backend,
    T: BackendData,
    S: AsRef<SelectInfoElem>,
{
    let shape = read_compressed_shape(container, major_axis)?;
    let bounds = SelectInfoBounds::new(info, &shape)?;
    if bounds.is_full() {
        return read_compressed(container, major_axis);
    }
    let major = &bounds.as_ref()[major_axis];
    let minor = &bounds.as_ref()[1 - major_axis];

    match major.as_range() {
        Some(range) => {
            let group = container.as_group()?;
            let mut offsets = read_index_vec::<B>(
                &group.open_dataset("indptr")?,
                Some(range.start..range.end + 1),
            )?;
            if offsets.windows(2).any(|w| w[0] > w[1]) {
                bail!(AnnDataError::corrupt("indptr is not monotonic"));
            }
            let lo = offsets[0];
            let hi = offsets[offsets.len() - 1];
            offsets.iter_mut().for_each(|x| *x -= lo);
            let indices = read_index_vec::<B>(&group.open_dataset("indices")?, Some(lo..hi))?;
            let data = group
                .open_dataset("data")?
                .read_array_slice::<T, _, Ix1>(&[SelectInfoElem::from(lo..hi)])?
                .to_vec();
            let part = Compressed::new(range.len(), shape[1 - major_axis], offsets, indices, data)?;
            Ok(part.select(&full_bounds(range.len()), minor))
        }
        None => Ok(read_compressed::<B, T>(container, major_axis)?.select(major, minor)),
    }
}

/// Transpose the storage layout: CSR becomes CSC of the same matrix.
pub(crate) fn csr_to_csc<T: Clone>(csr: &CsrMatrix<T>) -> Result<CscMatrix<T>> {
    let (offsets, indices, data) = csr.csr_data();
    borrowed(csr.nrows(), csr.ncols(), offsets, indices, data)
        .transpose()
        .into_csc()
}

pub(crate) fn csc_to_csr<T: Clone>(csc: &CscMatrix<T>) -> Result<CsrMatrix<T>> {
    let (offsets, indices, data) = csc.csc_data();
    borrowed(csc.ncols(), csc.nrows(), offsets, indices, data)
        .transpose()
        .into_csr()
}

pub(crate) fn csr_to_dense<T: Clone + Default>(csr: &CsrMatrix<T>) -> Result<Array2<T>> {
    let (offsets, indices, data) = csr.csr_data();
    borrowed(csr.nrows(), csr.ncols(), offsets, indices, data).to_dense(true)
}

pub(crate) fn csc_to_dense<T: Clone + Default>(csc: &CscMatrix<T>) -> Result<Array2<T>> {
    let (offsets, indices, data) = csc.csc_data();
    borrowed(csc.ncols(), csc.nrows(), offsets, indices, data).to_dense(false)
}

pub(crate) fn dense_to_csr<T: Clone + Zero>(arr: ArrayView2<'_, T>) -> Result<CsrMatrix<T>> {
    Compressed::from_dense(arr, true).into_csr()
}

pub(crate) fn dense_to_csc<T: Clone + Zero>(arr: ArrayView2<'_, T>) -> Result<CscMatrix<T>> {
    Compressed::from_dense(arr, false).into_csc()
}

fn borrowed<T: Clone>(
    major: usize,
    minor: usize,
    offsets: &[usize],
    indices: &[usize],
    data: &[T],
) -> Compressed<T> {
    Compressed {
        major,
        minor,
        offsets: offsets.to_vec(),
        indices: indices.to_vec(),
        data: data.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn dense_sparse_dense() {
        let dense = array![[1, 0, 3], [0, 0, 0], [0, 5, 0], [7, 0, 9]];
        let csr = dense_to_csr(dense.view()).unwrap();
        assert_eq!(csr.nnz(), 5);
        assert_eq!(csr.row_offsets(), &[0, 2, 2, 3, 5]);
        assert_eq!(csr_to_dense(&csr).unwrap(), dense);

        let csc = dense_to_csc(dense.view()).unwrap();
        assert_eq!(csc.col_offsets(), &[0, 2, 3, 5]);
        assert_eq!(csc_to_dense(&csc).unwrap(), dense);

        assert_eq!(csr_to_csc(&csr).unwrap(), csc);
        assert_eq!(csc_to_csr(&csc).unwrap(), csr);
    }

    #[test]
    fn empty_shapes() {
        let dense = Array2::<f64>::zeros((0, 4));
        let csr = dense_to_csr(dense.view()).unwrap();
        assert_eq!((csr.nrows(), csr.ncols()), (0, 4));
        assert_eq!(csr_to_dense(&csr).unwrap(), dense);
        let csc = csr_to_csc(&csr).unwrap();
        assert_eq!((csc.nrows(), csc.ncols()), (0, 4));
    }
}
