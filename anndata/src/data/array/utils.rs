use crate::backend::{Backend, DatasetOp, GroupOp};
use crate::data::{DynArray, SelectInfoElem};
use crate::error::AnnDataError;

use anyhow::{bail, Result};
use itertools::Itertools;
use ndarray::Array1;
use std::ops::Range;

fn to_i64_vec(arr: DynArray) -> Result<Vec<i64>> {
    macro_rules! widen {
        ($arr:expr) => {
            $arr.iter().map(|&x| x as i64).collect()
        };
    }
    let values: Vec<i64> = match arr {
        DynArray::I8(x) => widen!(x),
        DynArray::I16(x) => widen!(x),
        DynArray::I32(x) => widen!(x),
        DynArray::I64(x) => x.iter().copied().collect(),
        DynArray::U8(x) => widen!(x),
        DynArray::U16(x) => widen!(x),
        DynArray::U32(x) => widen!(x),
        DynArray::U64(x) => x
            .iter()
            .map(|&x| {
                i64::try_from(x)
                    .map_err(|_| AnnDataError::corrupt(format!("integer {} overflows i64", x)).into())
            })
            .collect::<Result<Vec<_>>>()?,
        v => bail!(AnnDataError::corrupt(format!(
            "expecting an integer array, found {}",
            v.dtype()
        ))),
    };
    Ok(values)
}

/// Read a 1-D integer dataset of any width as `i64`.
pub(crate) fn read_i64_vec<B: Backend>(dataset: &B::Dataset) -> Result<Vec<i64>> {
    to_i64_vec(dataset.read_dyn_array()?)
}

/// Read offsets or positions from a 1-D integer dataset, optionally only the
/// elements in `range`.
pub(crate) fn read_index_vec<B: Backend>(
    dataset: &B::Dataset,
    range: Option<Range<usize>>,
) -> Result<Vec<usize>> {
    let arr = match range {
        None => dataset.read_dyn_array()?,
        Some(r) => dataset.read_dyn_array_slice(&[SelectInfoElem::from(r)])?,
    };
    to_i64_vec(arr)?
        .into_iter()
        .map(|x| {
            usize::try_from(x)
                .map_err(|_| AnnDataError::corrupt(format!("negative index {}", x)).into())
        })
        .collect()
}

/// Write `indptr` and `indices` of a compressed matrix. Uses `i32` when every
/// value fits and `i64` otherwise.
pub(crate) fn write_cs_indices<B: Backend, G: GroupOp<B>>(
    group: &G,
    offsets: &[usize],
    indices: &[usize],
) -> Result<()> {
    let nnz = offsets.last().copied().unwrap_or(0);
    let max_index = indices.iter().copied().max().unwrap_or(0);
    if i32::try_from(nnz.max(max_index)).is_ok() {
        let indptr: Array1<i32> = offsets.iter().map(|&x| x as i32).collect();
        let idx: Array1<i32> = indices.iter().map(|&x| x as i32).collect();
        group.new_array_dataset("indptr", indptr.into(), Default::default())?;
        group.new_array_dataset("indices", idx.into(), Default::default())?;
    } else {
        let indptr: Array1<i64> = offsets.iter().map(|&x| x as i64).collect();
        let idx: Array1<i64> = indices.iter().map(|&x| x as i64).collect();
        group.new_array_dataset("indptr", indptr.into(), Default::default())?;
        group.new_array_dataset("indices", idx.into(), Default::default())?;
    }
    Ok(())
}

/// Validate compressed sparse data and sort every lane by minor index.
///
/// Here `major/minor` is `row/col` for CSR and `col/row` for CSC. Duplicated
/// entries, out-of-range indices and malformed offsets are reported as
/// corrupt.
pub(crate) fn canonicalize_cs<T: Clone>(
    major_dim: usize,
    minor_dim: usize,
    offsets: &[usize],
    indices: Vec<usize>,
    data: Vec<T>,
) -> Result<(Vec<usize>, Vec<T>)> {
    if offsets.len() != major_dim + 1 {
        bail!(AnnDataError::corrupt(format!(
            "indptr has length {}, expecting {}",
            offsets.len(),
            major_dim + 1
        )));
    }
    if indices.len() != data.len() {
        bail!(AnnDataError::corrupt(format!(
            "{} indices for {} stored values",
            indices.len(),
            data.len()
        )));
    }
    if offsets[0] != 0 || offsets[major_dim] != indices.len() {
        bail!(AnnDataError::corrupt(
            "indptr must start at 0 and end at the number of stored values"
        ));
    }
    if offsets.windows(2).any(|w| w[0] > w[1]) {
        bail!(AnnDataError::corrupt("indptr is not monotonic"));
    }

    let mut indices = indices;
    let mut data = data;
    for (&start, &end) in offsets.iter().tuple_windows() {
        let lane = &indices[start..end];
        if let Some(&j) = lane.iter().find(|&&j| j >= minor_dim) {
            bail!(AnnDataError::corrupt(format!(
                "index {} out of range for dimension {}",
                j, minor_dim
            )));
        }
        if lane.windows(2).any(|w| w[0] >= w[1]) {
            let mut permutation = permutation::sort(lane);
            permutation.apply_slice_in_place(&mut indices[start..end]);
            permutation.apply_slice_in_place(&mut data[start..end]);
            if indices[start..end].windows(2).any(|w| w[0] == w[1]) {
                bail!(AnnDataError::corrupt("duplicated entries in sparse matrix"));
            }
        }
    }
    Ok((indices, data))
}

/// Select rows of a CSR matrix, or columns of a CSC matrix.
pub(crate) fn cs_major_index<T: Clone>(
    major_indices: &[usize],
    offsets: &[usize],
    indices: &[usize],
    data: &[T],
) -> (Vec<usize>, Vec<usize>, Vec<T>) {
    let mut new_offsets = Vec::with_capacity(major_indices.len() + 1);
    new_offsets.push(0);
    let mut new_indices = Vec::new();
    let mut new_data = Vec::new();
    for &major in major_indices {
        let (start, end) = (offsets[major], offsets[major + 1]);
        new_indices.extend_from_slice(&indices[start..end]);
        new_data.extend_from_slice(&data[start..end]);
        new_offsets.push(new_indices.len());
    }
    (new_offsets, new_indices, new_data)
}

/// Contiguous major range `start..end`, borrowing the payload.
pub(crate) fn cs_major_slice<'a, T>(
    start: usize,
    end: usize,
    offsets: &'a [usize],
    indices: &'a [usize],
    data: &'a [T],
) -> (Vec<usize>, &'a [usize], &'a [T]) {
    let i = offsets[start];
    let j = offsets[end];
    let new_offsets = offsets[start..=end].iter().map(|&x| x - i).collect();
    (new_offsets, &indices[i..j], &data[i..j])
}

/// Select along both axes. A minor index may be requested more than once;
/// every occurrence yields its own entry. Output lanes are sorted.
pub(crate) fn cs_major_minor_index<T: Clone>(
    major_idx: &[usize],
    minor_idx: &[usize],
    len_minor: usize,
    offsets: &[usize],
    indices: &[usize],
    data: &[T],
) -> (Vec<usize>, Vec<usize>, Vec<T>) {
    // For each old minor index, the new positions it maps to.
    let mut minor_idx_count = vec![0usize; len_minor + 1];
    minor_idx.iter().for_each(|&j| minor_idx_count[j + 1] += 1);
    (1..=len_minor).for_each(|j| minor_idx_count[j] += minor_idx_count[j - 1]);
    let new_positions: Vec<usize> = minor_idx
        .iter()
        .enumerate()
        .sorted_by_key(|&(_, &k)| k)
        .map(|(j, _)| j)
        .collect();

    let mut new_offsets = Vec::with_capacity(major_idx.len() + 1);
    new_offsets.push(0);
    let mut new_indices = Vec::new();
    let mut new_data = Vec::new();
    for &i in major_idx {
        let lane_start = new_indices.len();
        for jj in offsets[i]..offsets[i + 1] {
            let j = indices[jj];
            for &k in &new_positions[minor_idx_count[j]..minor_idx_count[j + 1]] {
                new_indices.push(k);
                new_data.push(data[jj].clone());
            }
        }
        let mut permutation = permutation::sort(&new_indices[lane_start..]);
        permutation.apply_slice_in_place(&mut new_indices[lane_start..]);
        permutation.apply_slice_in_place(&mut new_data[lane_start..]);
        new_offsets.push(new_indices.len());
    }
    (new_offsets, new_indices, new_data)
}

/// Transpose compressed data: CSR arrays of an `m x n` matrix become the CSC
/// arrays of the same matrix, and the other way around.
pub(crate) fn cs_transpose<T: Clone>(
    major_dim: usize,
    minor_dim: usize,
    offsets: &[usize],
    indices: &[usize],
    data: &[T],
) -> (Vec<usize>, Vec<usize>, Vec<T>) {
    let mut new_offsets = vec![0usize; minor_dim + 1];
    indices.iter().for_each(|&j| new_offsets[j + 1] += 1);
    (1..=minor_dim).for_each(|j| new_offsets[j] += new_offsets[j - 1]);

    let mut next = new_offsets.clone();
    let mut slots: Vec<Option<(usize, T)>> = vec![None; indices.len()];
    for i in 0..major_dim {
        for jj in offsets[i]..offsets[i + 1] {
            let j = indices[jj];
            slots[next[j]] = Some((i, data[jj].clone()));
            next[j] += 1;
        }
    }
    let (new_indices, new_data) = slots.into_iter().flatten().unzip();
    (new_offsets, new_indices, new_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_sorts_lanes() {
        let offsets = vec![0, 2, 2, 5];
        let (indices, data) =
            canonicalize_cs(3, 4, &offsets, vec![3, 1, 2, 0, 1], vec![10, 11, 20, 21, 22]).unwrap();
        assert_eq!(indices, vec![1, 3, 0, 1, 2]);
        assert_eq!(data, vec![11, 10, 21, 22, 20]);
    }

    #[test]
    fn canonicalize_rejects_bad_input() {
        let is_corrupt =
            |r: Result<(Vec<usize>, Vec<i32>)>| matches!(AnnDataError::of(&r.unwrap_err()), Some(AnnDataError::Corrupt(_)));
        assert!(is_corrupt(canonicalize_cs(2, 3, &[0, 1], vec![0], vec![1])));
        assert!(is_corrupt(canonicalize_cs(1, 3, &[0, 2], vec![1, 1], vec![1, 2])));
        assert!(is_corrupt(canonicalize_cs(1, 3, &[0, 1], vec![3], vec![1])));
        assert!(is_corrupt(canonicalize_cs(2, 3, &[0, 2, 1], vec![0, 1], vec![1, 2])));
    }

    #[test]
    fn major_minor_index_repeats_columns() {
        // [[1, 0, 3], [2, 0, 1], [0, 0, 4]]
        let offsets = [0, 2, 4, 5];
        let indices = [0, 2, 0, 2, 2];
        let data = [1, 3, 2, 1, 4];
        let (o, i, d) = cs_major_minor_index(&[2, 0], &[2, 2, 0], 3, &offsets, &indices, &data);
        assert_eq!(o, vec![0, 2, 5]);
        assert_eq!(i, vec![0, 1, 0, 1, 2]);
        assert_eq!(d, vec![4, 4, 3, 3, 1]);
    }

    #[test]
    fn transpose_matches_column_layout() {
        let offsets = [0, 2, 4, 5];
        let indices = [0, 2, 0, 2, 2];
        let data = [1, 3, 2, 1, 4];
        let (o, i, d) = cs_transpose(3, 3, &offsets, &indices, &data);
        assert_eq!(o, vec![0, 2, 2, 5]);
        assert_eq!(i, vec![0, 1, 0, 1, 2]);
        assert_eq!(d, vec![1, 2, 3, 1, 4]);
    }
}
