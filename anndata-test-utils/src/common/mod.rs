use anndata::backend::Backend;
use anndata::data::{
    ArrayData, CategoricalArray, DataFrame, DataFrameIndex, DynArray, DynCscMatrix, DynCsrMatrix,
    Element, HasShape, Mapping, SelectInfoElem, SelectInfoElemBounds,
};
use anndata::{AnnData, AnnDataOp, AxisArrays};

use anyhow::Result;
use itertools::Itertools;
use nalgebra::base::DMatrix;
use nalgebra::Scalar;
use nalgebra_sparse::{csc::CscMatrix, csr::CsrMatrix};
use ndarray::{array, Array, Array1, ArrayD, Axis};
use ndarray_rand::rand_distr::uniform::SampleUniform;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use num::Zero;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use rand::seq::IteratorRandom;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

pub fn with_tmp_dir<T, F: FnMut(PathBuf) -> T>(mut func: F) -> T {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();
    func(path)
}

////////////////////////////////////////////////////////////////////////////////
/// Strategies
////////////////////////////////////////////////////////////////////////////////

/// Strategy for generating a random AnnData with `n_obs` x `n_vars` axes.
/// Every collection gets between zero and two elements.
pub fn anndata_strat<B: Backend, P: AsRef<Path> + Clone>(
    file: P,
    n_obs: usize,
    n_vars: usize,
) -> impl Strategy<Value = AnnData<B>> {
    let x = proptest::option::of(array_strat(&[n_obs, n_vars]));
    let obs = obs_strat(n_obs);
    let var_names = index_strat(n_vars);
    let obsm = proptest::collection::vec(0usize..10, 0..3).prop_flat_map(move |dims| {
        dims.into_iter()
            .map(|d| array_strat(&[n_obs, d]))
            .collect::<Vec<_>>()
    });
    let obsp = (0usize..3).prop_flat_map(move |d| {
        std::iter::repeat_with(|| array_strat(&[n_obs, n_obs]))
            .take(d)
            .collect::<Vec<_>>()
    });
    let varm = proptest::collection::vec(0usize..10, 0..3).prop_flat_map(move |dims| {
        dims.into_iter()
            .map(|d| array_strat(&[n_vars, d]))
            .collect::<Vec<_>>()
    });
    let varp = (0usize..3).prop_flat_map(move |d| {
        std::iter::repeat_with(|| array_strat(&[n_vars, n_vars]))
            .take(d)
            .collect::<Vec<_>>()
    });
    let layers = (0usize..3).prop_flat_map(move |d| {
        std::iter::repeat_with(|| array_strat(&[n_obs, n_vars]))
            .take(d)
            .collect::<Vec<_>>()
    });
    (x, obs, var_names, obsm, obsp, varm, varp, layers).prop_map(
        move |(x, obs, var_names, obsm, obsp, varm, varp, layers)| {
            let adata: AnnData<B> = AnnData::new(file.clone()).unwrap();
            if let Some(x) = x {
                adata.set_x(x).unwrap();
            }
            adata.set_obs(obs).unwrap();
            adata.set_var_names(var_names).unwrap();
            obsm.into_iter().enumerate().for_each(|(i, arr)| {
                adata.add_obsm(&format!("obsm_{}", i), arr).unwrap();
            });
            obsp.into_iter().enumerate().for_each(|(i, arr)| {
                adata.add_obsp(&format!("obsp_{}", i), arr).unwrap();
            });
            varm.into_iter().enumerate().for_each(|(i, arr)| {
                adata.add_varm(&format!("varm_{}", i), arr).unwrap();
            });
            varp.into_iter().enumerate().for_each(|(i, arr)| {
                adata.add_varp(&format!("varp_{}", i), arr).unwrap();
            });
            layers.into_iter().enumerate().for_each(|(i, arr)| {
                adata.add_layer(&format!("layer_{}", i), arr).unwrap();
            });
            adata.add_uns("method", "leiden").unwrap();
            let mut params = Mapping::new();
            params.insert("resolution", 0.8f64);
            params.insert("colors", array!["red".to_string(), "blue".to_string()]);
            adata.add_uns("params", params).unwrap();
            adata
        },
    )
}

/// Row names: positional, unique strings or strings with repeats.
pub fn index_strat(n: usize) -> BoxedStrategy<DataFrameIndex> {
    if n == 0 {
        Just(DataFrameIndex::empty()).boxed()
    } else {
        let list: DataFrameIndex = (0..n).map(|i| format!("i_{}", i)).collect();
        let repeated: DataFrameIndex = (0..n).map(|i| format!("g_{}", i % 3)).collect();
        let range = DataFrameIndex::from(n);
        prop_oneof![Just(list), Just(repeated), Just(range)].boxed()
    }
}

/// Observation table with an integer, a categorical and a float column.
pub fn obs_strat(n: usize) -> impl Strategy<Value = DataFrame> {
    (
        proptest::collection::vec(0u32..100_000, n),
        proptest::collection::vec(proptest::option::of(0usize..4), n),
        proptest::collection::vec(-1e3f64..1e3, n),
        index_strat(n),
    )
        .prop_map(move |(counts, clusters, scores, index)| {
            let cell_type: CategoricalArray = clusters
                .iter()
                .map(|c| c.map(|c| ["B", "T", "NK", "Mono"][c]))
                .collect();
            let mut df = DataFrame::new(n);
            df.insert("n_counts", Array1::from(counts)).unwrap();
            df.insert("cell_type", cell_type).unwrap();
            df.insert("score", Array1::from(scores)).unwrap();
            df.set_index(index).unwrap();
            df
        })
}

pub fn array_slice_strat(shape: &[usize]) -> impl Strategy<Value = (ArrayData, Vec<SelectInfoElem>)> {
    array_strat(shape).prop_flat_map(|x| {
        let select = x
            .shape()
            .as_ref()
            .iter()
            .map(|&s| select_strat(s))
            .collect::<Vec<_>>();
        (Just(x), select)
    })
}

/// Matrices may come out dense, CSR or CSC. Other shapes are always dense.
pub fn array_strat(shape: &[usize]) -> BoxedStrategy<ArrayData> {
    if shape.len() == 2 {
        prop_oneof![
            csr_strat(shape[0], shape[1]),
            csc_strat(shape[0], shape[1]),
            dense_array_strat(shape),
        ]
        .boxed()
    } else {
        dense_array_strat(shape).boxed()
    }
}

/// Strategy for generating a random CsrMatrix
pub fn csr_strat(num_rows: usize, num_cols: usize) -> impl Strategy<Value = ArrayData> {
    let nnz = num_rows * num_cols / 10;
    prop_oneof![
        Just(rand_csr::<u8>(num_rows, num_cols, nnz, 1, 100).into()),
        Just(rand_csr::<u16>(num_rows, num_cols, nnz, 1, 100).into()),
        Just(rand_csr::<u32>(num_rows, num_cols, nnz, 1, 2550).into()),
        Just(rand_csr::<u64>(num_rows, num_cols, nnz, 1, 25500).into()),
        Just(rand_csr::<i8>(num_rows, num_cols, nnz, 1, 100).into()),
        Just(rand_csr::<i16>(num_rows, num_cols, nnz, 1, 100).into()),
        Just(rand_csr::<i32>(num_rows, num_cols, nnz, 1, 2550).into()),
        Just(rand_csr::<i64>(num_rows, num_cols, nnz, 1, 25500).into()),
        Just(rand_csr::<f32>(num_rows, num_cols, nnz, 1.0, 255.0).into()),
        Just(rand_csr::<f64>(num_rows, num_cols, nnz, 1.0, 255.0).into()),
    ]
}

/// Strategy for generating a random CscMatrix
pub fn csc_strat(num_rows: usize, num_cols: usize) -> impl Strategy<Value = ArrayData> {
    let nnz = num_rows * num_cols / 10;
    prop_oneof![
        Just(rand_csc::<u8>(num_rows, num_cols, nnz, 1, 100).into()),
        Just(rand_csc::<u16>(num_rows, num_cols, nnz, 1, 100).into()),
        Just(rand_csc::<u32>(num_rows, num_cols, nnz, 1, 2550).into()),
        Just(rand_csc::<u64>(num_rows, num_cols, nnz, 1, 25500).into()),
        Just(rand_csc::<i8>(num_rows, num_cols, nnz, 1, 100).into()),
        Just(rand_csc::<i16>(num_rows, num_cols, nnz, 1, 100).into()),
        Just(rand_csc::<i32>(num_rows, num_cols, nnz, 1, 2550).into()),
        Just(rand_csc::<i64>(num_rows, num_cols, nnz, 1, 25500).into()),
        Just(rand_csc::<f32>(num_rows, num_cols, nnz, 1.0, 255.0).into()),
        Just(rand_csc::<f64>(num_rows, num_cols, nnz, 1.0, 255.0).into()),
    ]
}

/// Dense arrays of every element type, in both memory orders.
pub fn dense_array_strat(shape: &[usize]) -> impl Strategy<Value = ArrayData> {
    let shape = shape.to_vec();
    let s: Vec<_> = shape.iter().rev().copied().collect();
    prop_oneof![
        Just(Array::random(shape.clone(), Uniform::new(0u8, 255u8)).into()),
        Just(Array::random(shape.clone(), Uniform::new(0u16, 255u16)).into()),
        Just(Array::random(shape.clone(), Uniform::new(0u32, 255u32)).into()),
        Just(Array::random(shape.clone(), Uniform::new(0u64, 255u64)).into()),
        Just(Array::random(shape.clone(), Uniform::new(-128i8, 127i8)).into()),
        Just(Array::random(shape.clone(), Uniform::new(-128i16, 127i16)).into()),
        Just(Array::random(shape.clone(), Uniform::new(-128i32, 127i32)).into()),
        Just(Array::random(shape.clone(), Uniform::new(-128i64, 127i64)).into()),
        Just(Array::random(shape.clone(), Uniform::new(-128f32, 127f32)).into()),
        Just(Array::random(shape.clone(), Uniform::new(-128f64, 127f64)).into()),
        Just(
            Array::random(shape.clone(), Uniform::new(0u8, 2u8))
                .mapv(|x| x == 1)
                .into()
        ),
        Just(
            Array::random(shape.clone(), Uniform::new(-1000f32, 1000f32))
                .mapv(|x| x.to_string())
                .into()
        ),
        Just(
            Array::random(s.clone(), Uniform::new(0u16, 255u16))
                .reversed_axes()
                .into()
        ),
        Just(
            Array::random(s.clone(), Uniform::new(-128i32, 127i32))
                .reversed_axes()
                .into()
        ),
        Just(
            Array::random(s.clone(), Uniform::new(-128f64, 127f64))
                .reversed_axes()
                .into()
        ),
        Just(
            Array::random(s.clone(), Uniform::new(-1000f32, 1000f32))
                .mapv(|x| x.to_string())
                .reversed_axes()
                .into()
        ),
    ]
}

/// Random positions in row-major order, paired with their compressed offsets.
fn rand_pattern(nrow: usize, ncol: usize, nnz: usize) -> (Vec<usize>, Vec<usize>) {
    let mut rng = rand::thread_rng();
    let mut positions = (0..nrow)
        .cartesian_product(0..ncol)
        .choose_multiple(&mut rng, nnz);
    positions.sort_unstable();
    let mut offsets = vec![0; nrow + 1];
    positions.iter().for_each(|&(r, _)| offsets[r + 1] += 1);
    for i in 0..nrow {
        offsets[i + 1] += offsets[i];
    }
    (offsets, positions.into_iter().map(|(_, c)| c).collect())
}

/// Generate a random compressed sparse row matrix
pub fn rand_csr<T>(nrow: usize, ncol: usize, nnz: usize, low: T, high: T) -> CsrMatrix<T>
where
    T: SampleUniform + Clone,
{
    let (offsets, indices) = rand_pattern(nrow, ncol, nnz);
    let values: Vec<T> = Array::random((indices.len(),), Uniform::new(low, high)).to_vec();
    CsrMatrix::try_from_csr_data(nrow, ncol, offsets, indices, values).unwrap()
}

/// Generate a random compressed sparse column matrix
pub fn rand_csc<T>(nrow: usize, ncol: usize, nnz: usize, low: T, high: T) -> CscMatrix<T>
where
    T: SampleUniform + Clone,
{
    let (offsets, indices) = rand_pattern(ncol, nrow, nnz);
    let values: Vec<T> = Array::random((indices.len(),), Uniform::new(low, high)).to_vec();
    CscMatrix::try_from_csc_data(nrow, ncol, offsets, indices, values).unwrap()
}

/// Index lists (with repeats, in any order) or contiguous ranges.
pub fn select_strat(n: usize) -> BoxedStrategy<SelectInfoElem> {
    if n == 0 {
        Just(Vec::new().into()).boxed()
    } else {
        let indices = proptest::collection::vec(0..n, 0..2 * n).prop_map(|i| i.into());
        let slice = (0..n).prop_flat_map(move |start| {
            (Just(start), (start + 1)..=n).prop_map(|(start, stop)| (start..stop).into())
        });
        prop_oneof![indices, slice, Just(SelectInfoElem::full())].boxed()
    }
}

////////////////////////////////////////////////////////////////////////////////
/// AnnData operations
////////////////////////////////////////////////////////////////////////////////

fn axis_arrays_eq<B1: Backend, B2: Backend>(a: &AxisArrays<B1>, b: &AxisArrays<B2>) -> Result<bool> {
    let keys = a.keys().into_iter().sorted().collect::<Vec<_>>();
    if keys != b.keys().into_iter().sorted().collect::<Vec<_>>() {
        return Ok(false);
    }
    for k in keys {
        if a.get_item(&k)? != b.get_item(&k)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Element-wise comparison of two AnnData objects, regardless of backend.
/// The order of keys within a collection is not compared.
pub fn anndata_eq<B1: Backend, B2: Backend>(
    adata1: &AnnData<B1>,
    adata2: &AnnData<B2>,
) -> Result<bool> {
    let uns_keys = adata1.uns_keys().into_iter().sorted().collect::<Vec<_>>();
    let uns_eq = uns_keys == adata2.uns_keys().into_iter().sorted().collect::<Vec<_>>()
        && uns_keys
            .iter()
            .map(|k| Ok(adata1.uns().get_item(k)? == adata2.uns().get_item(k)?))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .all(|x| x);
    let is_equal = adata1.n_obs() == adata2.n_obs()
        && adata1.n_vars() == adata2.n_vars()
        && adata1.obs_names() == adata2.obs_names()
        && adata1.var_names() == adata2.var_names()
        && adata1.read_obs()? == adata2.read_obs()?
        && adata1.read_var()? == adata2.read_var()?
        && adata1.read_x::<ArrayData>()? == adata2.read_x::<ArrayData>()?
        && axis_arrays_eq(adata1.obsm(), adata2.obsm())?
        && axis_arrays_eq(adata1.obsp(), adata2.obsp())?
        && axis_arrays_eq(adata1.varm(), adata2.varm())?
        && axis_arrays_eq(adata1.varp(), adata2.varp())?
        && axis_arrays_eq(adata1.layers(), adata2.layers())?
        && uns_eq;
    Ok(is_equal)
}

////////////////////////////////////////////////////////////////////////////////
/// Array operations
////////////////////////////////////////////////////////////////////////////////

/// Reference selection, computed through full dense copies.
pub fn array_select(arr: &ArrayData, select: &[SelectInfoElem]) -> ArrayData {
    macro_rules! dense {
        ($($variant:ident),*) => {
            match arr {
                $(ArrayData::Array(DynArray::$variant(x)) => {
                    return dense_array_select(x, select).into();
                })*
                _ => {}
            }
        };
    }
    macro_rules! sparse {
        ($($variant:ident),*) => {
            match arr {
                $(ArrayData::CsrMatrix(DynCsrMatrix::$variant(x)) => {
                    return csr_select(x, select).into();
                })*
                $(ArrayData::CscMatrix(DynCscMatrix::$variant(x)) => {
                    return csc_select(x, select).into();
                })*
                _ => {}
            }
        };
    }
    dense!(I8, I16, I32, I64, U8, U16, U32, U64, F32, F64, Bool, String);
    sparse!(I8, I16, I32, I64, U8, U16, U32, U64, F32, F64);
    panic!("no reference selection for {:?}", arr.data_type())
}

/// Reference selection of rows and, for matrices, columns. Remaining axes are
/// kept whole.
pub fn array_select_axes(arr: &ArrayData, rows: &SelectInfoElem, cols: Option<&SelectInfoElem>) -> ArrayData {
    let mut select = vec![SelectInfoElem::full(); arr.shape().ndim()];
    select[0] = rows.clone();
    if let Some(cols) = cols {
        select[1] = cols.clone();
    }
    array_select(arr, &select)
}

fn bounded(select: &SelectInfoElem, n: usize) -> Vec<usize> {
    SelectInfoElemBounds::new(select, n).to_vec()
}

fn csr_select<T: Scalar + Zero>(csr: &CsrMatrix<T>, select: &[SelectInfoElem]) -> CsrMatrix<T> {
    let i = bounded(&select[0], csr.nrows());
    let j = bounded(&select[1], csr.ncols());
    let mut dm = DMatrix::<T>::zeros(csr.nrows(), csr.ncols());
    csr.triplet_iter().for_each(|(r, c, v)| dm[(r, c)] = v.clone());
    CsrMatrix::from(&dm.select_rows(&i).select_columns(&j))
}

fn csc_select<T: Scalar + Zero>(csc: &CscMatrix<T>, select: &[SelectInfoElem]) -> CscMatrix<T> {
    let i = bounded(&select[0], csc.nrows());
    let j = bounded(&select[1], csc.ncols());
    let mut dm = DMatrix::<T>::zeros(csc.nrows(), csc.ncols());
    csc.triplet_iter().for_each(|(r, c, v)| dm[(r, c)] = v.clone());
    CscMatrix::from(&dm.select_rows(&i).select_columns(&j))
}

fn dense_array_select<T: Clone>(array: &ArrayD<T>, select: &[SelectInfoElem]) -> ArrayD<T> {
    let mut result = array.clone();
    array.shape().iter().enumerate().for_each(|(i, &dim)| {
        let idx = bounded(&select[i], dim);
        result = result.select(Axis(i), idx.as_slice());
    });
    result
}
