mod common;
pub use common::*;

use anndata::{
    backend::Backend,
    data::{ArrayData, ArrayKind, Column, DataFrameIndex, HasShape, SelectInfoElem, SelectInfoElemBounds},
    AnnData, AnnDataError, AnnDataOp,
};
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use ndarray::{Array1, Array2, Array3};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use proptest::prelude::*;

fn is_axis_mismatch(err: &anyhow::Error) -> bool {
    matches!(
        AnnDataError::of(err),
        Some(AnnDataError::AxisMismatch { .. })
    )
}

pub fn test_basic<B: Backend>() {
    with_tmp_dir(|dir| {
        let adata = AnnData::<B>::new(dir.join("basic")).unwrap();
        assert_eq!(adata.is_backed(), B::PERSISTENT);
        assert_eq!((adata.n_obs(), adata.n_vars()), (0, 0));

        let csc = rand_csc::<i32>(10, 5, 3, 1, 100);
        adata.add_obsm("csc", &csc).unwrap();
        assert_eq!(adata.n_obs(), 10);
        assert!(adata.fetch_obsm::<CsrMatrix<i32>>("csc").is_err());
        assert_eq!(adata.fetch_obsm::<CscMatrix<i32>>("csc").unwrap().unwrap(), csc);
        assert!(adata.fetch_obsm::<ArrayData>("missing").unwrap().is_none());

        adata.add_obs_column("batch", Array1::from(vec![1u8; 10])).unwrap();
        adata
            .add_var_column("gene_ids", Array1::from_iter((0..7).map(|i| format!("ENSG{}", i))))
            .unwrap();
        assert_eq!(adata.n_vars(), 7);
        assert_eq!(adata.obs_keys(), vec!["batch"]);

        adata.add_uns("version", 2u32).unwrap();
        assert_eq!(adata.fetch_uns::<u32>("version").unwrap(), Some(2));

        let text = adata.to_string();
        assert!(text.contains("10 x 7"));
        assert!(text.contains("obsm: 'csc'"));

        adata.del_obsm("csc").unwrap();
        assert!(adata.obsm_keys().is_empty());
        adata.del_obs_column("batch").unwrap();
        assert!(adata.obs_keys().is_empty());
        adata.close().unwrap();
    })
}

/// Copies to a backend `O` hold the same elements, and selective copies hold
/// exactly the selected rows and columns.
pub fn test_copy<B: Backend, O: Backend>() {
    with_tmp_dir(|dir| {
        let input = dir.join("input");
        let output = dir.join("output");
        let anndatas = ((0usize..20), (0usize..20)).prop_flat_map(move |(n_obs, n_vars)| {
            (
                anndata_strat::<B, _>(input.clone(), n_obs, n_vars),
                select_strat(n_obs),
                select_strat(n_vars),
            )
        });
        proptest!(ProptestConfig::with_cases(32), |((adata, slice_obs, slice_var) in anndatas)| {
            let copied = adata.copy::<O, _>(&output).unwrap();
            prop_assert!(anndata_eq(&adata, &copied).unwrap());
            copied.close().unwrap();

            let n_obs = SelectInfoElemBounds::new(&slice_obs, adata.n_obs()).len();
            let n_vars = SelectInfoElemBounds::new(&slice_var, adata.n_vars()).len();
            let select = [slice_obs.clone(), slice_var.clone()];
            let subset = adata.copy_select::<O, _, _>(&select, &output).unwrap();
            prop_assert_eq!((subset.n_obs(), subset.n_vars()), (n_obs, n_vars));
            prop_assert_eq!(subset.obs_names(), adata.obs_names().select(&slice_obs));
            prop_assert_eq!(subset.var_names(), adata.var_names().select(&slice_var));
            prop_assert_eq!(
                subset.read_x::<ArrayData>().unwrap(),
                adata.read_x::<ArrayData>().unwrap().map(|x| array_select(&x, &select))
            );
            for k in adata.obsm_keys() {
                let expected = array_select_axes(&adata.fetch_obsm(&k).unwrap().unwrap(), &slice_obs, None);
                prop_assert_eq!(subset.fetch_obsm::<ArrayData>(&k).unwrap().unwrap(), expected);
            }
            for k in adata.obsp_keys() {
                let expected = array_select_axes(&adata.fetch_obsp(&k).unwrap().unwrap(), &slice_obs, Some(&slice_obs));
                prop_assert_eq!(subset.fetch_obsp::<ArrayData>(&k).unwrap().unwrap(), expected);
            }
            for k in adata.varm_keys() {
                let expected = array_select_axes(&adata.fetch_varm(&k).unwrap().unwrap(), &slice_var, None);
                prop_assert_eq!(subset.fetch_varm::<ArrayData>(&k).unwrap().unwrap(), expected);
            }
            for k in adata.varp_keys() {
                let expected = array_select_axes(&adata.fetch_varp(&k).unwrap().unwrap(), &slice_var, Some(&slice_var));
                prop_assert_eq!(subset.fetch_varp::<ArrayData>(&k).unwrap().unwrap(), expected);
            }
            for k in adata.layers_keys() {
                let expected = array_select_axes(&adata.fetch_layer(&k).unwrap().unwrap(), &slice_obs, Some(&slice_var));
                prop_assert_eq!(subset.fetch_layer::<ArrayData>(&k).unwrap().unwrap(), expected);
            }
            prop_assert_eq!(
                subset.read_obs().unwrap(),
                adata.read_obs().unwrap().select_rows(&slice_obs)
            );
            subset.close().unwrap();
            adata.close().unwrap();
        });
    });
}

/// A 47 x 79 object with dense X, an integer obs column `txt` and an integer
/// `X_pca` stored both dense and as CSR survives a copy unchanged.
pub fn test_copy_example<B: Backend, O: Backend>() {
    with_tmp_dir(|dir| {
        let adata = AnnData::<B>::new(dir.join("source")).unwrap();
        let x = Array2::random((47, 79), Uniform::new(0.0f64, 1.0));
        let txt = Array1::random(47, Uniform::new(0i64, 100000));
        let x_pca = Array2::random((47, 139), Uniform::new(-50i32, 50));
        let sparse = ArrayData::from(x_pca.clone()).convert(ArrayKind::Csr).unwrap();
        adata.set_x(&x).unwrap();
        adata.add_obs_column("txt", txt.clone()).unwrap();
        adata.add_obsm("X_pca", &x_pca).unwrap();
        adata.add_obsm("sparse", sparse).unwrap();

        let copied = adata.copy::<O, _>(dir.join("copy")).unwrap();
        assert!(anndata_eq(&adata, &copied).unwrap());
        assert_eq!((copied.n_obs(), copied.n_vars()), (47, 79));
        assert_eq!(copied.read_x::<Array2<f64>>().unwrap().unwrap(), x);
        assert_eq!(copied.fetch_obsm::<Array2<i32>>("X_pca").unwrap().unwrap(), x_pca);

        let sparse = copied.fetch_obsm::<ArrayData>("sparse").unwrap().unwrap();
        assert_eq!(sparse.kind(), Some(ArrayKind::Csr));
        let dense: Array2<i32> = sparse.to_dense().unwrap().try_into().unwrap();
        assert_eq!(dense, x_pca);

        assert_eq!(copied.obs_keys(), vec!["txt"]);
        match copied.fetch_obs_column("txt").unwrap() {
            Some(Column::Array(col)) => {
                let col: Array1<i64> = col.try_into().unwrap();
                assert_eq!(col, txt);
            }
            other => panic!("unexpected column {:?}", other),
        }

        // Changes to the copy do not reach the source.
        copied.add_obsm("extra", Array2::<u8>::zeros((47, 2))).unwrap();
        copied.del_obsm("X_pca").unwrap();
        assert_eq!(adata.obsm_keys(), vec!["X_pca", "sparse"]);
        copied.close().unwrap();
        adata.close().unwrap();
    })
}

pub fn test_special_cases<B, F>(adata_gen: F)
where
    B: Backend,
    F: Fn() -> AnnData<B>,
{
    let adata = adata_gen();

    // Zero rows and columns.
    let arr = Array2::<i32>::zeros((0, 0));
    adata.set_x(&arr).unwrap();
    assert_eq!(adata.read_x::<Array2<i32>>().unwrap().unwrap(), arr);
    assert_eq!(adata.obs_names().len(), 0);

    // Adding matrices with wrong shapes should fail
    let arr2 = Array2::<i32>::zeros((10, 20));
    let err = adata.add_obsm("test", &arr2).unwrap_err();
    assert!(is_axis_mismatch(&err));
    assert!(adata.obsm_keys().is_empty());
    assert!(adata.set_x(&arr2).is_err());
    assert_eq!(adata.read_x::<Array2<i32>>().unwrap().unwrap(), arr);
    adata.close().unwrap();

    // Sparse with zero rows
    let adata = adata_gen();
    adata.set_x(rand_csr::<f64>(0, 5, 0, 1.0, 2.0)).unwrap();
    assert_eq!((adata.n_obs(), adata.n_vars()), (0, 5));
    assert_eq!(
        adata.read_x::<CsrMatrix<f64>>().unwrap().unwrap().nnz(),
        0
    );
    adata.close().unwrap();

    // X must be a matrix
    let adata = adata_gen();
    assert!(adata.set_x(Array3::<f32>::zeros((2, 3, 4))).is_err());
    assert!(adata.read_x::<ArrayData>().unwrap().is_none());
    adata.close().unwrap();

    // The same name may appear in obs and var, and repeat within an axis.
    let adata = adata_gen();
    let names: DataFrameIndex = ["a", "b", "a"].into_iter().collect();
    adata.set_obs_names(names.clone()).unwrap();
    adata.set_var_names(names).unwrap();
    assert_eq!(adata.obs_ix(["a", "b"]).unwrap(), vec![0, 1]);
    assert_eq!(adata.var_ix(["b"]).unwrap(), vec![1]);
    assert!(adata.obs_ix(["c"]).is_err());

    // Columns must match the axis.
    let err = adata
        .add_obs_column("n", Array1::<u32>::zeros(4))
        .unwrap_err();
    assert!(is_axis_mismatch(&err));
    adata.add_obs_column("n", Array1::<u32>::zeros(3)).unwrap();
    match adata.fetch_obs_column("n").unwrap() {
        Some(Column::Array(x)) => assert_eq!(x.shape().as_ref(), &[3]),
        other => panic!("unexpected column {:?}", other),
    }

    // Pairwise arrays must be square.
    let err = adata.add_obsp("dist", Array2::<f32>::zeros((3, 2))).unwrap_err();
    assert!(is_axis_mismatch(&err));
    adata.add_obsp("dist", Array2::<f32>::zeros((3, 3))).unwrap();
    adata.close().unwrap();
}

pub fn test_io<B, F>(adata_gen: F)
where
    B: Backend,
    F: Fn() -> AnnData<B>,
{
    let arrays = (0usize..50, 0usize..50).prop_flat_map(|(n, m)| array_strat(&[n, m]));
    proptest!(ProptestConfig::with_cases(64), |(x in arrays)| {
        let adata = adata_gen();
        adata.set_x(&x).unwrap();
        prop_assert_eq!(adata.read_x::<ArrayData>().unwrap().unwrap(), x.clone());
        prop_assert_eq!(adata.read_x::<ArrayData>().unwrap().unwrap().kind(), x.kind());
    });

    let arrays = proptest::collection::vec(0usize..20, 1..4).prop_flat_map(|shape| array_strat(&shape));
    proptest!(ProptestConfig::with_cases(64), |(x in arrays)| {
        let adata = adata_gen();
        adata.add_obsm("test", &x).unwrap();
        adata.add_uns("test", &x).unwrap();
        prop_assert_eq!(adata.fetch_obsm::<ArrayData>("test").unwrap().unwrap(), x.clone());
        prop_assert_eq!(adata.fetch_uns::<ArrayData>("test").unwrap().unwrap(), x);
    });
}

pub fn test_index<B, F>(adata_gen: F)
where
    B: Backend,
    F: Fn() -> AnnData<B>,
{
    let arrays = (0usize..50, 0usize..50).prop_flat_map(|(n, m)| array_slice_strat(&[n, m]));
    proptest!(ProptestConfig::with_cases(64), |((x, select) in arrays)| {
        let adata = adata_gen();
        adata.set_x(&x).unwrap();
        let expected = array_select(&x, select.as_slice());
        prop_assert_eq!(
            adata.read_x_slice::<ArrayData, _>(&select).unwrap().unwrap(),
            expected.clone()
        );
        prop_assert_eq!(x.slice(select[0].clone(), select[1].clone()).unwrap(), expected.clone());

        adata.add_obsm("test", &x).unwrap();
        let elem = adata.obsm().get("test").unwrap();
        prop_assert_eq!(elem.inner().unwrap().select(&select).unwrap(), expected);
        prop_assert_eq!(
            elem.inner().unwrap().select_axis(0, &select[0]).unwrap(),
            array_select_axes(&x, &select[0], None)
        );
    });

    let adata = adata_gen();
    adata.set_x(Array2::<u8>::zeros((4, 3))).unwrap();
    let out_of_range = [SelectInfoElem::from(vec![4]), SelectInfoElem::full()];
    assert!(adata.read_x_slice::<ArrayData, _>(&out_of_range).is_err());
    adata.close().unwrap();
}
