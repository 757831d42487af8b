use anndata::backend::{memory::InMemory, Backend, DataContainer, GroupOp, WriteConfig};
use anndata::data::{CategoricalArray, DataFrame, DynScalar, Mapping, SelectInfoElem};
use anndata::*;

use nalgebra_sparse::{CscMatrix, CsrMatrix};
use ndarray::{array, Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use proptest::prelude::*;

fn new_adata(name: &str) -> AnnData<InMemory> {
    AnnData::new(name).unwrap()
}

fn classify(err: &anyhow::Error) -> &AnnDataError {
    AnnDataError::of(err).unwrap_or_else(|| panic!("unclassified error: {:?}", err))
}

macro_rules! check_dtype {
    ($adata:expr, $ty:ty, $low:expr, $high:expr) => {{
        let x = Array2::<$ty>::random((6, 4), Uniform::new($low, $high));
        $adata.del_x().unwrap();
        $adata.set_x(&x).unwrap();
        assert_eq!($adata.read_x::<Array2<$ty>>().unwrap().unwrap(), x);
        $adata.add_uns(stringify!($ty), $low).unwrap();
        assert_eq!($adata.fetch_uns::<$ty>(stringify!($ty)).unwrap(), Some($low));
    }};
}

#[test]
fn element_types_survive() {
    let adata = new_adata("dtypes");
    check_dtype!(adata, i8, -5i8, 5);
    check_dtype!(adata, i16, -500i16, 500);
    check_dtype!(adata, i32, -50000i32, 50000);
    check_dtype!(adata, i64, i64::MIN / 2, i64::MAX / 2);
    check_dtype!(adata, u8, 0u8, 255);
    check_dtype!(adata, u16, 0u16, 1000);
    check_dtype!(adata, u32, 0u32, 100000);
    check_dtype!(adata, u64, 0u64, u64::MAX / 2);
    check_dtype!(adata, f32, -1.0f32, 1.0);
    check_dtype!(adata, f64, -1e300f64, 1e300);

    let flags = array![[true, false], [false, true], [true, true], [false, false], [true, false], [false, true]];
    adata.del_x().unwrap();
    assert!(adata.set_x(&flags).is_err());
    adata.add_layer("flags", Array2::from_shape_fn((6, 4), |(i, j)| (i + j) % 2 == 0)).unwrap();
    let labels = Array2::from_shape_fn((6, 4), |(i, j)| format!("cell-{}-{}", i, j));
    adata.add_layer("labels", &labels).unwrap();
    assert_eq!(adata.fetch_layer::<Array2<String>>("labels").unwrap().unwrap(), labels);

    // Asking for a different element type fails rather than casting.
    adata.set_x(Array2::<u16>::zeros((6, 4))).unwrap();
    assert!(adata.read_x::<Array2<f64>>().is_err());
}

#[test]
fn obs_columns() {
    let adata = new_adata("columns");
    let cell_type: CategoricalArray = [Some("B"), Some("T"), None, Some("B")].into_iter().collect();
    adata.add_obs_column("cell_type", cell_type.clone()).unwrap();
    adata.add_obs_column("score", array![0.5f32, 1.5, 2.5, 3.5]).unwrap();
    adata.add_obs_column("label", Array1::from(vec!["a".to_string(); 4])).unwrap();
    assert_eq!(adata.obs_keys(), vec!["cell_type", "score", "label"]);
    assert_eq!(
        adata.fetch_obs_column("cell_type").unwrap(),
        Some(Column::Categorical(cell_type))
    );

    adata.del_obs_column("score").unwrap();
    assert_eq!(adata.obs_keys(), vec!["cell_type", "label"]);

    let obs = adata.read_obs().unwrap();
    assert_eq!(obs.height(), 4);
    assert_eq!(obs.width(), 2);

    let mut var = DataFrame::new(3);
    var.insert("highly_variable", array![true, false, true]).unwrap();
    adata.set_var(var.clone()).unwrap();
    assert_eq!(adata.read_var().unwrap(), var);
    assert_eq!(adata.n_vars(), 3);

    let err = adata.set_var(DataFrame::new(2)).unwrap_err();
    assert!(matches!(classify(&err), AnnDataError::AxisMismatch { .. }));
    adata.del_var().unwrap();
    assert!(adata.var_keys().is_empty());
}

#[test]
fn same_column_name_on_both_axes() {
    let adata = new_adata("names");
    adata.add_obs_column("n_counts", array![1u32, 2, 3]).unwrap();
    adata.add_var_column("n_counts", array![10.0f64, 20.0]).unwrap();

    let copied = adata.copy::<InMemory, _>("names_copy").unwrap();
    assert_eq!(
        copied.fetch_obs_column("n_counts").unwrap(),
        Some(Column::from(array![1u32, 2, 3]))
    );
    assert_eq!(
        copied.fetch_var_column("n_counts").unwrap(),
        Some(Column::from(array![10.0f64, 20.0]))
    );

    copied.del_var_column("n_counts").unwrap();
    assert_eq!(copied.obs_keys(), vec!["n_counts"]);
    assert!(copied.var_keys().is_empty());
}

#[test]
fn axes_are_fixed_once_set() {
    let adata = new_adata("axes");
    adata.add_obsm("X_umap", Array2::<f32>::zeros((12, 2))).unwrap();
    assert_eq!(adata.n_obs(), 12);

    let err = adata.add_obsm("X_pca", Array2::<f32>::zeros((11, 50))).unwrap_err();
    match classify(&err) {
        AnnDataError::AxisMismatch { expected, got, .. } => assert_eq!((*expected, *got), (12, 11)),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(adata.obsm_keys(), vec!["X_umap"]);

    // Replacing an element keeps the axis.
    adata.add_obsm("X_umap", Array2::<f64>::ones((12, 3))).unwrap();
    assert_eq!(
        adata.fetch_obsm::<Array2<f64>>("X_umap").unwrap().unwrap(),
        Array2::<f64>::ones((12, 3))
    );

    // Removing every element does not release the axis.
    adata.del_obsm("X_umap").unwrap();
    assert!(adata.add_obsm("X_pca", Array2::<f32>::zeros((11, 50))).is_err());

    adata.add_varm("loadings", Array2::<f32>::zeros((20, 5))).unwrap();
    let err = adata.add_layer("counts", Array2::<u32>::zeros((12, 21))).unwrap_err();
    assert!(matches!(classify(&err), AnnDataError::AxisMismatch { .. }));
    adata.add_layer("counts", CsrMatrix::<u32>::zeros(12, 20)).unwrap();
    adata.add_varp("corr", CscMatrix::<f64>::zeros(20, 20)).unwrap();
    assert_eq!(adata.layers_keys(), vec!["counts"]);
    assert_eq!(adata.varp_keys(), vec!["corr"]);
}

#[test]
fn copies_are_independent() {
    let adata = new_adata("source");
    let x = Array2::from_shape_fn((5, 3), |(i, j)| (i * 3 + j) as f64);
    adata.set_x(&x).unwrap();
    adata.add_uns("info", "raw").unwrap();

    let copied = adata.copy::<InMemory, _>("copy").unwrap();
    adata.set_x(Array2::<f64>::zeros((5, 3))).unwrap();
    adata.add_uns("info", "normalized").unwrap();

    assert_eq!(copied.read_x::<Array2<f64>>().unwrap().unwrap(), x);
    assert_eq!(copied.fetch_uns::<String>("info").unwrap(), Some("raw".to_string()));

    copied.del_x().unwrap();
    assert!(adata.read_x::<ArrayData>().unwrap().is_some());
}

#[test]
fn copy_keeps_layout() {
    let adata = new_adata("layout");
    let csc = CscMatrix::try_from_csc_data(3, 4, vec![0, 1, 1, 3, 4], vec![2, 0, 1, 2], vec![1i32, 2, 3, 4]).unwrap();
    adata.set_x(&csc).unwrap();
    adata.add_layer("dense", Array2::<i32>::zeros((3, 4))).unwrap();

    let copied = adata.copy::<InMemory, _>("layout_copy").unwrap();
    let x = copied.read_x::<ArrayData>().unwrap().unwrap();
    assert_eq!(x.kind(), Some(ArrayKind::Csc));
    assert_eq!(x, ArrayData::from(csc.clone()));
    assert_eq!(
        copied.fetch_layer::<ArrayData>("dense").unwrap().unwrap().kind(),
        Some(ArrayKind::Dense)
    );

    let subset = adata
        .copy_select::<InMemory, _, _>([SelectInfoElem::from(vec![2, 0]), (2..4).into()], "subset")
        .unwrap();
    assert_eq!((subset.n_obs(), subset.n_vars()), (2, 2));
    let x = subset.read_x::<CscMatrix<i32>>().unwrap().unwrap();
    let dense: Array2<i32> = ArrayData::from(x).to_dense().unwrap().try_into().unwrap();
    assert_eq!(dense, array![[0, 4], [2, 0]]);

    let err = adata
        .copy_select::<InMemory, _, _>([SelectInfoElem::from(vec![3]), SelectInfoElem::full()], "bad")
        .unwrap_err();
    assert!(err.to_string().contains("invalid selection"));
}

#[test]
fn explicit_conversion() {
    let dense = array![[0u8, 1, 0], [2, 0, 3]];
    let data = ArrayData::from(dense.clone());
    let csr = data.convert(ArrayKind::Csr).unwrap();
    assert_eq!(csr.kind(), Some(ArrayKind::Csr));
    let csc = csr.convert(ArrayKind::Csc).unwrap();
    assert_eq!(csc.kind(), Some(ArrayKind::Csc));
    let back: Array2<u8> = csc.convert(ArrayKind::Dense).unwrap().try_into().unwrap();
    assert_eq!(back, dense);

    let df = ArrayData::from(DataFrame::new(2));
    let err = df.convert(ArrayKind::Csr).unwrap_err();
    assert!(matches!(classify(&err), AnnDataError::UnsupportedConversion { .. }));
}

#[test]
fn zero_sized_elements() {
    let adata = new_adata("empty");
    adata.set_x(Array2::<f32>::zeros((0, 8))).unwrap();
    adata.add_obsm("X_pca", Array2::<f32>::zeros((0, 10))).unwrap();
    adata.add_obs_column("n_genes", Array1::<u32>::zeros(0)).unwrap();

    let copied = adata.copy::<InMemory, _>("empty_copy").unwrap();
    assert_eq!((copied.n_obs(), copied.n_vars()), (0, 8));
    assert_eq!(
        copied.fetch_obsm::<Array2<f32>>("X_pca").unwrap().unwrap().shape(),
        &[0, 10]
    );
    assert_eq!(copied.read_obs().unwrap().height(), 0);
}

#[test]
fn nested_uns() {
    let adata = new_adata("uns");
    let mut neighbors = Mapping::new();
    neighbors.insert("method", "umap");
    neighbors.insert("n_neighbors", 15u32);
    let mut params = Mapping::new();
    params.insert("metric", "euclidean");
    neighbors.insert("params", params);
    adata.add_uns("neighbors", neighbors.clone()).unwrap();
    adata.add_uns("pi", 2.5f64).unwrap();

    assert_eq!(adata.fetch_uns::<Mapping>("neighbors").unwrap(), Some(neighbors));
    assert_eq!(
        adata.fetch_uns::<DynScalar>("pi").unwrap(),
        Some(DynScalar::F64(2.5))
    );
    adata.del_uns("pi").unwrap();
    assert_eq!(adata.uns_keys(), vec!["neighbors"]);
    assert!(adata.fetch_uns::<f64>("pi").unwrap().is_none());
}

#[test]
fn corrupt_sparse_offsets() {
    let store = InMemory::new("corrupt").unwrap();
    let csr = CsrMatrix::try_from_csr_data(2, 3, vec![0, 2, 3], vec![0, 2, 1], vec![1.0f64, 2.0, 3.0]).unwrap();
    csr.write::<InMemory, _>(&store, "X").unwrap();

    let group = store.open_group("X").unwrap();
    group.delete("indptr").unwrap();
    group
        .new_array_dataset("indptr", array![0i32, 3, 2].into(), WriteConfig::default())
        .unwrap();

    let container = DataContainer::<InMemory>::open(&store, "X").unwrap();
    let err = CsrMatrix::<f64>::read(&container).unwrap_err();
    assert!(matches!(classify(&err), AnnDataError::Corrupt(_)));

    let adata = AnnData::<InMemory>::open(store).unwrap();
    assert_eq!((adata.n_obs(), adata.n_vars()), (2, 3));
    let err = adata.read_x::<ArrayData>().unwrap_err();
    assert!(matches!(classify(&err), AnnDataError::Corrupt(_)));
}

#[test]
fn builder_writes_everything() {
    let adata: AnnData<InMemory> = AnnDataBuilder::new()
        .x(Array2::<f64>::ones((4, 6)))
        .obsm("X_pca", Array2::<f32>::zeros((4, 2)))
        .obsp("connectivities", CsrMatrix::<f32>::zeros(4, 4))
        .varm("PCs", Array2::<f32>::zeros((6, 2)))
        .layer("counts", Array2::<u32>::zeros((4, 6)))
        .uns("log1p", "applied")
        .build("built")
        .unwrap();
    assert_eq!(adata.obsm_keys(), vec!["X_pca"]);
    assert_eq!(adata.obsp_keys(), vec!["connectivities"]);
    assert_eq!(adata.varm_keys(), vec!["PCs"]);
    assert_eq!(adata.layers_keys(), vec!["counts"]);
    assert_eq!(adata.fetch_uns::<String>("log1p").unwrap(), Some("applied".to_string()));

    let err = AnnDataBuilder::new()
        .x(Array2::<f64>::ones((4, 6)))
        .layer("counts", Array2::<u32>::zeros((4, 5)))
        .build::<InMemory, _>("mismatch")
        .unwrap_err();
    assert!(matches!(classify(&err), AnnDataError::AxisMismatch { .. }));
}

proptest! {
    #[test]
    fn row_slices_match_dense_rows(
        (n, m) in (1usize..30, 1usize..30),
        rows in proptest::collection::vec(0usize..1000, 0..40),
    ) {
        let rows: Vec<usize> = rows.into_iter().map(|i| i % n).collect();
        let x = Array2::from_shape_fn((n, m), |(i, j)| (i * m + j) as i64);
        let adata = new_adata("slices");
        adata.set_x(&x).unwrap();
        let csr = ArrayData::from(x.clone()).convert(ArrayKind::Csr).unwrap();
        adata.add_layer("sparse", csr).unwrap();

        let select = [SelectInfoElem::from(rows.clone()), SelectInfoElem::full()];
        let expected = x.select(Axis(0), &rows);
        let dense: Array2<i64> = adata.read_x_slice(&select).unwrap().unwrap();
        prop_assert_eq!(dense, expected.clone());

        let sparse = adata.layers().get("sparse").unwrap();
        let sliced = sparse.inner().unwrap().select(&select).unwrap();
        let sliced: Array2<i64> = sliced.to_dense().unwrap().try_into().unwrap();
        prop_assert_eq!(sliced, expected);
    }
}
