use anndata::{backend::memory::InMemory, AnnData};
use anndata_zarr::Zarr;
use anndata_test_utils as utils;
use anndata_test_utils::with_tmp_dir;

#[test]
fn test_basic() {
    utils::test_basic::<InMemory>();
    utils::test_basic::<Zarr>();
}

#[test]
fn test_copy() {
    utils::test_copy::<InMemory, InMemory>();
    utils::test_copy::<InMemory, Zarr>();
    utils::test_copy::<Zarr, InMemory>();
    utils::test_copy::<Zarr, Zarr>();
}

#[test]
fn test_copy_example() {
    utils::test_copy_example::<InMemory, Zarr>();
    utils::test_copy_example::<Zarr, InMemory>();
    utils::test_copy_example::<Zarr, Zarr>();
}

#[test]
fn test_special_cases() {
    utils::test_special_cases(|| AnnData::<InMemory>::new("special").unwrap());
    with_tmp_dir(|dir| {
        let file = dir.join("special");
        utils::test_special_cases(|| AnnData::<Zarr>::new(&file).unwrap());
    })
}

#[test]
fn test_io() {
    utils::test_io(|| AnnData::<InMemory>::new("io").unwrap());
    with_tmp_dir(|dir| {
        let file = dir.join("io");
        utils::test_io(|| AnnData::<Zarr>::new(&file).unwrap());
    })
}

#[test]
fn test_index() {
    utils::test_index(|| AnnData::<InMemory>::new("index").unwrap());
    with_tmp_dir(|dir| {
        let file = dir.join("index");
        utils::test_index(|| AnnData::<Zarr>::new(&file).unwrap());
    })
}
