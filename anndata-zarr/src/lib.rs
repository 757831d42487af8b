//! Zarr (v3) stores on the local filesystem, built on `zarrs`.
//!
//! Groups and arrays follow the zarr layout. A few marker files sit next to
//! the root metadata and are not zarr nodes:
//!
//! ```text
//! pbmc.zarr/
//!     zarr.json           root group
//!     .lock               present while a writer holds the store
//!     .reader-<pid>-<n>   one per open read-only handle
//!     X/
//!         zarr.json       dtype, shape, codecs and attributes
//!         c/0/0           chunks
//! ```

use anndata::{
    backend::{
        check_name, whole_array, AttributeOp, Backend, BackendData, DatasetOp, GroupOp, ScalarType,
        StoreOp, WriteConfig,
    },
    data::{DynArray, SelectInfoBounds, SelectInfoElem, Shape},
    AnnDataError,
};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, warn};
use ndarray::{Array, ArrayD, CowArray, Dimension, IxDyn};
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    fs::{self, OpenOptions},
    io::ErrorKind,
    num::NonZeroU64,
    ops::Range,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use zarrs::{
    array::{
        chunk_grid::ChunkGrid, codec::GzipCodec, Array as ZArray, ArrayBuilder, DataType,
        FillValue,
    },
    array_subset::ArraySubset,
    filesystem::FilesystemStore,
    group::{Group, GroupBuilder},
    storage::{
        ListableStorageTraits, ReadableStorageTraits, StoreKey, StorePrefix, WritableStorageTraits,
    },
};

const LOCK_FILE: &str = ".lock";
const READER_PREFIX: &str = ".reader-";
const METADATA_FILE: &str = "zarr.json";

static READERS: AtomicUsize = AtomicUsize::new(0);

/// The Zarr backend.
pub struct Zarr;

#[derive(Debug)]
struct StoreInner {
    fs: Arc<FilesystemStore>,
    root: PathBuf,
    writable: bool,
    /// The lock file of a writer or the marker of a reader.
    marker: Mutex<Option<PathBuf>>,
}

impl StoreInner {
    fn release(&self) -> Result<()> {
        if let Some(marker) = self.marker.lock().take() {
            fs::remove_file(&marker)
                .with_context(|| format!("cannot remove '{}'", marker.display()))?;
        }
        Ok(())
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("{:#}", e);
        }
    }
}

#[derive(Clone, Debug)]
pub struct ZarrStore(Arc<StoreInner>);

#[derive(Clone, Debug)]
pub struct ZarrGroup {
    store: ZarrStore,
    path: String,
}

#[derive(Clone, Debug)]
pub struct ZarrDataset {
    store: ZarrStore,
    path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Group,
    Array,
}

/// Join a relative node path and a child name, ignoring empty components.
fn join(path: &str, name: &str) -> String {
    path.split('/')
        .chain(name.split('/'))
        .filter(|x| !x.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn node_path(path: &str) -> String {
    format!("/{}", path)
}

fn store_prefix(path: &str) -> Result<StorePrefix> {
    if path.is_empty() {
        Ok(StorePrefix::root())
    } else {
        Ok(StorePrefix::new(format!("{}/", path))?)
    }
}

fn metadata_key(path: &str) -> Result<StoreKey> {
    if path.is_empty() {
        Ok(StoreKey::new(METADATA_FILE)?)
    } else {
        Ok(StoreKey::new(format!("{}/{}", path, METADATA_FILE))?)
    }
}

fn chunk_len(n: usize) -> NonZeroU64 {
    NonZeroU64::new(n as u64).unwrap_or(NonZeroU64::MIN)
}

fn is_store(root: &Path) -> bool {
    root.join(METADATA_FILE).is_file()
}

/// A store is in use while a writer holds its lock or a reader has it open.
fn in_use(root: &Path) -> Result<bool> {
    if root.join(LOCK_FILE).exists() {
        return Ok(true);
    }
    for entry in fs::read_dir(root)? {
        if entry?.file_name().to_string_lossy().starts_with(READER_PREFIX) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn take_lock(lock: &Path) -> Result<()> {
    match OpenOptions::new().write(true).create_new(true).open(lock) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            bail!(AnnDataError::unavailable(
                lock.parent().unwrap_or(lock),
                "the store is in use by another writer"
            ))
        }
        Err(e) => bail!(AnnDataError::unavailable(lock, e)),
    }
}

/// Leave a marker so that the store is not replaced while it is being read.
/// Stores on read-only media cannot carry one.
fn take_reader_marker(root: &Path) -> Option<PathBuf> {
    let marker = root.join(format!(
        "{}{}-{}",
        READER_PREFIX,
        std::process::id(),
        READERS.fetch_add(1, Ordering::Relaxed)
    ));
    match OpenOptions::new().write(true).create_new(true).open(&marker) {
        Ok(_) => Some(marker),
        Err(e) => {
            warn!("cannot mark '{}' as being read: {}", root.display(), e);
            None
        }
    }
}

fn open_filesystem(root: &Path) -> Result<Arc<FilesystemStore>> {
    let fs = FilesystemStore::new(root).map_err(|e| AnnDataError::unavailable(root, e))?;
    Ok(Arc::new(fs))
}

impl ZarrStore {
    fn fs(&self) -> &Arc<FilesystemStore> {
        &self.0.fs
    }

    fn root(&self) -> &Path {
        &self.0.root
    }

    fn check_writable(&self) -> Result<()> {
        if !self.0.writable {
            bail!("store '{}' is opened read-only", self.root().display());
        }
        Ok(())
    }

    fn node_kind(&self, path: &str) -> Result<Option<NodeKind>> {
        let key = metadata_key(path)?;
        let bytes = match self.fs().get(&key)? {
            None => return Ok(None),
            Some(bytes) => bytes,
        };
        let meta: Value = serde_json::from_slice(&bytes).map_err(|e| {
            AnnDataError::corrupt(format!("invalid metadata at '{}': {}", node_path(path), e))
        })?;
        match meta.get("node_type").and_then(Value::as_str) {
            Some("group") => Ok(Some(NodeKind::Group)),
            Some("array") => Ok(Some(NodeKind::Array)),
            _ => bail!(AnnDataError::corrupt(format!(
                "unknown node type at '{}'",
                node_path(path)
            ))),
        }
    }

    fn not_found(&self, path: &str) -> AnnDataError {
        AnnDataError::NotFound(self.root().join(path))
    }

    fn open_existing(root: PathBuf, writable: bool) -> Result<Self> {
        if !is_store(&root) {
            bail!(AnnDataError::NotFound(root));
        }
        let fs = open_filesystem(&root)?;
        let marker = if writable {
            let lock = root.join(LOCK_FILE);
            take_lock(&lock)?;
            Some(lock)
        } else {
            take_reader_marker(&root)
        };
        let inner = StoreInner {
            fs,
            root,
            writable,
            marker: Mutex::new(marker),
        };
        Ok(ZarrStore(Arc::new(inner)))
    }
}

impl Backend for Zarr {
    const NAME: &'static str = "zarr";
    const PERSISTENT: bool = true;

    type Store = ZarrStore;
    type Group = ZarrGroup;
    type Dataset = ZarrDataset;

    /// Create a store at `path`. An existing store is replaced unless it is
    /// open elsewhere. Anything else at `path` is left alone.
    fn new<P: AsRef<Path>>(path: P) -> Result<Self::Store> {
        let root = path.as_ref().to_path_buf();
        if root.is_dir() {
            if is_store(&root) {
                if in_use(&root).map_err(|e| AnnDataError::unavailable(&root, e))? {
                    bail!(AnnDataError::unavailable(&root, "the store is in use"));
                }
                fs::remove_dir_all(&root).map_err(|e| AnnDataError::unavailable(&root, e))?;
            } else if fs::read_dir(&root)
                .map_err(|e| AnnDataError::unavailable(&root, e))?
                .next()
                .is_some()
            {
                bail!(AnnDataError::unavailable(
                    &root,
                    "a non-empty directory that is not a store"
                ));
            }
        } else if root.exists() {
            bail!(AnnDataError::unavailable(&root, "a file is in the way"));
        }
        fs::create_dir_all(&root).map_err(|e| AnnDataError::unavailable(&root, e))?;
        let fs = open_filesystem(&root)?;
        let lock = root.join(LOCK_FILE);
        take_lock(&lock)?;
        let store = ZarrStore(Arc::new(StoreInner {
            fs,
            root: root.clone(),
            writable: true,
            marker: Mutex::new(Some(lock)),
        }));
        GroupBuilder::new()
            .build(store.fs().clone(), "/")?
            .store_metadata()
            .map_err(|e| AnnDataError::unavailable(&root, e))?;
        debug!("created zarr store at '{}'", root.display());
        Ok(store)
    }

    fn open<P: AsRef<Path>>(path: P) -> Result<Self::Store> {
        ZarrStore::open_existing(path.as_ref().to_path_buf(), false)
    }

    fn open_rw<P: AsRef<Path>>(path: P) -> Result<Self::Store> {
        ZarrStore::open_existing(path.as_ref().to_path_buf(), true)
    }
}

impl StoreOp<Zarr> for ZarrStore {
    fn filename(&self) -> PathBuf {
        self.root().to_path_buf()
    }

    /// Chunks and metadata are written through as they are stored, so there
    /// is nothing left to do but check that the store is still there.
    fn flush(&self) -> Result<()> {
        if !is_store(self.root()) {
            bail!("store '{}' has disappeared", self.root().display());
        }
        Ok(())
    }

    fn close(self) -> Result<()> {
        self.flush()?;
        self.0.release()
    }

    fn discard(self) -> Result<()> {
        self.0.release()?;
        fs::remove_dir_all(self.root())
            .with_context(|| format!("cannot remove '{}'", self.root().display()))
    }
}

/// Children are listed by their metadata, whatever their names look like.
fn list(store: &ZarrStore, path: &str) -> Result<Vec<String>> {
    let prefix = store_prefix(path)?;
    let mut names = Vec::new();
    for child in store.fs().list_dir(&prefix)?.prefixes() {
        let name = child
            .as_str()
            .strip_prefix(prefix.as_str())
            .unwrap_or(child.as_str())
            .trim_end_matches('/');
        if store.node_kind(&join(path, name))?.is_some() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn new_group(store: &ZarrStore, path: &str, name: &str) -> Result<ZarrGroup> {
    store.check_writable()?;
    let path = join(path, name);
    if store.node_kind(&path)?.is_some() {
        bail!("'{}' already exists", path);
    }
    GroupBuilder::new()
        .build(store.fs().clone(), &node_path(&path))?
        .store_metadata()?;
    Ok(ZarrGroup {
        store: store.clone(),
        path,
    })
}

fn open_group(store: &ZarrStore, path: &str, name: &str) -> Result<ZarrGroup> {
    let path = join(path, name);
    match store.node_kind(&path)? {
        Some(NodeKind::Group) => Ok(ZarrGroup {
            store: store.clone(),
            path,
        }),
        Some(NodeKind::Array) => bail!("'{}' is not a group", path),
        None => bail!(store.not_found(&path)),
    }
}

fn zarr_type(dtype: ScalarType) -> (DataType, FillValue) {
    match dtype {
        ScalarType::I8 => (DataType::Int8, 0i8.into()),
        ScalarType::I16 => (DataType::Int16, 0i16.into()),
        ScalarType::I32 => (DataType::Int32, 0i32.into()),
        ScalarType::I64 => (DataType::Int64, 0i64.into()),
        ScalarType::U8 => (DataType::UInt8, 0u8.into()),
        ScalarType::U16 => (DataType::UInt16, 0u16.into()),
        ScalarType::U32 => (DataType::UInt32, 0u32.into()),
        ScalarType::U64 => (DataType::UInt64, 0u64.into()),
        ScalarType::F32 => (DataType::Float32, 0f32.into()),
        ScalarType::F64 => (DataType::Float64, 0f64.into()),
        ScalarType::Bool => (DataType::Bool, false.into()),
        ScalarType::String => (DataType::String, "".into()),
    }
}

fn scalar_type(dtype: &DataType) -> Result<ScalarType> {
    let ty = match dtype {
        DataType::Int8 => ScalarType::I8,
        DataType::Int16 => ScalarType::I16,
        DataType::Int32 => ScalarType::I32,
        DataType::Int64 => ScalarType::I64,
        DataType::UInt8 => ScalarType::U8,
        DataType::UInt16 => ScalarType::U16,
        DataType::UInt32 => ScalarType::U32,
        DataType::UInt64 => ScalarType::U64,
        DataType::Float32 => ScalarType::F32,
        DataType::Float64 => ScalarType::F64,
        DataType::Bool => ScalarType::Bool,
        DataType::String => ScalarType::String,
        ty => bail!(AnnDataError::corrupt(format!("unsupported zarr data type '{:?}'", ty))),
    };
    Ok(ty)
}

fn new_empty_dataset<T: BackendData>(
    store: &ZarrStore,
    path: &str,
    name: &str,
    shape: &Shape,
    config: WriteConfig,
) -> Result<ZarrDataset> {
    store.check_writable()?;
    let path = join(path, name);
    if store.node_kind(&path)?.is_some() {
        bail!("'{}' already exists", path);
    }
    let shape = shape.as_ref();
    let chunks: Vec<NonZeroU64> = match config.block_size {
        Some(s) => {
            if s.ndim() != shape.len() {
                bail!(AnnDataError::axis_mismatch("block", shape.len(), s.ndim()));
            }
            s.as_ref().iter().map(|x| chunk_len(*x)).collect()
        }
        None if shape.len() == 1 => vec![chunk_len(shape[0].min(10000))],
        None => shape.iter().map(|x| chunk_len((*x).min(100))).collect(),
    };
    let (dtype, fill) = zarr_type(T::DTYPE);
    let mut builder = ArrayBuilder::new(
        shape.iter().map(|x| *x as u64).collect(),
        dtype,
        ChunkGrid::from(chunks),
        fill,
    );
    if let Some(level) = config.compression {
        builder.bytes_to_bytes_codecs(vec![Arc::new(GzipCodec::new(level.into())?)]);
    }
    builder
        .build(store.fs().clone(), &node_path(&path))?
        .store_metadata()?;
    Ok(ZarrDataset {
        store: store.clone(),
        path,
    })
}

fn open_dataset(store: &ZarrStore, path: &str, name: &str) -> Result<ZarrDataset> {
    let path = join(path, name);
    match store.node_kind(&path)? {
        Some(NodeKind::Array) => Ok(ZarrDataset {
            store: store.clone(),
            path,
        }),
        Some(NodeKind::Group) => bail!("'{}' is not a dataset", path),
        None => bail!(store.not_found(&path)),
    }
}

fn delete(store: &ZarrStore, path: &str, name: &str) -> Result<()> {
    store.check_writable()?;
    let path = join(path, name);
    if store.node_kind(&path)?.is_none() {
        bail!(store.not_found(&path));
    }
    store.fs().erase_prefix(&store_prefix(&path)?)?;
    Ok(())
}

fn rename(store: &ZarrStore, path: &str, from: &str, to: &str) -> Result<()> {
    store.check_writable()?;
    check_name(from)?;
    check_name(to)?;
    let (from, to) = (join(path, from), join(path, to));
    if store.node_kind(&from)?.is_none() {
        bail!(store.not_found(&from));
    }
    if store.node_kind(&to)?.is_some() {
        bail!("'{}' already exists", to);
    }
    fs::rename(store.root().join(&from), store.root().join(&to))
        .with_context(|| format!("cannot move '{}' to '{}'", from, to))
}

fn exists(store: &ZarrStore, path: &str, name: &str) -> Result<bool> {
    Ok(store.node_kind(&join(path, name))?.is_some())
}

macro_rules! impl_group_op {
    ($ty:ty, $store:ident, $path:ident) => {
        impl GroupOp<Zarr> for $ty {
            fn list(&self) -> Result<Vec<String>> {
                list(self.$store(), self.$path())
            }

            fn new_group(&self, name: &str) -> Result<ZarrGroup> {
                new_group(self.$store(), self.$path(), name)
            }

            fn open_group(&self, name: &str) -> Result<ZarrGroup> {
                open_group(self.$store(), self.$path(), name)
            }

            fn new_empty_dataset<T: BackendData>(
                &self,
                name: &str,
                shape: &Shape,
                config: WriteConfig,
            ) -> Result<ZarrDataset> {
                new_empty_dataset::<T>(self.$store(), self.$path(), name, shape, config)
            }

            fn open_dataset(&self, name: &str) -> Result<ZarrDataset> {
                open_dataset(self.$store(), self.$path(), name)
            }

            fn delete(&self, name: &str) -> Result<()> {
                delete(self.$store(), self.$path(), name)
            }

            fn exists(&self, name: &str) -> Result<bool> {
                exists(self.$store(), self.$path(), name)
            }

            fn rename(&self, from: &str, to: &str) -> Result<()> {
                rename(self.$store(), self.$path(), from, to)
            }
        }
    };
}

impl ZarrStore {
    fn as_store(&self) -> &ZarrStore {
        self
    }

    fn root_path(&self) -> &str {
        ""
    }
}

impl ZarrGroup {
    fn as_store(&self) -> &ZarrStore {
        &self.store
    }

    fn root_path(&self) -> &str {
        &self.path
    }

    fn open(&self) -> Result<Group<FilesystemStore>> {
        Ok(Group::open(self.store.fs().clone(), &node_path(&self.path))?)
    }
}

impl_group_op!(ZarrStore, as_store, root_path);
impl_group_op!(ZarrGroup, as_store, root_path);

macro_rules! impl_attribute_op {
    ($ty:ty) => {
        impl AttributeOp<Zarr> for $ty {
            fn store(&self) -> Result<ZarrStore> {
                Ok(self.store.clone())
            }

            fn path(&self) -> PathBuf {
                PathBuf::from(node_path(&self.path))
            }

            fn new_json_attr(&mut self, name: &str, value: &Value) -> Result<()> {
                self.store.check_writable()?;
                let mut node = self.open()?;
                node.attributes_mut().insert(name.to_string(), value.clone());
                node.store_metadata()?;
                Ok(())
            }

            fn get_json_attr(&self, name: &str) -> Result<Value> {
                self.open()?
                    .attributes()
                    .get(name)
                    .cloned()
                    .ok_or_else(|| anyhow!("attribute '{}' not found", name))
            }
        }
    };
}

impl_attribute_op!(ZarrGroup);
impl_attribute_op!(ZarrDataset);

/// Call `$fun!(Variant, type)` for the variant matching a `ScalarType`.
macro_rules! dispatch {
    ($dtype:expr, $fun:ident) => {
        match $dtype {
            ScalarType::I8 => $fun!(I8, i8),
            ScalarType::I16 => $fun!(I16, i16),
            ScalarType::I32 => $fun!(I32, i32),
            ScalarType::I64 => $fun!(I64, i64),
            ScalarType::U8 => $fun!(U8, u8),
            ScalarType::U16 => $fun!(U16, u16),
            ScalarType::U32 => $fun!(U32, u32),
            ScalarType::U64 => $fun!(U64, u64),
            ScalarType::F32 => $fun!(F32, f32),
            ScalarType::F64 => $fun!(F64, f64),
            ScalarType::Bool => $fun!(Bool, bool),
            ScalarType::String => $fun!(String, String),
        }
    };
}

impl ZarrDataset {
    fn open(&self) -> Result<ZArray<FilesystemStore>> {
        Ok(ZArray::open(self.store.fs().clone(), &node_path(&self.path))?)
    }

    /// Read the elements of `subset`, which has the given shape, in C order.
    fn retrieve(
        &self,
        array: &ZArray<FilesystemStore>,
        subset: &ArraySubset,
        shape: &[usize],
    ) -> Result<DynArray> {
        let empty = shape.iter().product::<usize>() == 0;
        macro_rules! fun {
            ($variant:ident, $ty:ty) => {{
                let elems: Vec<$ty> = if empty {
                    Vec::new()
                } else {
                    array.retrieve_array_subset_elements(subset).map_err(|e| {
                        AnnDataError::corrupt(format!("cannot decode '{}': {}", self.path, e))
                    })?
                };
                let arr = ArrayD::from_shape_vec(IxDyn(shape), elems).map_err(|e| {
                    AnnDataError::corrupt(format!("cannot decode '{}': {}", self.path, e))
                })?;
                DynArray::$variant(arr)
            }};
        }
        Ok(dispatch!(scalar_type(array.data_type())?, fun))
    }

    fn store_elements(
        &self,
        array: &ZArray<FilesystemStore>,
        subset: &ArraySubset,
        data: DynArray,
    ) -> Result<()> {
        macro_rules! fun {
            ($($variant:ident),*) => {
                match data {
                    $(DynArray::$variant(x) => {
                        let elems: Vec<_> = x.iter().cloned().collect();
                        array.store_array_subset_elements(subset, &elems)?
                    })*
                }
            };
        }
        fun!(I8, I16, I32, I64, U8, U16, U32, U64, F32, F64, Bool, String);
        Ok(())
    }
}

/// Unit-step selections map to a single zarr subset.
fn as_subset(bounds: &SelectInfoBounds) -> Option<ArraySubset> {
    bounds
        .as_ref()
        .iter()
        .map(|b| b.as_range().map(|r| r.start as u64..r.end as u64))
        .collect::<Option<Vec<Range<u64>>>>()
        .map(|ranges| ArraySubset::new_with_ranges(&ranges))
}

impl DatasetOp<Zarr> for ZarrDataset {
    fn dtype(&self) -> Result<ScalarType> {
        scalar_type(self.open()?.data_type())
    }

    fn shape(&self) -> Shape {
        self.open()
            .map(|a| a.shape().iter().map(|x| *x as usize).collect())
            .unwrap_or_else(|_| Shape::from(Vec::new()))
    }

    fn write_array_slice<S, T, D>(&self, arr: CowArray<'_, T, D>, selection: &[S]) -> Result<()>
    where
        T: BackendData,
        S: AsRef<SelectInfoElem>,
        D: Dimension,
    {
        self.store.check_writable()?;
        let array = self.open()?;
        let dtype = scalar_type(array.data_type())?;
        if dtype != T::DTYPE {
            bail!("cannot write {} values into a {} dataset", T::DTYPE, dtype);
        }
        let shape = self.shape();
        let bounds = SelectInfoBounds::new(selection, &shape)?;
        if bounds.out_shape().as_ref() != arr.shape() {
            bail!(
                "cannot write array of shape {:?} into selection of shape {}",
                arr.shape(),
                bounds.out_shape()
            );
        }
        let subset =
            as_subset(&bounds).ok_or_else(|| anyhow!("partial writes only support unit-step slices"))?;
        if arr.len() == 0 {
            return Ok(());
        }
        self.store_elements(&array, &subset, T::into_dyn_arr(arr.into_owned()))
    }

    fn read_array_slice<T: BackendData, S, D>(&self, selection: &[S]) -> Result<Array<T, D>>
    where
        S: AsRef<SelectInfoElem>,
        D: Dimension,
    {
        let array = self.open()?;
        let shape = self.shape();
        let bounds = SelectInfoBounds::new(selection, &shape)?;
        match as_subset(&bounds) {
            Some(subset) => {
                let data = self.retrieve(&array, &subset, bounds.out_shape().as_ref())?;
                Ok(T::from_dyn_arr(data)?.into_dimensionality::<D>()?)
            }
            None => {
                let data = self.retrieve(&array, &array.subset_all(), shape.as_ref())?;
                whole_array::read(data, selection)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, array, s, Array2, Ix0, Ix1, Ix2};
    use tempfile::tempdir;

    #[test]
    fn groups_and_datasets() {
        let dir = tempdir().unwrap();
        let store = Zarr::new(dir.path().join("store")).unwrap();
        let g = store.new_group("b").unwrap();
        store.new_group("a").unwrap();
        g.new_array_dataset("x", array![1i32, 2, 3].into(), WriteConfig::default())
            .unwrap();
        assert_eq!(store.list().unwrap(), vec!["a", "b"]);
        assert_eq!(g.list().unwrap(), vec!["x"]);
        assert!(store.exists("b/x").unwrap());
        assert!(!store.exists("b/y").unwrap());
        assert!(store.new_group("a").is_err());
        assert!(store.open_dataset("a").is_err());
        assert!(store.open_group("b/x").is_err());

        let ds = store.open_dataset("b/x").unwrap();
        assert_eq!(ds.dtype().unwrap(), ScalarType::I32);
        assert_eq!(ds.read_array::<i32, IxDyn>().unwrap(), array![1, 2, 3].into_dyn());
        assert!(matches!(
            store.open_group("missing").unwrap_err().downcast_ref::<AnnDataError>(),
            Some(AnnDataError::NotFound(_))
        ));

        g.rename("x", ".x.tmp").unwrap();
        assert_eq!(g.list().unwrap(), vec![".x.tmp"]);
        assert!(store.rename("a", "b").is_err());
        assert!(g.rename("x", "y").is_err());
        g.rename(".x.tmp", "x").unwrap();
        assert_eq!(
            g.open_dataset("x").unwrap().read_array::<i32, Ix1>().unwrap(),
            array![1, 2, 3]
        );

        store.delete("b").unwrap();
        assert_eq!(store.list().unwrap(), vec!["a"]);
        assert!(!dir.path().join("store").join("b").exists());
    }

    #[test]
    fn dot_prefixed_names() {
        let dir = tempdir().unwrap();
        let store = Zarr::new(dir.path().join("store")).unwrap();
        let g = store.new_group("obsm").unwrap();
        g.new_array_dataset(".hidden", array![1u8].into(), WriteConfig::default())
            .unwrap();
        g.new_group("__private").unwrap();
        assert_eq!(g.list().unwrap(), vec![".hidden", "__private"]);
        // Marker files are not nodes.
        assert_eq!(store.list().unwrap(), vec!["obsm"]);
    }

    #[test]
    fn attributes() {
        let dir = tempdir().unwrap();
        let store = Zarr::new(dir.path().join("store")).unwrap();
        let mut g = store.new_group("g").unwrap();
        g.new_attr("encoding-type", "dict").unwrap();
        g.new_attr("column-order", vec!["a", "b"]).unwrap();
        assert_eq!(g.get_attr::<String>("encoding-type").unwrap(), "dict");
        assert_eq!(g.get_attr::<Vec<String>>("column-order").unwrap(), vec!["a", "b"]);
        assert!(g.get_json_attr("missing").is_err());
        assert_eq!(g.path(), PathBuf::from("/g"));

        let mut ds = store.new_scalar_dataset("n", &7u64).unwrap();
        ds.new_attr("encoding-type", "numeric-scalar").unwrap();
        let ds = store.open_dataset("n").unwrap();
        assert_eq!(ds.get_attr::<String>("encoding-type").unwrap(), "numeric-scalar");
        assert_eq!(ds.read_scalar::<u64>().unwrap(), 7);
    }

    #[test]
    fn strings_and_scalars() {
        let dir = tempdir().unwrap();
        let store = Zarr::new(dir.path().join("store")).unwrap();
        let names = array!["a".to_string(), String::new(), "ccc".to_string()];
        store
            .new_array_dataset("names", names.view().into(), WriteConfig::default())
            .unwrap();
        let ds = store.open_dataset("names").unwrap();
        assert_eq!(ds.dtype().unwrap(), ScalarType::String);
        assert_eq!(ds.read_array::<String, Ix1>().unwrap(), names);

        store.new_scalar_dataset("title", &"pbmc".to_string()).unwrap();
        let title: ndarray::Array<String, Ix0> =
            store.open_dataset("title").unwrap().read_array().unwrap();
        assert_eq!(title, arr0("pbmc".to_string()));
    }

    #[test]
    fn compressed_and_chunked() {
        let dir = tempdir().unwrap();
        let store = Zarr::new(dir.path().join("store")).unwrap();
        let m = Array2::from_shape_fn((250, 30), |(i, j)| (i * 30 + j) as f64);
        store
            .new_array_dataset("m", m.view().into(), WriteConfig::default())
            .unwrap();
        let ds = store.open_dataset("m").unwrap();
        assert_eq!(ds.shape(), vec![250, 30].into());
        assert_eq!(ds.read_array::<f64, Ix2>().unwrap(), m);

        let rows = SelectInfoElem::from(vec![249usize, 3, 120]);
        let sub: Array2<f64> = ds
            .read_array_slice(&[rows, SelectInfoElem::from(5usize..7)])
            .unwrap();
        assert_eq!(sub, array![[7475.0, 7476.0], [95.0, 96.0], [3605.0, 3606.0]]);
    }

    #[test]
    fn partial_writes() {
        let dir = tempdir().unwrap();
        let store = Zarr::new(dir.path().join("store")).unwrap();
        let ds = store
            .new_empty_dataset::<f64>("m", &vec![4, 3].into(), WriteConfig::default())
            .unwrap();
        let block = Array2::from_elem((2, 3), 1.5f64);
        ds.write_array_slice(
            block.view().into(),
            &[SelectInfoElem::from(1usize..3), SelectInfoElem::full()],
        )
        .unwrap();
        let all: Array2<f64> = ds.read_array().unwrap();
        assert_eq!(all.slice(s![1..3, ..]), block);
        assert_eq!(all.row(0).sum(), 0.0);

        let err = ds
            .write_array_slice(
                Array2::<f64>::zeros((2, 3)).view().into(),
                &[SelectInfoElem::from(vec![0usize, 2]), SelectInfoElem::full()],
            )
            .unwrap_err();
        assert!(err.to_string().contains("unit-step"));
    }

    #[test]
    fn zero_length_axes() {
        let dir = tempdir().unwrap();
        let store = Zarr::new(dir.path().join("store")).unwrap();
        store
            .new_array_dataset("e", Array2::<i64>::zeros((0, 3)).view().into(), WriteConfig::default())
            .unwrap();
        let ds = store.open_dataset("e").unwrap();
        assert_eq!(ds.shape(), vec![0, 3].into());
        assert_eq!(ds.read_array::<i64, Ix2>().unwrap(), Array2::<i64>::zeros((0, 3)));
    }

    #[test]
    fn write_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");
        let store = Zarr::new(&path).unwrap();

        let err = Zarr::new(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnnDataError>(),
            Some(AnnDataError::DestinationUnavailable { .. })
        ));
        assert!(Zarr::open_rw(&path).is_err());

        let reader = Zarr::open(&path).unwrap();
        assert!(reader.new_group("x").is_err());

        store.close().unwrap();
        let writer = Zarr::open_rw(&path).unwrap();
        drop(writer);
        assert!(!path.join(LOCK_FILE).exists());
        drop(reader);
    }

    #[test]
    fn readers_keep_the_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");
        let store = Zarr::new(&path).unwrap();
        store.new_scalar_dataset("n", &1i32).unwrap();
        store.close().unwrap();

        let reader = Zarr::open(&path).unwrap();
        let err = Zarr::new(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnnDataError>(),
            Some(AnnDataError::DestinationUnavailable { .. })
        ));
        assert_eq!(reader.open_dataset("n").unwrap().read_scalar::<i32>().unwrap(), 1);

        reader.close().unwrap();
        let store = Zarr::new(&path).unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn refuse_foreign_paths() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, b"hello").unwrap();
        assert!(Zarr::new(&file).is_err());
        assert_eq!(fs::read(&file).unwrap(), b"hello");

        let other = dir.path().join("other");
        fs::create_dir(&other).unwrap();
        fs::write(other.join("keep"), b"").unwrap();
        assert!(Zarr::new(&other).is_err());
        assert!(other.join("keep").exists());
    }

    #[test]
    fn discard_removes_everything() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");
        let store = Zarr::new(&path).unwrap();
        store.new_group("obsm").unwrap();
        store.discard().unwrap();
        assert!(!path.exists());
    }
}
