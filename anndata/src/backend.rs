mod datatype;
pub mod memory;

use crate::data::{DynArray, SelectInfoElem, Shape};
use crate::error::AnnDataError;
pub use datatype::{BackendData, DataType, ScalarType};

use anyhow::{anyhow, bail, Context, Result};
use core::fmt::{Debug, Formatter};
use ndarray::{arr0, Array, CowArray, Dimension, Ix0, IxDyn};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Per-dataset write options. Passed explicitly at every dataset creation.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteConfig {
    /// Compression level, `None` disables compression.
    pub compression: Option<u8>,
    pub block_size: Option<Shape>,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            compression: Some(1),
            block_size: None,
        }
    }
}

pub trait Backend: 'static {
    /// The name of the backend.
    const NAME: &'static str;

    /// Whether stores outlive the process that created them.
    const PERSISTENT: bool;

    /// Data store
    type Store: StoreOp<Self> + GroupOp<Self> + Send + Sync;

    /// Groups work like directories and can contain groups or datasets.
    type Group: GroupOp<Self> + AttributeOp<Self> + Send + Sync;

    /// Datasets store multi-dimensional arrays.
    type Dataset: DatasetOp<Self> + AttributeOp<Self> + Send + Sync;

    /// Create a new store at the given path, replacing an unused store that
    /// already lives there.
    fn new<P: AsRef<Path>>(path: P) -> Result<Self::Store>;

    /// Opens a store as read-only, the store must exist.
    fn open<P: AsRef<Path>>(path: P) -> Result<Self::Store>;

    /// Opens a store as read/write with exclusive access, the store must exist.
    fn open_rw<P: AsRef<Path>>(path: P) -> Result<Self::Store>;
}

pub trait StoreOp<B: Backend + ?Sized> {
    /// Returns the file path.
    fn filename(&self) -> PathBuf;

    /// Make every write issued so far durable.
    fn flush(&self) -> Result<()>;

    /// Flush and release the store.
    fn close(self) -> Result<()>;

    /// Release the store and remove everything it contains.
    fn discard(self) -> Result<()>;
}

pub trait GroupOp<B: Backend + ?Sized> {
    /// List all groups and datasets in this group.
    fn list(&self) -> Result<Vec<String>>;

    /// Create a new group.
    fn new_group(&self, name: &str) -> Result<B::Group>;

    /// Open an existing group.
    fn open_group(&self, name: &str) -> Result<B::Group>;

    /// Create an empty dataset holding an array value.
    fn new_empty_dataset<T: BackendData>(
        &self,
        name: &str,
        shape: &Shape,
        config: WriteConfig,
    ) -> Result<B::Dataset>;

    fn open_dataset(&self, name: &str) -> Result<B::Dataset>;

    /// Delete a group or dataset.
    fn delete(&self, name: &str) -> Result<()>;

    /// Check if a group or dataset exists.
    fn exists(&self, name: &str) -> Result<bool>;

    /// Move the child `from` to `to` within this group. `to` must not exist.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    fn new_array_dataset<'a, T, D>(
        &self,
        name: &str,
        arr: CowArray<'a, T, D>,
        config: WriteConfig,
    ) -> Result<B::Dataset>
    where
        T: BackendData,
        D: Dimension,
    {
        let shape: Shape = arr.shape().into();
        let compression = if arr.len() > 100 {
            config.compression
        } else {
            None
        };
        let config = WriteConfig {
            compression,
            ..config
        };
        let dataset = self.new_empty_dataset::<T>(name, &shape, config)?;
        dataset.write_array(arr)?;
        Ok(dataset)
    }

    fn new_scalar_dataset<T: BackendData>(&self, name: &str, data: &T) -> Result<B::Dataset> {
        self.new_array_dataset(name, arr0(data.clone()).into(), WriteConfig::default())
    }
}

/// Attributes are small JSON values attached to groups and datasets.
pub trait AttributeOp<B: Backend + ?Sized> {
    /// Returns the Root.
    fn store(&self) -> Result<B::Store>;

    /// Returns the path of the location relative to the file root.
    fn path(&self) -> PathBuf;

    /// Write an attribute, replacing an existing one with the same name.
    fn new_json_attr(&mut self, name: &str, value: &Value) -> Result<()>;

    fn get_json_attr(&self, name: &str) -> Result<Value>;

    fn new_attr<T: Serialize>(&mut self, name: &str, value: T) -> Result<()> {
        self.new_json_attr(name, &serde_json::to_value(value)?)
    }

    fn get_attr<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.get_json_attr(name)?;
        serde_json::from_value(value)
            .with_context(|| format!("invalid attribute '{}' at '{}'", name, self.path().display()))
    }
}

pub trait DatasetOp<B: Backend + ?Sized> {
    /// Required methods

    fn dtype(&self) -> Result<ScalarType>;
    fn shape(&self) -> Shape;

    fn write_array_slice<S, T, D>(&self, arr: CowArray<'_, T, D>, selection: &[S]) -> Result<()>
    where
        T: BackendData,
        S: AsRef<SelectInfoElem>,
        D: Dimension;

    fn read_array_slice<T: BackendData, S, D>(&self, selection: &[S]) -> Result<Array<T, D>>
    where
        S: AsRef<SelectInfoElem>,
        D: Dimension;

    /// Optional methods

    fn read_dyn_array_slice<S>(&self, selection: &[S]) -> Result<DynArray>
    where
        S: AsRef<SelectInfoElem>,
    {
        macro_rules! fun {
            ($variant:ident, $ty:ty) => {
                self.read_array_slice::<$ty, _, IxDyn>(selection)?.into()
            };
        }
        Ok(crate::macros::dyn_match!(self.dtype()?, ScalarType, fun))
    }

    fn read_array<T: BackendData, D>(&self) -> Result<Array<T, D>>
    where
        D: Dimension,
    {
        self.read_array_slice(full_selection(self.shape().ndim()).as_slice())
    }

    fn read_dyn_array(&self) -> Result<DynArray> {
        self.read_dyn_array_slice(full_selection(self.shape().ndim()).as_slice())
    }

    fn read_scalar<T: BackendData>(&self) -> Result<T> {
        self.read_array::<T, Ix0>().map(|x| x.into_scalar())
    }

    fn write_array<T, D>(&self, arr: CowArray<'_, T, D>) -> Result<()>
    where
        T: BackendData,
        D: Dimension,
    {
        let ndim = arr.ndim();
        self.write_array_slice(arr, full_selection(ndim).as_slice())
    }
}

/// Element names become path components in every backend.
pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        bail!("invalid element name '{}'", name);
    }
    Ok(())
}

pub(crate) fn full_selection(ndim: usize) -> Vec<SelectInfoElem> {
    vec![SelectInfoElem::full(); ndim]
}

pub enum DataContainer<B: Backend> {
    Group(B::Group),
    Dataset(B::Dataset),
}

impl<B: Backend> Debug for DataContainer<B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            DataContainer::Group(g) => write!(f, "Group({:?})", g.path()),
            DataContainer::Dataset(d) => write!(f, "Dataset({:?})", d.path()),
        }
    }
}

impl<B: Backend> AttributeOp<B> for DataContainer<B> {
    fn store(&self) -> Result<B::Store> {
        match self {
            DataContainer::Group(g) => g.store(),
            DataContainer::Dataset(d) => d.store(),
        }
    }

    fn path(&self) -> PathBuf {
        match self {
            DataContainer::Group(g) => g.path(),
            DataContainer::Dataset(d) => d.path(),
        }
    }

    fn new_json_attr(&mut self, name: &str, value: &Value) -> Result<()> {
        match self {
            DataContainer::Group(g) => g.new_json_attr(name, value),
            DataContainer::Dataset(d) => d.new_json_attr(name, value),
        }
    }

    fn get_json_attr(&self, name: &str) -> Result<Value> {
        match self {
            DataContainer::Group(g) => g.get_json_attr(name),
            DataContainer::Dataset(d) => d.get_json_attr(name),
        }
    }
}

impl<B: Backend> DataContainer<B> {
    pub fn open<G: GroupOp<B>>(group: &G, name: &str) -> Result<Self> {
        if group.exists(name)? {
            match group.open_dataset(name) {
                Ok(ds) => Ok(DataContainer::Dataset(ds)),
                Err(e1) => group.open_group(name).map(DataContainer::Group).map_err(|e2| {
                    e2.context(e1).context(format!(
                        "Error opening group or dataset named '{}' in group",
                        name
                    ))
                }),
            }
        } else {
            bail!(AnnDataError::NotFound(name.into()));
        }
    }

    /// Delete the container from its parent group.
    pub fn delete(self) -> Result<()> {
        let path = self.path();
        let name = path
            .file_name()
            .and_then(|x| x.to_str())
            .ok_or_else(|| anyhow!("cannot delete the root group"))?
            .to_string();
        let parent = path.parent().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
        let store = self.store()?;
        drop(self);
        if parent.is_empty() || parent == "/" {
            store.delete(&name)
        } else {
            store.open_group(&parent)?.delete(&name)
        }
    }

    pub fn encoding_type(&self) -> Result<DataType> {
        let enc = match self {
            DataContainer::Group(group) => group
                .get_attr::<String>("encoding-type")
                .unwrap_or_else(|_| "mapping".to_string()),
            DataContainer::Dataset(dataset) => {
                dataset.get_attr::<String>("encoding-type").unwrap_or_else(|_| {
                    if dataset.shape().ndim() == 0 {
                        "numeric-scalar".to_string()
                    } else {
                        "array".to_string()
                    }
                })
            }
        };
        let ty = match enc.as_str() {
            "string" => DataType::Scalar(ScalarType::String),
            "numeric-scalar" => DataType::Scalar(self.as_dataset()?.dtype()?),
            "categorical" => DataType::Categorical,
            "string-array" => DataType::Array(ScalarType::String),
            "array" => DataType::Array(self.as_dataset()?.dtype()?),
            "csc_matrix" => {
                let ty = self.as_group()?.open_dataset("data")?.dtype()?;
                DataType::CscMatrix(ty)
            }
            "csr_matrix" => {
                let ty = self.as_group()?.open_dataset("data")?.dtype()?;
                DataType::CsrMatrix(ty)
            }
            "dataframe" => DataType::DataFrame,
            "mapping" | "dict" => DataType::Mapping,
            ty => bail!(AnnDataError::corrupt(format!(
                "unsupported encoding type '{}' at '{}'",
                ty,
                self.path().display()
            ))),
        };
        Ok(ty)
    }

    pub fn as_group(&self) -> Result<&B::Group> {
        match self {
            Self::Group(x) => Ok(x),
            _ => bail!("Expecting Group"),
        }
    }

    pub fn as_dataset(&self) -> Result<&B::Dataset> {
        match self {
            Self::Dataset(x) => Ok(x),
            _ => bail!("Expecting Dataset"),
        }
    }
}

/// Open every child of a group, in the order the backend lists them.
pub fn iter_containers<B: Backend>(group: &B::Group) -> Result<Vec<(String, DataContainer<B>)>> {
    group
        .list()?
        .into_iter()
        .map(|x| {
            let container = DataContainer::open(group, &x)?;
            Ok((x, container))
        })
        .collect()
}

/// Selection-aware read/write over a whole array held by value. Backends that
/// store complete arrays (rather than chunks) share this logic.
pub mod whole_array {
    use super::*;
    use crate::data::{SelectInfoBounds, Selectable};

    pub fn read<T, S, D>(data: DynArray, selection: &[S]) -> Result<Array<T, D>>
    where
        T: BackendData,
        S: AsRef<SelectInfoElem>,
        D: Dimension,
    {
        let arr = T::from_dyn_arr(data)?;
        let arr = if selection.iter().all(|s| s.as_ref().is_full()) {
            arr
        } else {
            SelectInfoBounds::new(selection, &arr.shape().into())?;
            Selectable::select(&arr, selection)
        };
        Ok(arr.into_dimensionality::<D>()?)
    }

    /// Write `arr` into `existing` at `selection`. Only unit-step slices are
    /// supported for partial writes.
    pub fn write<T, S, D>(
        existing: Option<DynArray>,
        shape: &Shape,
        arr: CowArray<'_, T, D>,
        selection: &[S],
    ) -> Result<DynArray>
    where
        T: BackendData,
        S: AsRef<SelectInfoElem>,
        D: Dimension,
    {
        let bounds = SelectInfoBounds::new(selection, shape)?;
        if bounds.out_shape().as_ref() != arr.shape() {
            bail!(
                "cannot write array of shape {:?} into selection of shape {}",
                arr.shape(),
                bounds.out_shape()
            );
        }
        if bounds.is_full() {
            return Ok(T::into_dyn_arr(arr.into_owned()));
        }
        let mut target = match existing {
            Some(x) => T::from_dyn_arr(x)?,
            None => ndarray::ArrayD::<T>::default(ndarray::IxDyn(shape.as_ref())),
        };
        let ranges = bounds
            .as_ref()
            .iter()
            .map(|b| {
                b.as_range()
                    .map(ndarray::SliceInfoElem::from)
                    .ok_or_else(|| anyhow!("partial writes only support unit-step slices"))
            })
            .collect::<Result<Vec<_>>>()?;
        let info = ndarray::SliceInfo::<_, IxDyn, IxDyn>::try_from(ranges)?;
        target.slice_mut(&info).assign(&arr.into_dyn());
        Ok(T::into_dyn_arr(target))
    }
}
