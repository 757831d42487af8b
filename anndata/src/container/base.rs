use crate::{
    backend::{AttributeOp, Backend, DataContainer, DataType, GroupOp},
    data::*,
    error::AnnDataError,
};

use anyhow::{anyhow, bail, Result};
use indexmap::IndexSet;
use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard};
use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

/// Slot stores an optional object wrapped by Arc and Mutex.
/// Encapsulating an object inside a slot allows us to drop the object from all references.
#[derive(Debug)]
pub struct Slot<T>(pub(crate) Arc<Mutex<Option<T>>>);

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Slot(self.0.clone())
    }
}

impl<T> std::fmt::Display for Slot<T>
where
    T: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.lock().as_ref() {
            None => write!(f, "Empty or closed slot"),
            Some(x) => write!(f, "{}", x),
        }
    }
}

impl<T> Slot<T> {
    /// Create a slot from data.
    pub fn new(x: T) -> Self {
        Slot(Arc::new(Mutex::new(Some(x))))
    }

    /// Create an empty slot.
    pub fn empty() -> Self {
        Slot(Arc::new(Mutex::new(None)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_none()
    }

    pub fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.0.lock()
    }

    /// Lock the slot, failing if it is empty.
    pub fn inner(&self) -> Result<Inner<'_, T>> {
        let guard = self.0.lock();
        if guard.is_none() {
            bail!("accessing an empty slot");
        }
        Ok(Inner(guard))
    }

    /// Insert data to the slot, and return the old data.
    pub fn insert(&self, data: T) -> Option<T> {
        self.0.lock().replace(data)
    }

    /// Extract the data from the slot. The slot becomes empty after this operation.
    pub fn extract(&self) -> Option<T> {
        self.0.lock().take()
    }

    /// Remove the data from the slot.
    pub fn drop(&self) {
        let _ = self.extract();
    }

    pub fn swap(&self, other: &Self) {
        if Arc::ptr_eq(&self.0, &other.0) {
            return;
        }
        let mut self_lock = self.0.lock();
        let mut other_lock = other.0.lock();
        std::mem::swap(self_lock.deref_mut(), other_lock.deref_mut());
    }
}

/// A locked, non-empty slot.
pub struct Inner<'a, T>(MutexGuard<'a, Option<T>>);

impl<T> Deref for Inner<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self.0.deref() {
            None => unreachable!("checked when the guard was taken"),
            Some(x) => x,
        }
    }
}

impl<T> DerefMut for Inner<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.0.deref_mut() {
            None => unreachable!("checked when the guard was taken"),
            Some(x) => x,
        }
    }
}

/// Write `data` in place of `container`, under the same parent and name.
/// The old element is only removed once the new one is fully written.
pub(crate) fn rewrite<B: Backend, D: Writable>(
    container: &DataContainer<B>,
    data: &D,
) -> Result<DataContainer<B>> {
    let path = container.path();
    let name = path
        .file_name()
        .and_then(|x| x.to_str())
        .ok_or_else(|| anyhow!("cannot replace the root group"))?
        .to_string();
    let store = container.store()?;
    let parent = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty() && p != "/");
    match parent {
        None => replace(&store, &name, data),
        Some(parent) => replace(&store.open_group(&parent)?, &name, data),
    }
}

fn replace<B, G, D>(group: &G, name: &str, data: &D) -> Result<DataContainer<B>>
where
    B: Backend,
    G: GroupOp<B>,
    D: Writable,
{
    let tmp = format!(".{}.tmp", name);
    if group.exists(&tmp)? {
        group.delete(&tmp)?;
    }
    if let Err(e) = data.write(group, &tmp) {
        if group.exists(&tmp).unwrap_or(false) {
            if let Err(err) = group.delete(&tmp) {
                warn!("cannot remove partial element '{}': {}", tmp, err);
            }
        }
        return Err(e);
    }
    group.delete(name)?;
    group.rename(&tmp, name)?;
    DataContainer::open(group, name)
}

/// Annotation table bound to a store. Columns are read on demand.
#[derive(Debug)]
pub struct InnerDataFrameElem<B: Backend> {
    element: Option<DataFrame>,
    container: DataContainer<B>,
    column_names: IndexSet<String>,
    index: DataFrameIndex,
}

impl<B: Backend> InnerDataFrameElem<B> {
    pub(crate) fn new<G: GroupOp<B>>(location: &G, name: &str, df: &DataFrame) -> Result<Self> {
        let container = df.write(location, name)?;
        Ok(Self {
            element: None,
            container,
            column_names: df.column_names().into_iter().collect(),
            index: df.index().clone(),
        })
    }
}

impl<B: Backend> std::fmt::Display for InnerDataFrameElem<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DataFrame element with {} rows and columns: '{}'",
            self.height(),
            self.column_names.iter().cloned().collect::<Vec<_>>().join("', '")
        )
    }
}

impl<B: Backend> InnerDataFrameElem<B> {
    pub fn width(&self) -> usize {
        self.column_names.len()
    }

    pub fn height(&self) -> usize {
        self.index.len()
    }

    pub fn get_column_names(&self) -> &IndexSet<String> {
        &self.column_names
    }

    pub fn index(&self) -> &DataFrameIndex {
        &self.index
    }

    /// Read a single column without loading the rest of the frame.
    pub fn column(&self, name: &str) -> Result<Option<Column>> {
        if !self.column_names.contains(name) {
            return Ok(None);
        }
        if let Some(df) = self.element.as_ref() {
            return Ok(df.get(name).cloned());
        }
        let group = self.container.as_group()?;
        Column::read(&DataContainer::<B>::open(group, name)?).map(Some)
    }

    /// Add or replace a column. The column must have one value per row.
    pub fn set_column<C: Into<Column>>(&mut self, name: &str, column: C) -> Result<()> {
        let column = column.into();
        if column.len() != self.height() {
            bail!(AnnDataError::axis_mismatch("column", self.height(), column.len()));
        }
        let mut df = self.data()?.clone();
        df.insert(name, column)?;
        self.save(df)
    }

    pub fn remove_column(&mut self, name: &str) -> Result<()> {
        if self.column_names.contains(name) {
            let mut df = self.data()?.clone();
            df.remove(name);
            self.save(df)?;
        }
        Ok(())
    }

    pub fn set_index(&mut self, index: DataFrameIndex) -> Result<()> {
        if index.len() != self.height() {
            bail!(AnnDataError::axis_mismatch("index", self.height(), index.len()));
        }
        let mut df = self.data()?.clone();
        df.set_index(index)?;
        self.save(df)
    }

    pub fn data(&mut self) -> Result<&DataFrame> {
        if self.element.is_none() {
            self.element = Some(DataFrame::read(&self.container)?);
        }
        self.element
            .as_ref()
            .ok_or_else(|| anyhow!("data frame cache is empty"))
    }

    pub fn export<O: Backend, G: GroupOp<O>>(&self, location: &G, name: &str) -> Result<()> {
        match self.element.as_ref() {
            Some(df) => df.write(location, name)?,
            None => DataFrame::read(&self.container)?.write(location, name)?,
        };
        Ok(())
    }

    /// Export the selected rows, reading only those rows from the store.
    pub fn export_select<O, G>(
        &self,
        rows: &SelectInfoElem,
        location: &G,
        name: &str,
    ) -> Result<()>
    where
        O: Backend,
        G: GroupOp<O>,
    {
        if rows.is_full() {
            return self.export::<O, _>(location, name);
        }
        let selection = [rows.clone(), SelectInfoElem::full()];
        let df = match self.element.as_ref() {
            Some(df) => Selectable::select(df, &selection),
            None => DataFrame::read_select(&self.container, &selection)?,
        };
        df.write(location, name)?;
        Ok(())
    }

    /// Replace the whole frame. The number of rows cannot change.
    pub fn save(&mut self, data: DataFrame) -> Result<()> {
        if data.height() != self.height() {
            bail!(AnnDataError::axis_mismatch("row", self.height(), data.height()));
        }
        self.container = rewrite(&self.container, &data)?;
        self.column_names = data.column_names().into_iter().collect();
        self.index = data.index().clone();
        if self.element.is_some() {
            self.element = Some(data);
        }
        Ok(())
    }
}

pub type DataFrameElem<B> = Slot<InnerDataFrameElem<B>>;

impl<B: Backend> TryFrom<DataContainer<B>> for DataFrameElem<B> {
    type Error = anyhow::Error;

    fn try_from(container: DataContainer<B>) -> Result<Self> {
        match container.encoding_type()? {
            DataType::DataFrame => {
                let group = container.as_group()?;
                let index_key: String = group.get_attr("_index")?;
                let index = DataFrameIndex::read_from::<B>(group, &index_key)?;
                let column_names = container
                    .get_attr::<Vec<String>>("column-order")?
                    .into_iter()
                    .collect();
                let df = InnerDataFrameElem {
                    element: None,
                    container,
                    column_names,
                    index,
                };
                Ok(Slot::new(df))
            }
            ty => bail!("Expecting a dataframe but found: '{}'", ty),
        }
    }
}

impl<B: Backend> DataFrameElem<B> {
    /// Delete and Remove the data from the element.
    pub fn clear(&self) -> Result<()> {
        if let Some(elem) = self.extract() {
            DataContainer::delete(elem.container)?;
        }
        Ok(())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.lock()
            .as_ref()
            .map_or(Vec::new(), |x| x.column_names.iter().cloned().collect())
    }

    pub fn column(&self, name: &str) -> Result<Option<Column>> {
        match self.lock().as_ref() {
            None => Ok(None),
            Some(x) => x.column(name),
        }
    }

    pub fn set_column<C: Into<Column>>(&self, name: &str, column: C) -> Result<()> {
        self.inner()?.set_column(name, column)
    }

    pub fn remove_column(&self, name: &str) -> Result<()> {
        self.inner()?.remove_column(name)
    }
}

/// Container holding general data types.
#[derive(Debug)]
pub struct InnerElem<B: Backend> {
    dtype: DataType,
    cache_enabled: bool,
    container: DataContainer<B>,
    element: Option<Data>,
}

impl<B: Backend> std::fmt::Display for InnerElem<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} element, cache_enabled: {}, cached: {}",
            self.dtype,
            if self.cache_enabled { "yes" } else { "no" },
            if self.element.is_some() { "yes" } else { "no" },
        )
    }
}

impl<B: Backend> InnerElem<B> {
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn enable_cache(&mut self) {
        self.cache_enabled = true;
    }

    pub fn disable_cache(&mut self) {
        self.element = None;
        self.cache_enabled = false;
    }

    pub fn data(&mut self) -> Result<Data> {
        match self.element.as_ref() {
            Some(data) => Ok(data.clone()),
            None => {
                let data = Data::read(&self.container)?;
                if self.cache_enabled {
                    self.element = Some(data.clone());
                }
                Ok(data)
            }
        }
    }

    pub(crate) fn save(&mut self, data: Data) -> Result<()> {
        self.container = rewrite(&self.container, &data)?;
        self.dtype = data.data_type();
        if self.element.is_some() {
            self.element = Some(data);
        }
        Ok(())
    }

    pub fn export<O: Backend, G: GroupOp<O>>(&self, location: &G, name: &str) -> Result<()> {
        match self.element.as_ref() {
            Some(data) => data.write(location, name)?,
            None => Data::read(&self.container)?.write(location, name)?,
        };
        Ok(())
    }
}

pub type Elem<B> = Slot<InnerElem<B>>;

impl<B: Backend> TryFrom<DataContainer<B>> for Elem<B> {
    type Error = anyhow::Error;

    fn try_from(container: DataContainer<B>) -> Result<Self> {
        let dtype = container.encoding_type()?;
        let elem = InnerElem {
            dtype,
            cache_enabled: false,
            element: None,
            container,
        };
        Ok(Slot::new(elem))
    }
}

impl<B: Backend> Elem<B> {
    /// Delete and Remove the data from the element.
    pub fn clear(&self) -> Result<()> {
        if let Some(elem) = self.extract() {
            DataContainer::delete(elem.container)?;
        }
        Ok(())
    }
}

/// An array element bound to a store. Only the type and shape are kept in
/// memory unless caching is enabled.
#[derive(Debug)]
pub struct InnerArrayElem<B: Backend> {
    dtype: DataType,
    shape: Shape,
    cache_enabled: bool,
    container: DataContainer<B>,
    element: Option<ArrayData>,
}

impl<B: Backend> std::fmt::Display for InnerArrayElem<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} element of shape {}, cache_enabled: {}, cached: {}",
            self.dtype,
            self.shape,
            if self.cache_enabled { "yes" } else { "no" },
            if self.element.is_some() { "yes" } else { "no" },
        )
    }
}

impl<B: Backend> InnerArrayElem<B> {
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn enable_cache(&mut self) {
        self.cache_enabled = true;
    }

    pub fn disable_cache(&mut self) {
        self.element = None;
        self.cache_enabled = false;
    }

    pub fn data(&mut self) -> Result<ArrayData> {
        match self.element.as_ref() {
            Some(data) => Ok(data.clone()),
            None => {
                let data = ArrayData::read(&self.container)?;
                if self.cache_enabled {
                    self.element = Some(data.clone());
                }
                Ok(data)
            }
        }
    }

    pub(crate) fn save(&mut self, data: ArrayData) -> Result<()> {
        self.container = rewrite(&self.container, &data)?;
        self.dtype = data.data_type();
        self.shape = data.shape();
        if self.element.is_some() {
            self.element = Some(data);
        }
        Ok(())
    }

    pub fn export<O: Backend, G: GroupOp<O>>(&self, location: &G, name: &str) -> Result<()> {
        debug!("exporting {} of shape {} to '{}'", self.dtype, self.shape, name);
        match self.element.as_ref() {
            Some(data) => data.write(location, name)?,
            None => ArrayData::read(&self.container)?.write(location, name)?,
        };
        Ok(())
    }

    pub fn select<S>(&mut self, selection: &[S]) -> Result<ArrayData>
    where
        S: AsRef<SelectInfoElem>,
    {
        SelectInfoBounds::new(selection, &self.shape)?;
        if selection.iter().all(|x| x.as_ref().is_full()) {
            self.data()
        } else {
            match self.element.as_ref() {
                Some(data) => Ok(Selectable::select(data, selection)),
                None => ArrayData::read_select(&self.container, selection),
            }
        }
    }

    pub fn select_axis<S>(&mut self, axis: usize, selection: S) -> Result<ArrayData>
    where
        S: AsRef<SelectInfoElem>,
    {
        let full = SelectInfoElem::full();
        let slice = selection.as_ref().set_axis(axis, self.shape.ndim(), &full);
        self.select(slice.as_slice())
    }

    pub fn export_select<O, S, G>(&mut self, selection: &[S], location: &G, name: &str) -> Result<()>
    where
        O: Backend,
        S: AsRef<SelectInfoElem>,
        G: GroupOp<O>,
    {
        if selection.iter().all(|x| x.as_ref().is_full()) {
            self.export::<O, _>(location, name)
        } else {
            debug!("exporting a selection of {} to '{}'", self.dtype, name);
            self.select(selection)?.write(location, name)?;
            Ok(())
        }
    }
}

pub type ArrayElem<B> = Slot<InnerArrayElem<B>>;

/// Container holding matrix data types.
impl<B: Backend> TryFrom<DataContainer<B>> for ArrayElem<B> {
    type Error = anyhow::Error;

    fn try_from(container: DataContainer<B>) -> Result<Self> {
        let dtype = container.encoding_type()?;
        let elem = InnerArrayElem {
            dtype,
            shape: ArrayData::get_shape(&container)?,
            cache_enabled: false,
            element: None,
            container,
        };
        Ok(Slot::new(elem))
    }
}

impl<B: Backend> ArrayElem<B> {
    /// Delete and Remove the data from the element.
    pub fn clear(&self) -> Result<()> {
        if let Some(elem) = self.extract() {
            DataContainer::delete(elem.container)?;
        }
        Ok(())
    }

    pub fn enable_cache(&self) {
        if let Some(x) = self.lock().as_mut() {
            x.enable_cache();
        }
    }

    pub fn disable_cache(&self) {
        if let Some(x) = self.lock().as_mut() {
            x.disable_cache();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemory;
    use crate::backend::StoreOp;
    use ndarray::{array, Array2};

    #[test]
    fn lazy_array_elem() {
        let store = InMemory::new("elem").unwrap();
        let arr = Array2::from_shape_fn((5, 3), |(i, j)| (i * 3 + j) as i16);
        let elem = ArrayElem::<InMemory>::try_from(arr.write(&store, "m").unwrap()).unwrap();
        assert_eq!(elem.inner().unwrap().shape(), &Shape::from(vec![5, 3]));

        let rows = elem
            .inner()
            .unwrap()
            .select_axis(0, SelectInfoElem::from(vec![4usize, 0]))
            .unwrap();
        assert_eq!(rows, ArrayData::from(array![[12i16, 13, 14], [0, 1, 2]]));

        elem.enable_cache();
        assert_eq!(elem.inner().unwrap().data().unwrap(), ArrayData::from(arr));
        elem.inner()
            .unwrap()
            .save(array![[1u8, 2]].into())
            .unwrap();
        assert_eq!(elem.inner().unwrap().shape(), &Shape::from(vec![1, 2]));
        assert_eq!(
            ArrayData::read(&DataContainer::<InMemory>::open(&store, "m").unwrap()).unwrap(),
            ArrayData::from(array![[1u8, 2]])
        );

        elem.clear().unwrap();
        assert!(elem.is_empty());
        assert!(!store.exists("m").unwrap());
        assert!(elem.inner().is_err());
        store.close().unwrap();
    }

    #[test]
    fn data_frame_elem_columns() {
        let store = InMemory::new("df").unwrap();
        let mut df = DataFrame::new(3);
        df.insert("a", array![1i64, 2, 3]).unwrap();
        let elem = Slot::new(InnerDataFrameElem::<InMemory>::new(&store, "obs", &df).unwrap());

        elem.set_column("b", array![0.5f32, 0.25, 0.0]).unwrap();
        assert_eq!(elem.column_names(), vec!["a", "b"]);
        let err = elem.set_column("c", array![1u8]).unwrap_err();
        assert!(matches!(
            AnnDataError::of(&err),
            Some(AnnDataError::AxisMismatch { expected: 3, got: 1, .. })
        ));
        assert_eq!(
            elem.column("b").unwrap(),
            Some(Column::from(array![0.5f32, 0.25, 0.0]))
        );

        let reopened =
            DataFrameElem::<InMemory>::try_from(DataContainer::open(&store, "obs").unwrap())
                .unwrap();
        assert_eq!(reopened.column_names(), vec!["a", "b"]);
        assert_eq!(reopened.inner().unwrap().height(), 3);

        elem.remove_column("a").unwrap();
        assert_eq!(elem.column_names(), vec!["b"]);
        assert_eq!(elem.column("a").unwrap(), None);
    }

    /// Writes half of a group, then gives up.
    struct Unfinished;

    impl Element for Unfinished {
        fn data_type(&self) -> DataType {
            DataType::Mapping
        }

        fn metadata(&self) -> MetaData {
            MetaData::new("dict", "0.1.0", None)
        }
    }

    impl Writable for Unfinished {
        fn write<B: Backend, G: GroupOp<B>>(
            &self,
            location: &G,
            name: &str,
        ) -> Result<DataContainer<B>> {
            let group = location.new_group(name)?;
            group.new_scalar_dataset("first", &1u8)?;
            bail!("disk full")
        }
    }

    #[test]
    fn failed_rewrite_keeps_old_element() {
        let store = InMemory::new("rewrite").unwrap();
        let group = store.new_group("obsm").unwrap();
        let arr = array![[1i32, 2], [3, 4]];
        let container = arr.write(&group, "pca").unwrap();

        assert!(rewrite(&container, &Unfinished).is_err());
        assert_eq!(group.list().unwrap(), vec!["pca"]);
        assert_eq!(
            ArrayData::read(&DataContainer::<InMemory>::open(&group, "pca").unwrap()).unwrap(),
            ArrayData::from(arr)
        );

        let replaced = rewrite(&container, &array![7u8]).unwrap();
        assert_eq!(replaced.path(), std::path::PathBuf::from("/obsm/pca"));
        assert_eq!(ArrayData::read(&replaced).unwrap(), ArrayData::from(array![7u8]));
        assert_eq!(group.list().unwrap(), vec!["pca"]);
    }

    #[test]
    fn bad_column_name_keeps_frame() {
        let store = InMemory::new("names").unwrap();
        let mut df = DataFrame::new(2);
        df.insert("a", array![1i64, 2]).unwrap();
        let elem = Slot::new(InnerDataFrameElem::<InMemory>::new(&store, "obs", &df).unwrap());

        assert!(elem.set_column("a/b", array![3i64, 4]).is_err());
        assert!(elem.set_column("", array![3i64, 4]).is_err());
        assert_eq!(elem.column_names(), vec!["a"]);
        let stored = DataFrame::read(&DataContainer::<InMemory>::open(&store, "obs").unwrap())
            .unwrap();
        assert_eq!(stored, df);
    }
}
