use crate::backend::*;
use crate::data::{
    array::{CategoricalArray, DynArray},
    data_traits::*,
    index::DataFrameIndex,
    scalar::DynScalar,
    slice::{SelectInfoBounds, SelectInfoElem, SelectInfoElemBounds, Shape},
};
use crate::error::AnnDataError;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use ndarray::{Array, Ix1};
use std::collections::HashMap;

/// One column of a `DataFrame`.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// A one-dimensional array.
    Array(DynArray),
    Categorical(CategoricalArray),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Array(arr) => arr.len(),
            Column::Categorical(cat) => cat.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<()> {
        if let Column::Array(arr) = self {
            if arr.ndim() != 1 {
                bail!(
                    "data frame columns must be one-dimensional, got shape {}",
                    arr.shape()
                );
            }
        }
        Ok(())
    }

    fn select_rows(&self, rows: &SelectInfoElem) -> Self {
        match self {
            Column::Array(arr) => Column::Array(arr.select(&[rows])),
            Column::Categorical(cat) => Column::Categorical(cat.select(&[rows])),
        }
    }
}

impl<T> From<Array<T, Ix1>> for Column
where
    DynArray: From<Array<T, Ix1>>,
{
    fn from(arr: Array<T, Ix1>) -> Self {
        Column::Array(arr.into())
    }
}

impl From<CategoricalArray> for Column {
    fn from(cat: CategoricalArray) -> Self {
        Column::Categorical(cat)
    }
}

impl TryFrom<DynArray> for Column {
    type Error = anyhow::Error;

    fn try_from(arr: DynArray) -> Result<Self> {
        let col = Column::Array(arr);
        col.check()?;
        Ok(col)
    }
}

impl Element for Column {
    fn data_type(&self) -> DataType {
        match self {
            Column::Array(arr) => arr.data_type(),
            Column::Categorical(cat) => cat.data_type(),
        }
    }

    fn metadata(&self) -> MetaData {
        match self {
            Column::Array(arr) => arr.metadata(),
            Column::Categorical(cat) => cat.metadata(),
        }
    }
}

impl Writable for Column {
    fn write<B: Backend, G: GroupOp<B>>(
        &self,
        location: &G,
        name: &str,
    ) -> Result<DataContainer<B>> {
        match self {
            Column::Array(arr) => arr.write(location, name),
            Column::Categorical(cat) => cat.write(location, name),
        }
    }
}

impl Readable for Column {
    fn read<B: Backend>(container: &DataContainer<B>) -> Result<Self> {
        match container.encoding_type()? {
            DataType::Categorical => Ok(Column::Categorical(CategoricalArray::read(container)?)),
            DataType::Array(_) => DynArray::read(container)?.try_into(),
            ty => bail!(AnnDataError::corrupt(format!(
                "{} cannot be a data frame column",
                ty
            ))),
        }
    }
}

impl Column {
    fn read_rows<B: Backend>(container: &DataContainer<B>, rows: &SelectInfoElem) -> Result<Self> {
        match container.encoding_type()? {
            DataType::Categorical => Ok(Column::Categorical(CategoricalArray::read_select(
                container,
                &[rows],
            )?)),
            DataType::Array(_) => DynArray::read_select(container, &[rows])?.try_into(),
            ty => bail!(AnnDataError::corrupt(format!(
                "{} cannot be a data frame column",
                ty
            ))),
        }
    }

    fn get(&self, row: usize) -> Option<DynScalar> {
        match self {
            Column::Array(arr) => arr.get(&[row]),
            Column::Categorical(cat) => cat.get(&[row]),
        }
    }
}

/// A table of named, equally long columns with row names.
#[derive(Debug, Clone)]
pub struct DataFrame {
    height: usize,
    columns: IndexMap<String, Column>,
    index: DataFrameIndex,
}

/// Column order matters.
impl PartialEq for DataFrame {
    fn eq(&self, other: &Self) -> bool {
        self.height == other.height
            && self.index == other.index
            && self.columns.len() == other.columns.len()
            && self.columns.iter().eq(other.columns.iter())
    }
}

impl Default for DataFrame {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DataFrame {
    /// A frame with `height` rows, no columns and positional row names.
    pub fn new(height: usize) -> Self {
        Self {
            height,
            columns: IndexMap::new(),
            index: DataFrameIndex::from(height),
        }
    }

    /// Build from named columns. The first column fixes the height.
    pub fn from_columns<I, S, C>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, C)>,
        S: Into<String>,
        C: Into<Column>,
    {
        let mut df: Option<Self> = None;
        for (name, col) in columns {
            let col = col.into();
            df.get_or_insert_with(|| Self::new(col.len()))
                .insert(name, col)?;
        }
        Ok(df.unwrap_or_default())
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index(&self) -> &DataFrameIndex {
        &self.index
    }

    pub fn set_index(&mut self, index: DataFrameIndex) -> Result<()> {
        if index.len() != self.height {
            bail!(AnnDataError::axis_mismatch("index", self.height, index.len()));
        }
        self.index = index;
        Ok(())
    }

    /// Insert a column. An existing column of the same name is replaced in place.
    pub fn insert<S: Into<String>, C: Into<Column>>(&mut self, name: S, column: C) -> Result<()> {
        let name = name.into();
        check_name(&name)?;
        let column = column.into();
        column.check()?;
        if column.len() != self.height {
            bail!(AnnDataError::axis_mismatch("column", self.height, column.len()));
        }
        self.columns.insert(name, column);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Remove a column, keeping the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<Column> {
        self.columns.shift_remove(name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Column)> {
        self.columns.iter()
    }

    /// Pick rows; every column keeps its kind.
    pub fn select_rows(&self, rows: &SelectInfoElem) -> Self {
        let bounds = SelectInfoElemBounds::new(rows, self.height);
        Self {
            height: bounds.len(),
            columns: self
                .columns
                .iter()
                .map(|(k, v)| (k.clone(), v.select_rows(rows)))
                .collect(),
            index: self.index.select(rows),
        }
    }

    /// Name of the dataset holding the row names. It must not clash with a
    /// column.
    fn index_key(&self) -> String {
        let mut key = self.index.index_name.clone();
        while self.columns.contains_key(&key) {
            key = format!("_{}", key);
        }
        key
    }
}

impl Element for DataFrame {
    fn data_type(&self) -> DataType {
        DataType::DataFrame
    }

    fn metadata(&self) -> MetaData {
        let mut metadata = HashMap::new();
        metadata.insert("_index".to_string(), self.index_key().into());
        metadata.insert(
            "column-order".to_string(),
            self.columns.keys().cloned().collect::<Vec<_>>().into(),
        );
        MetaData::new("dataframe", "0.2.0", Some(metadata))
    }
}

impl Writable for DataFrame {
    fn write<B: Backend, G: GroupOp<B>>(
        &self,
        location: &G,
        name: &str,
    ) -> Result<DataContainer<B>> {
        let mut group = location.new_group(name)?;
        self.metadata().save::<B, _>(&mut group)?;
        self.index.write_into::<B>(&group, &self.index_key())?;
        for (key, column) in self.columns.iter() {
            column
                .write(&group, key)
                .with_context(|| format!("cannot write column '{}'", key))?;
        }
        Ok(DataContainer::Group(group))
    }
}

fn read_layout<B: Backend>(container: &DataContainer<B>) -> Result<(String, Vec<String>)> {
    let group = container.as_group()?;
    let index_key: String = group.get_attr("_index")?;
    let columns: Vec<String> = group.get_attr("column-order")?;
    Ok((index_key, columns))
}

fn read_frame<B: Backend>(container: &DataContainer<B>, info: Option<&[SelectInfoElem]>) -> Result<DataFrame> {
    let group = container.as_group()?;
    let (index_key, columns) = read_layout(container)?;
    let index = DataFrameIndex::read_from::<B>(group, &index_key)?;
    let (index, selected) = match info {
        None => (index, (0..columns.len()).collect::<Vec<_>>()),
        Some(info) => (
            index.select(&info[0]),
            SelectInfoElemBounds::new(&info[1], columns.len()).to_vec(),
        ),
    };
    let mut df = DataFrame::new(index.len());
    df.index = index;
    for i in selected {
        let key = &columns[i];
        let elem = DataContainer::open(group, key)?;
        let column = match info {
            None => Column::read(&elem)?,
            Some(info) => Column::read_rows(&elem, &info[0])?,
        };
        if column.len() != df.height {
            bail!(AnnDataError::corrupt(format!(
                "column '{}' has {} rows, expecting {}",
                key,
                column.len(),
                df.height
            )));
        }
        df.columns.insert(key.clone(), column);
    }
    Ok(df)
}

impl Readable for DataFrame {
    fn read<B: Backend>(container: &DataContainer<B>) -> Result<Self> {
        read_frame(container, None)
    }
}

impl HasShape for DataFrame {
    fn shape(&self) -> Shape {
        vec![self.height, self.columns.len()].into()
    }
}

impl Indexable for DataFrame {
    fn get(&self, index: &[usize]) -> Option<DynScalar> {
        match index {
            &[row, col] => self.columns.get_index(col)?.1.get(row),
            _ => None,
        }
    }
}

impl Selectable for DataFrame {
    fn select<S>(&self, info: &[S]) -> Self
    where
        S: AsRef<SelectInfoElem>,
    {
        assert_eq!(info.len(), 2, "data frames take a 2-dimensional selection");
        let rows = self.select_rows(info[0].as_ref());
        let cols = SelectInfoElemBounds::new(info[1].as_ref(), self.columns.len());
        Self {
            height: rows.height,
            columns: cols
                .to_vec()
                .into_iter()
                .filter_map(|i| rows.columns.get_index(i))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            index: rows.index,
        }
    }
}

impl ReadableArray for DataFrame {
    fn get_shape<B: Backend>(container: &DataContainer<B>) -> Result<Shape> {
        let (index_key, columns) = read_layout(container)?;
        let nrows = DataFrameIndex::read_len::<B>(container.as_group()?, &index_key)?;
        Ok(vec![nrows, columns.len()].into())
    }

    fn read_select<B, S>(container: &DataContainer<B>, info: &[S]) -> Result<Self>
    where
        B: Backend,
        S: AsRef<SelectInfoElem>,
    {
        SelectInfoBounds::new(info, &Self::get_shape(container)?)?;
        let info: Vec<SelectInfoElem> = info.iter().map(|s| s.as_ref().clone()).collect();
        read_frame(container, Some(&info))
    }
}

impl WritableArray for DataFrame {}
impl WritableArray for &DataFrame {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemory;
    use ndarray::array;

    fn frame() -> DataFrame {
        let mut df = DataFrame::new(4);
        df.insert("count", array![3u32, 1, 4, 1]).unwrap();
        df.insert("score", array![0.5f64, 1.5, -2.0, 0.0]).unwrap();
        let cell_type: CategoricalArray = ["B", "T", "T", "NK"].into_iter().collect();
        df.insert("cell_type", cell_type).unwrap();
        df.set_index(["c1", "c2", "c3", "c2"].into_iter().collect())
            .unwrap();
        df
    }

    #[test]
    fn insert_checks_length() {
        let mut df = frame();
        let err = df.insert("short", array![1i8, 2]).unwrap_err();
        match AnnDataError::of(&err) {
            Some(AnnDataError::AxisMismatch { expected, got, .. }) => {
                assert_eq!((*expected, *got), (4, 2))
            }
            _ => panic!("unexpected error: {}", err),
        }
        assert_eq!(df.width(), 3);

        df.insert("count", array![0u32, 0, 0, 0]).unwrap();
        assert_eq!(df.column_names(), vec!["count", "score", "cell_type"]);
        df.remove("count");
        assert_eq!(df.column_names(), vec!["score", "cell_type"]);
        assert!(df.set_index(DataFrameIndex::from(3)).is_err());
    }

    #[test]
    fn from_columns_uses_first_length() {
        let df = DataFrame::from_columns([
            ("a", Column::from(array![1i64, 2, 3])),
            ("b", Column::from(array![true, false, true])),
        ])
        .unwrap();
        assert_eq!(df.shape(), vec![3, 2].into());
        assert!(DataFrame::from_columns([
            ("a", Column::from(array![1i64, 2, 3])),
            ("b", Column::from(array![true])),
        ])
        .is_err());
    }

    #[test]
    fn write_read_select() {
        let df = frame();
        let store = InMemory::new("df").unwrap();
        let container: DataContainer<InMemory> = df.write(&store, "obs").unwrap();
        assert_eq!(DataFrame::read(&container).unwrap(), df);
        assert_eq!(DataFrame::get_shape(&container).unwrap(), vec![4, 3].into());

        let info: [SelectInfoElem; 2] = [vec![3, 1].into(), (1..).into()];
        let sub = DataFrame::read_select(&container, &info).unwrap();
        assert_eq!(sub, df.select(&info));
        assert_eq!(sub.index().clone().into_vec(), vec!["c2", "c2"]);
        assert_eq!(Indexable::get(&sub, &[0, 1]), Some(DynScalar::String("NK".into())));
    }

    #[test]
    fn column_named_like_the_index() {
        let mut df = DataFrame::new(2);
        df.insert("index", array!["x".to_string(), "y".to_string()])
            .unwrap();
        let store = InMemory::new("df").unwrap();
        let container: DataContainer<InMemory> = df.write(&store, "var").unwrap();
        assert_eq!(DataFrame::read(&container).unwrap(), df);
    }
}
