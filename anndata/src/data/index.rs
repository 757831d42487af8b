use crate::backend::*;
use crate::data::slice::{SelectInfoElem, SelectInfoElemBounds};
use crate::error::AnnDataError;

use anyhow::{bail, Result};
use ndarray::Array1;
use std::ops::Range;

#[derive(Debug, Clone)]
enum Index {
    List(Vec<String>),
    /// Row positions `start..end` rendered as decimal strings.
    Range(Range<usize>),
}

/// Row identifiers of a data frame. Names need not be unique, order and
/// duplicates are kept.
#[derive(Debug, Clone)]
pub struct DataFrameIndex {
    pub index_name: String,
    index: Index,
}

impl PartialEq for DataFrameIndex {
    fn eq(&self, other: &Self) -> bool {
        match (&self.index, &other.index) {
            (Index::Range(a), Index::Range(b)) => a.len() == b.len() && (a.is_empty() || a == b),
            _ => self.len() == other.len() && self.iter().eq(other.iter()),
        }
    }
}

impl DataFrameIndex {
    pub fn empty() -> Self {
        Self::from(0)
    }

    pub fn len(&self) -> usize {
        match &self.index {
            Index::List(names) => names.len(),
            Index::Range(range) => range.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = String> + '_> {
        match &self.index {
            Index::List(names) => Box::new(names.iter().cloned()),
            Index::Range(range) => Box::new(range.clone().map(|x| x.to_string())),
        }
    }

    /// Position of the first row named `k`.
    pub fn get_index(&self, k: &str) -> Option<usize> {
        match &self.index {
            Index::List(names) => names.iter().position(|x| x == k),
            Index::Range(range) => k
                .parse::<usize>()
                .ok()
                .filter(|x| range.contains(x))
                .map(|x| x - range.start),
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        match self.index {
            Index::List(names) => names,
            Index::Range(range) => range.map(|x| x.to_string()).collect(),
        }
    }

    pub fn select(&self, select: &SelectInfoElem) -> Self {
        let bounds = SelectInfoElemBounds::new(select, self.len());
        let index = match (&self.index, bounds.as_range()) {
            (Index::Range(range), Some(sub)) => Index::Range(range.start + sub.start..range.start + sub.end),
            (Index::Range(range), None) => Index::List(
                bounds
                    .to_vec()
                    .into_iter()
                    .map(|i| (range.start + i).to_string())
                    .collect(),
            ),
            (Index::List(names), _) => {
                Index::List(bounds.to_vec().into_iter().map(|i| names[i].clone()).collect())
            }
        };
        Self {
            index_name: self.index_name.clone(),
            index,
        }
    }

    /// Write the names as a string dataset inside `group`.
    pub(crate) fn write_into<B: Backend>(&self, group: &B::Group, name: &str) -> Result<()> {
        let names: Array1<String> = self.iter().collect();
        let mut dataset = group.new_array_dataset(name, names.into(), Default::default())?;
        dataset.new_attr("encoding-type", "string-array")?;
        dataset.new_attr("encoding-version", "0.2.0")?;
        match &self.index {
            Index::List(_) => dataset.new_attr("index_type", "list")?,
            Index::Range(range) => {
                dataset.new_attr("index_type", "range")?;
                dataset.new_attr("start", range.start)?;
                dataset.new_attr("end", range.end)?;
            }
        }
        Ok(())
    }

    pub(crate) fn read_from<B: Backend>(group: &B::Group, name: &str) -> Result<Self> {
        let dataset = group.open_dataset(name)?;
        let index_type = dataset
            .get_attr::<String>("index_type")
            .unwrap_or_else(|_| "list".to_string());
        let index = match index_type.as_str() {
            "range" => {
                let start: usize = dataset.get_attr("start")?;
                let end: usize = dataset.get_attr("end")?;
                if end < start || dataset.shape().into_vec() != vec![end - start] {
                    bail!(AnnDataError::corrupt(format!(
                        "range index {}..{} does not match its dataset of shape {}",
                        start,
                        end,
                        dataset.shape()
                    )));
                }
                Index::Range(start..end)
            }
            "list" => Index::List(dataset.read_array::<String, ndarray::Ix1>()?.to_vec()),
            x => bail!(AnnDataError::corrupt(format!("unknown index type '{}'", x))),
        };
        Ok(Self {
            index_name: name.to_string(),
            index,
        })
    }

    pub(crate) fn read_len<B: Backend>(group: &B::Group, name: &str) -> Result<usize> {
        let shape = group.open_dataset(name)?.shape();
        if shape.ndim() != 1 {
            bail!(AnnDataError::corrupt(format!(
                "index '{}' has shape {}",
                name, shape
            )));
        }
        Ok(shape[0])
    }
}

impl From<usize> for DataFrameIndex {
    fn from(n: usize) -> Self {
        (0..n).into()
    }
}

impl From<Range<usize>> for DataFrameIndex {
    fn from(range: Range<usize>) -> Self {
        Self {
            index_name: "index".to_string(),
            index: Index::Range(range),
        }
    }
}

impl From<Vec<String>> for DataFrameIndex {
    fn from(names: Vec<String>) -> Self {
        Self {
            index_name: "index".to_string(),
            index: Index::List(names),
        }
    }
}

impl FromIterator<String> for DataFrameIndex {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

impl<'a> FromIterator<&'a str> for DataFrameIndex {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        iter.into_iter().map(|x| x.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_and_list_compare_by_names() {
        let range = DataFrameIndex::from(3);
        let list: DataFrameIndex = ["0", "1", "2"].into_iter().collect();
        assert_eq!(range, list);
        assert_ne!(range, DataFrameIndex::from(1..4));
        assert_eq!(DataFrameIndex::from(2..2), DataFrameIndex::empty());
    }

    #[test]
    fn duplicates_are_kept() {
        let index: DataFrameIndex = ["a", "b", "a", "c"].into_iter().collect();
        assert_eq!(index.get_index("a"), Some(0));
        assert_eq!(index.get_index("c"), Some(3));
        assert_eq!(index.get_index("z"), None);

        let sub = index.select(&vec![2, 0, 0].into());
        assert_eq!(sub.into_vec(), vec!["a", "a", "a"]);
    }

    #[test]
    fn select_on_range() {
        let index = DataFrameIndex::from(10);
        assert_eq!(index.get_index("7"), Some(7));
        assert_eq!(index.get_index("10"), None);
        let sub = index.select(&(4..6).into());
        assert_eq!(sub.get_index("5"), Some(1));
        assert_eq!(sub.into_vec(), vec!["4", "5"]);
        let sub = index.select(&vec![9, 1].into());
        assert_eq!(sub.into_vec(), vec!["9", "1"]);
    }
}
