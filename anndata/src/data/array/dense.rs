mod dynamic;

pub use dynamic::DynArray;

use crate::{
    backend::*,
    data::{
        array::utils::read_i64_vec,
        data_traits::*,
        scalar::DynScalar,
        slice::{SelectInfoBounds, SelectInfoElem, SelectInfoElemBounds, Shape},
    },
    error::AnnDataError,
};

use anyhow::{bail, Result};
use ndarray::{Array, Array1, ArrayView, Axis, Dimension, RemoveAxis};
use std::collections::HashMap;

impl<'a, T: BackendData, D: Dimension> Element for ArrayView<'a, T, D> {
    fn data_type(&self) -> DataType {
        DataType::Array(T::DTYPE)
    }

    fn metadata(&self) -> MetaData {
        let encoding_type = if T::DTYPE == ScalarType::String {
            "string-array"
        } else {
            "array"
        };
        MetaData::new(encoding_type, "0.2.0", None)
    }
}

impl<'a, T: BackendData, D: Dimension> Writable for ArrayView<'a, T, D> {
    fn write<B: Backend, G: GroupOp<B>>(
        &self,
        location: &G,
        name: &str,
    ) -> Result<DataContainer<B>> {
        let dataset = location.new_array_dataset(name, self.view().into(), Default::default())?;
        let mut container = DataContainer::<B>::Dataset(dataset);
        self.metadata().save(&mut container)?;
        Ok(container)
    }
}

impl<T: BackendData, D: Dimension> Element for Array<T, D> {
    fn data_type(&self) -> DataType {
        DataType::Array(T::DTYPE)
    }

    fn metadata(&self) -> MetaData {
        self.view().metadata()
    }
}

impl<T: BackendData, D: Dimension> Writable for Array<T, D> {
    fn write<B: Backend, G: GroupOp<B>>(
        &self,
        location: &G,
        name: &str,
    ) -> Result<DataContainer<B>> {
        self.view().write(location, name)
    }
}

impl<T: BackendData, D: Dimension> Readable for Array<T, D> {
    fn read<B: Backend>(container: &DataContainer<B>) -> Result<Self> {
        container.as_dataset()?.read_array()
    }
}

impl<T, D: Dimension> HasShape for Array<T, D> {
    fn shape(&self) -> Shape {
        self.shape().to_vec().into()
    }
}

impl<'a, T, D: Dimension> HasShape for ArrayView<'a, T, D> {
    fn shape(&self) -> Shape {
        self.shape().to_vec().into()
    }
}

impl<T: BackendData, D: Dimension> Indexable for Array<T, D> {
    fn get(&self, index: &[usize]) -> Option<DynScalar> {
        self.view().into_dyn().get(index).map(|x| x.into_dyn())
    }
}

impl<T: Clone, D: RemoveAxis> Selectable for Array<T, D> {
    fn select<S>(&self, info: &[S]) -> Self
    where
        S: AsRef<SelectInfoElem>,
    {
        let mut result = self.clone();
        info.iter()
            .zip(self.shape())
            .enumerate()
            .for_each(|(axis, (select, &n))| {
                if !select.as_ref().is_full() {
                    let idx = SelectInfoElemBounds::new(select.as_ref(), n).to_vec();
                    result = result.select(Axis(axis), idx.as_slice());
                }
            });
        result
    }
}

impl<T: BackendData, D: Dimension> ReadableArray for Array<T, D> {
    fn get_shape<B: Backend>(container: &DataContainer<B>) -> Result<Shape> {
        Ok(container.as_dataset()?.shape())
    }

    fn read_select<B, S>(container: &DataContainer<B>, info: &[S]) -> Result<Self>
    where
        B: Backend,
        S: AsRef<SelectInfoElem>,
    {
        let dataset = container.as_dataset()?;
        SelectInfoBounds::new(info, &dataset.shape())?;
        dataset.read_array_slice(info)
    }
}

impl<T: BackendData, D: Dimension> WritableArray for Array<T, D> {}
impl<T: BackendData, D: Dimension> WritableArray for &Array<T, D> {}
impl<'a, T: BackendData, D: Dimension> WritableArray for ArrayView<'a, T, D> {}

/// CategoricalArrays store discrete values.
/// These arrays encode the values as small width integers (codes), which map to
/// the original label set (categories). Each entry in the codes array is the
/// zero-based index of the encoded value in the categories array, `None` marks
/// a missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalArray {
    codes: Array1<Option<u32>>,
    categories: Array1<String>,
}

impl CategoricalArray {
    pub fn new(codes: Array1<Option<u32>>, categories: Array1<String>) -> Result<Self> {
        if let Some(c) = codes.iter().flatten().find(|&&c| c as usize >= categories.len()) {
            bail!(
                "categorical code {} out of range for {} categories",
                c,
                categories.len()
            );
        }
        Ok(Self { codes, categories })
    }

    pub fn codes(&self) -> &Array1<Option<u32>> {
        &self.codes
    }

    pub fn categories(&self) -> &Array1<String> {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Decoded labels, one per row.
    pub fn values(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.codes
            .iter()
            .map(|c| c.map(|c| self.categories[c as usize].as_str()))
    }
}

impl<'a> FromIterator<Option<&'a str>> for CategoricalArray {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Option<&'a str>>,
    {
        let mut str_to_id = HashMap::new();
        let mut categories = Vec::new();
        let codes: Array1<Option<u32>> = iter
            .into_iter()
            .map(|x| {
                let s = x?;
                let idx = *str_to_id.entry(s.to_string()).or_insert_with(|| {
                    categories.push(s.to_string());
                    (categories.len() - 1) as u32
                });
                Some(idx)
            })
            .collect();
        CategoricalArray {
            codes,
            categories: categories.into(),
        }
    }
}

impl<'a> FromIterator<&'a str> for CategoricalArray {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        iter.into_iter().map(Some).collect()
    }
}

impl Element for CategoricalArray {
    fn data_type(&self) -> DataType {
        DataType::Categorical
    }

    fn metadata(&self) -> MetaData {
        let mut metadata = HashMap::new();
        metadata.insert("ordered".to_string(), false.into());
        MetaData::new("categorical", "0.2.0", Some(metadata))
    }
}

impl Writable for CategoricalArray {
    fn write<B: Backend, G: GroupOp<B>>(
        &self,
        location: &G,
        name: &str,
    ) -> Result<DataContainer<B>> {
        let mut group = location.new_group(name)?;
        self.metadata().save::<B, _>(&mut group)?;

        group.new_array_dataset(
            "codes",
            self.codes.map(|x| x.map_or(-1, |x| x as i64)).into(),
            Default::default(),
        )?;
        group.new_array_dataset(
            "categories",
            self.categories.view().into(),
            Default::default(),
        )?;

        Ok(DataContainer::Group(group))
    }
}

impl HasShape for CategoricalArray {
    fn shape(&self) -> Shape {
        self.codes.len().into()
    }
}

impl Indexable for CategoricalArray {
    fn get(&self, index: &[usize]) -> Option<DynScalar> {
        let code = (*self.codes.get(index.first().copied()?)?)?;
        Some(self.categories[code as usize].clone().into())
    }
}

impl Selectable for CategoricalArray {
    fn select<S>(&self, info: &[S]) -> Self
    where
        S: AsRef<SelectInfoElem>,
    {
        CategoricalArray {
            codes: Selectable::select(&self.codes, info),
            categories: self.categories.clone(),
        }
    }
}

fn decode_codes(codes: Vec<i64>, n_categories: usize) -> Result<Array1<Option<u32>>> {
    codes
        .into_iter()
        .map(|x| {
            if x < 0 {
                Ok(None)
            } else if (x as usize) < n_categories {
                Ok(Some(x as u32))
            } else {
                bail!(AnnDataError::corrupt(format!(
                    "categorical code {} out of range for {} categories",
                    x, n_categories
                )))
            }
        })
        .collect()
}

impl Readable for CategoricalArray {
    fn read<B: Backend>(container: &DataContainer<B>) -> Result<Self> {
        let group = container.as_group()?;
        let categories: Array1<String> = group.open_dataset("categories")?.read_array()?;
        let codes = read_codes::<B>(&group.open_dataset("codes")?, None)?;
        Ok(CategoricalArray {
            codes: decode_codes(codes, categories.len())?,
            categories,
        })
    }
}

fn read_codes<B: Backend>(
    dataset: &B::Dataset,
    select: Option<&SelectInfoElem>,
) -> Result<Vec<i64>> {
    let codes = read_i64_vec::<B>(dataset)?;
    Ok(match select {
        None => codes,
        Some(s) => SelectInfoElemBounds::new(s, codes.len())
            .to_vec()
            .into_iter()
            .map(|i| codes[i])
            .collect(),
    })
}

impl ReadableArray for CategoricalArray {
    fn get_shape<B: Backend>(container: &DataContainer<B>) -> Result<Shape> {
        let group = container.as_group()?;
        Ok(group.open_dataset("codes")?.shape())
    }

    fn read_select<B, S>(container: &DataContainer<B>, info: &[S]) -> Result<Self>
    where
        B: Backend,
        S: AsRef<SelectInfoElem>,
    {
        let group = container.as_group()?;
        let codes_ds = group.open_dataset("codes")?;
        SelectInfoBounds::new(info, &codes_ds.shape())?;
        let categories: Array1<String> = group.open_dataset("categories")?.read_array()?;
        let codes = read_codes::<B>(&codes_ds, info.first().map(|s| s.as_ref()))?;
        Ok(CategoricalArray {
            codes: decode_codes(codes, categories.len())?,
            categories,
        })
    }
}

impl WritableArray for CategoricalArray {}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn dense_select() {
        let arr: Array2<i32> = array![[1, 2, 3], [4, 5, 6], [7, 8, 9]];
        let select: [SelectInfoElem; 2] = [vec![2, 0, 2].into(), (1..3).into()];
        assert_eq!(
            Selectable::select(&arr, &select),
            array![[8, 9], [2, 3], [8, 9]]
        );

        let rows = arr.select_axis(0, SelectInfoElem::from(1..2));
        assert_eq!(rows, array![[4, 5, 6]]);
    }

    #[test]
    fn categorical_from_labels() {
        let cat: CategoricalArray = ["b", "a", "b", "c"].into_iter().collect();
        assert_eq!(cat.categories(), &array!["b".to_string(), "a".into(), "c".into()]);
        assert_eq!(cat.codes(), &array![Some(0), Some(1), Some(0), Some(2)]);
        assert_eq!(cat.get(&[3]), Some(DynScalar::String("c".into())));
        assert_eq!(
            cat.values().collect::<Vec<_>>(),
            vec![Some("b"), Some("a"), Some("b"), Some("c")]
        );

        let sub = cat.select(&[SelectInfoElem::from(vec![3, 3])]);
        assert_eq!(sub.values().collect::<Vec<_>>(), vec![Some("c"), Some("c")]);

        assert!(CategoricalArray::new(array![Some(3)], array!["x".to_string()]).is_err());
    }
}
