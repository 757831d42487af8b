use crate::backend::*;
use crate::data::{data_traits::*, Data};

use anyhow::{Context, Result};
use indexmap::IndexMap;

/// A nested dictionary of arbitrary data, e.g. the content of `uns`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping(IndexMap<String, Data>);

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>, D: Into<Data>>(&mut self, key: K, data: D) -> Option<Data> {
        self.0.insert(key.into(), data.into())
    }

    pub fn get(&self, key: &str) -> Option<&Data> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Data)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> IndexMap<String, Data> {
        self.0
    }
}

impl<K: Into<String>, D: Into<Data>> FromIterator<(K, D)> for Mapping {
    fn from_iter<T: IntoIterator<Item = (K, D)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Element for Mapping {
    fn data_type(&self) -> DataType {
        DataType::Mapping
    }

    fn metadata(&self) -> MetaData {
        MAPPING_ENCODING
    }
}

impl Writable for Mapping {
    fn write<B: Backend, G: GroupOp<B>>(
        &self,
        location: &G,
        name: &str,
    ) -> Result<DataContainer<B>> {
        let mut group = location.new_group(name)?;
        self.metadata().save::<B, _>(&mut group)?;
        for (k, v) in self.0.iter() {
            check_name(k)?;
            v.write(&group, k)
                .with_context(|| format!("cannot write '{}' of mapping '{}'", k, name))?;
        }
        Ok(DataContainer::Group(group))
    }
}

impl Readable for Mapping {
    fn read<B: Backend>(container: &DataContainer<B>) -> Result<Self> {
        let data = iter_containers::<B>(container.as_group()?)?
            .into_iter()
            .map(|(k, v)| Ok((k, Data::read(&v)?)))
            .collect::<Result<IndexMap<_, _>>>()?;
        Ok(Self(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemory;
    use crate::data::DynScalar;
    use ndarray::array;

    #[test]
    fn nested_mapping() {
        let inner: Mapping = [
            ("resolution", Data::from(0.8f64)),
            ("method", Data::from("leiden".to_string())),
        ]
        .into_iter()
        .collect();
        let mut outer = Mapping::new();
        outer.insert("params", inner);
        outer.insert("counts", array![1u32, 5, 9]);

        let store = InMemory::new("uns").unwrap();
        let container: DataContainer<InMemory> = outer.write(&store, "uns").unwrap();
        let back = Mapping::read(&container).unwrap();
        assert_eq!(back, outer);
        match back.get("params") {
            Some(Data::Mapping(m)) => {
                assert_eq!(m.get("resolution"), Some(&Data::Scalar(DynScalar::F64(0.8))))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
