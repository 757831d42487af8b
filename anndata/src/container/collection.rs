use crate::{
    backend::{check_name, iter_containers, Backend, DataContainer, GroupOp},
    container::base::*,
    data::*,
    error::AnnDataError,
};

use anyhow::{bail, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::{
    fmt::Display,
    ops::{Deref, DerefMut},
    sync::Arc,
};

/// The length of an axis, shared by every element aligned to it. An unset
/// dimension is fixed by the first element written along it.
#[derive(Debug, Clone)]
pub struct Dim {
    name: &'static str,
    size: Arc<Mutex<Option<usize>>>,
}

impl Display for Dim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self.size.lock() {
            Some(n) => write!(f, "{}", n),
            None => write!(f, "?"),
        }
    }
}

impl Dim {
    pub fn empty(name: &'static str) -> Self {
        Self {
            name,
            size: Arc::new(Mutex::new(None)),
        }
    }

    pub fn new(name: &'static str, n: usize) -> Self {
        Self {
            name,
            size: Arc::new(Mutex::new(Some(n))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_empty(&self) -> bool {
        self.size.lock().is_none()
    }

    /// The length of the axis, 0 if it has not been fixed yet.
    pub fn get(&self) -> usize {
        self.size.lock().unwrap_or(0)
    }

    pub fn size(&self) -> Option<usize> {
        *self.size.lock()
    }

    /// Fail with `AxisMismatch` if the axis is fixed to a different length.
    pub fn check(&self, n: usize) -> Result<()> {
        match *self.size.lock() {
            Some(m) if m != n => bail!(AnnDataError::axis_mismatch(self.name, m, n)),
            _ => Ok(()),
        }
    }

    /// Fix the axis to `n` if it is unset, otherwise check it.
    pub fn try_set(&self, n: usize) -> Result<()> {
        let mut size = self.size.lock();
        match *size {
            None => {
                *size = Some(n);
                Ok(())
            }
            Some(m) if m != n => bail!(AnnDataError::axis_mismatch(self.name, m, n)),
            Some(_) => Ok(()),
        }
    }
}

/// How the arrays of a collection are aligned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Axis {
    /// First dimension follows one axis (obsm, varm).
    Row,
    /// First two dimensions both follow one axis (obsp, varp).
    Pairwise,
    /// First dimension follows obs and the second follows var (layers).
    RowColumn,
}

pub struct InnerAxisArrays<B: Backend> {
    pub axis: Axis,
    pub(crate) container: B::Group,
    dim1: Dim,
    dim2: Option<Dim>,
    data: IndexMap<String, ArrayElem<B>>,
}

impl<B: Backend> std::fmt::Debug for InnerAxisArrays<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl<B: Backend> Deref for InnerAxisArrays<B> {
    type Target = IndexMap<String, ArrayElem<B>>;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<B: Backend> std::fmt::Display for InnerAxisArrays<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ty = match self.axis {
            Axis::Row => "row",
            Axis::Pairwise => "pairwise",
            Axis::RowColumn => "row/column",
        };
        let keys = self
            .keys()
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "AxisArrays ({}) with keys: {}", ty, keys)
    }
}

impl<B: Backend> InnerAxisArrays<B> {
    fn second_dim(&self) -> &Dim {
        self.dim2.as_ref().unwrap_or(&self.dim1)
    }

    /// Check a shape against the axes without changing them.
    fn check_shape(&self, shape: &Shape) -> Result<()> {
        let min_ndim = if self.axis == Axis::Row { 1 } else { 2 };
        if shape.ndim() < min_ndim {
            bail!(
                "arrays in this collection need at least {} dimension(s), got shape {}",
                min_ndim,
                shape
            );
        }
        self.dim1.check(shape[0])?;
        match self.axis {
            Axis::Row => Ok(()),
            Axis::Pairwise => {
                if shape[0] != shape[1] {
                    bail!(AnnDataError::axis_mismatch("pairwise", shape[0], shape[1]));
                }
                Ok(())
            }
            Axis::RowColumn => self.second_dim().check(shape[1]),
        }
    }

    fn fix_shape(&self, shape: &Shape) -> Result<()> {
        self.dim1.try_set(shape[0])?;
        if self.axis != Axis::Row {
            self.second_dim().try_set(shape[1])?;
        }
        Ok(())
    }

    /// Add or replace an array. Nothing is written if the array is not
    /// aligned with the axes.
    pub fn add<D: Into<ArrayData>>(&mut self, key: &str, data: D) -> Result<()> {
        check_name(key)?;
        let data = data.into();
        let shape = data.shape();
        self.check_shape(&shape)?;
        match self.data.get(key) {
            None => {
                let container = data.write(&self.container, key)?;
                self.data.insert(key.to_string(), container.try_into()?);
            }
            Some(elem) => elem.inner()?.save(data)?,
        }
        self.fix_shape(&shape)
    }

    pub fn remove(&mut self, key: &str) -> Result<()> {
        self.data.shift_remove(key).map(|x| x.clear()).transpose()?;
        Ok(())
    }

    pub fn export<O: Backend, G: GroupOp<O>>(&self, location: &G, name: &str) -> Result<()> {
        let group = location.new_group(name)?;
        for (key, val) in self.iter() {
            val.inner()?.export::<O, _>(&group, key)?;
        }
        Ok(())
    }

    /// Export a subset of the arrays. `cols` is only used by row/column
    /// collections, pairwise collections apply `rows` to both dimensions.
    pub fn export_select<O, G>(
        &self,
        rows: &SelectInfoElem,
        cols: &SelectInfoElem,
        location: &G,
        name: &str,
    ) -> Result<()>
    where
        O: Backend,
        G: GroupOp<O>,
    {
        let second = match self.axis {
            Axis::Row => None,
            Axis::Pairwise => Some(rows),
            Axis::RowColumn => Some(cols),
        };
        if rows.is_full() && second.map_or(true, |x| x.is_full()) {
            return self.export::<O, _>(location, name);
        }
        let group = location.new_group(name)?;
        for (key, val) in self.iter() {
            let mut elem = val.inner()?;
            let full = SelectInfoElem::full();
            let mut selection = rows.set_axis(0, elem.shape().ndim(), &full);
            if let Some(s) = second {
                selection[1] = s.clone();
            }
            elem.export_select::<O, _, _>(selection.as_slice(), &group, key)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct AxisArrays<B: Backend>(Slot<InnerAxisArrays<B>>);

impl<B: Backend> std::fmt::Display for AxisArrays<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<B: Backend> Clone for AxisArrays<B> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<B: Backend> Deref for AxisArrays<B> {
    type Target = Slot<InnerAxisArrays<B>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<B: Backend> DerefMut for AxisArrays<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<B: Backend> AxisArrays<B> {
    pub fn empty() -> Self {
        Self(Slot::empty())
    }

    /// Bind a collection to `group`. Arrays already in the group are checked
    /// against the axes, fixing any axis that is still unset.
    pub fn new(group: B::Group, axis: Axis, dim1: Dim, dim2: Option<Dim>) -> Result<Self> {
        let data = iter_containers::<B>(&group)?
            .into_iter()
            .map(|(k, v)| Ok((k, ArrayElem::try_from(v)?)))
            .collect::<Result<IndexMap<_, _>>>()?;
        let arrays = InnerAxisArrays {
            axis,
            container: group,
            dim1,
            dim2,
            data,
        };
        for elem in arrays.values() {
            let shape = elem.inner()?.shape().clone();
            arrays.check_shape(&shape)?;
            arrays.fix_shape(&shape)?;
        }
        Ok(Self(Slot::new(arrays)))
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .as_ref()
            .map_or(Vec::new(), |x| x.keys().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.lock().as_ref().map_or(0, |x| x.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A handle to one of the arrays, without reading it.
    pub fn get(&self, key: &str) -> Option<ArrayElem<B>> {
        self.lock().as_ref().and_then(|x| x.get(key).cloned())
    }

    /// Read one of the arrays.
    pub fn get_item(&self, key: &str) -> Result<Option<ArrayData>> {
        match self.get(key) {
            None => Ok(None),
            Some(elem) => elem.inner()?.data().map(Some),
        }
    }

    pub fn add<D: Into<ArrayData>>(&self, key: &str, data: D) -> Result<()> {
        self.inner()?.add(key, data)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        match self.lock().as_mut() {
            None => Ok(()),
            Some(x) => x.remove(key),
        }
    }

    /// Delete the whole collection from the store.
    pub fn clear(&self) -> Result<()> {
        if let Some(x) = self.0.extract() {
            DataContainer::<B>::Group(x.container).delete()?;
        }
        Ok(())
    }
}

pub struct InnerElemCollection<B: Backend> {
    container: B::Group,
    data: IndexMap<String, Elem<B>>,
}

impl<B: Backend> std::fmt::Debug for InnerElemCollection<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl<B: Backend> Deref for InnerElemCollection<B> {
    type Target = IndexMap<String, Elem<B>>;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<B: Backend> std::fmt::Display for InnerElemCollection<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self
            .keys()
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "Dict with keys: {}", keys)
    }
}

impl<B: Backend> InnerElemCollection<B> {
    pub fn add<D: Into<Data>>(&mut self, key: &str, data: D) -> Result<()> {
        check_name(key)?;
        let data = data.into();
        match self.data.get(key) {
            None => {
                let container = data.write(&self.container, key)?;
                self.data.insert(key.to_string(), container.try_into()?);
            }
            Some(elem) => elem.inner()?.save(data)?,
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<()> {
        self.data.shift_remove(key).map(|x| x.clear()).transpose()?;
        Ok(())
    }

    pub fn export<O: Backend, G: GroupOp<O>>(&self, location: &G, name: &str) -> Result<()> {
        let group = location.new_group(name)?;
        for (key, val) in self.iter() {
            val.inner()?.export::<O, _>(&group, key)?;
        }
        Ok(())
    }
}

/// Unstructured data, one lazily read element per key.
#[derive(Debug)]
pub struct ElemCollection<B: Backend>(Slot<InnerElemCollection<B>>);

impl<B: Backend> Clone for ElemCollection<B> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<B: Backend> Deref for ElemCollection<B> {
    type Target = Slot<InnerElemCollection<B>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<B: Backend> Display for ElemCollection<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<B: Backend> ElemCollection<B> {
    pub fn empty() -> Self {
        Self(Slot::empty())
    }

    pub fn new(container: B::Group) -> Result<Self> {
        let data = iter_containers::<B>(&container)?
            .into_iter()
            .map(|(k, v)| Ok((k, Elem::try_from(v)?)))
            .collect::<Result<IndexMap<_, _>>>()?;
        let collection = InnerElemCollection { container, data };
        Ok(Self(Slot::new(collection)))
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .as_ref()
            .map_or(Vec::new(), |x| x.keys().cloned().collect())
    }

    pub fn get_item(&self, key: &str) -> Result<Option<Data>> {
        let elem = self.lock().as_ref().and_then(|x| x.get(key).cloned());
        match elem {
            None => Ok(None),
            Some(elem) => elem.inner()?.data().map(Some),
        }
    }

    pub fn add<D: Into<Data>>(&self, key: &str, data: D) -> Result<()> {
        self.inner()?.add(key, data)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        match self.lock().as_mut() {
            None => Ok(()),
            Some(x) => x.remove(key),
        }
    }

    pub fn clear(&self) -> Result<()> {
        if let Some(x) = self.0.extract() {
            DataContainer::<B>::Group(x.container).delete()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemory;
    use crate::backend::StoreOp;
    use ndarray::{Array2, Array3};

    fn mismatch(err: &anyhow::Error) -> Option<(usize, usize)> {
        match AnnDataError::of(err) {
            Some(AnnDataError::AxisMismatch { expected, got, .. }) => Some((*expected, *got)),
            _ => None,
        }
    }

    #[test]
    fn dim_is_fixed_once() {
        let dim = Dim::empty("obs");
        assert!(dim.is_empty());
        dim.check(3).unwrap();
        dim.try_set(3).unwrap();
        assert_eq!(dim.get(), 3);
        assert_eq!(mismatch(&dim.try_set(4).unwrap_err()), Some((3, 4)));
    }

    #[test]
    fn row_arrays_follow_their_axis() {
        let store = InMemory::new("axis").unwrap();
        let n_obs = Dim::empty("obs");
        let obsm =
            AxisArrays::<InMemory>::new(store.new_group("obsm").unwrap(), Axis::Row, n_obs.clone(), None)
                .unwrap();

        obsm.add("pca", Array2::<f32>::zeros((6, 2))).unwrap();
        assert_eq!(n_obs.get(), 6);
        obsm.add("tensor", Array3::<u8>::zeros((6, 2, 2))).unwrap();

        let err = obsm.add("bad", Array2::<f32>::zeros((5, 2))).unwrap_err();
        assert_eq!(mismatch(&err), Some((6, 5)));
        assert!(!store.open_group("obsm").unwrap().exists("bad").unwrap());
        assert_eq!(obsm.keys(), vec!["pca", "tensor"]);

        obsm.remove("pca").unwrap();
        assert_eq!(obsm.keys(), vec!["tensor"]);
        store.close().unwrap();
    }

    #[test]
    fn pairwise_and_layers() {
        let store = InMemory::new("axis").unwrap();
        let n_obs = Dim::new("obs", 4);
        let n_vars = Dim::empty("var");

        let obsp = AxisArrays::<InMemory>::new(
            store.new_group("obsp").unwrap(),
            Axis::Pairwise,
            n_obs.clone(),
            None,
        )
        .unwrap();
        obsp.add("dist", Array2::<f64>::zeros((4, 4))).unwrap();
        assert_eq!(
            mismatch(&obsp.add("rect", Array2::<f64>::zeros((4, 3))).unwrap_err()),
            Some((4, 3))
        );

        let layers = AxisArrays::<InMemory>::new(
            store.new_group("layers").unwrap(),
            Axis::RowColumn,
            n_obs.clone(),
            Some(n_vars.clone()),
        )
        .unwrap();
        layers.add("counts", Array2::<u32>::zeros((4, 7))).unwrap();
        assert_eq!(n_vars.get(), 7);
        assert!(layers.add("wrong", Array2::<u32>::zeros((4, 6))).is_err());

        let reopened = AxisArrays::<InMemory>::new(
            store.open_group("layers").unwrap(),
            Axis::RowColumn,
            Dim::empty("obs"),
            Some(Dim::empty("var")),
        )
        .unwrap();
        assert_eq!(reopened.keys(), vec!["counts"]);
        assert_eq!(
            reopened.get_item("counts").unwrap(),
            Some(ArrayData::from(Array2::<u32>::zeros((4, 7))))
        );
    }

    #[test]
    fn export_rows() {
        let store = InMemory::new("src").unwrap();
        let target = InMemory::new("dst").unwrap();
        let obsm = AxisArrays::<InMemory>::new(
            store.new_group("obsm").unwrap(),
            Axis::Row,
            Dim::empty("obs"),
            None,
        )
        .unwrap();
        let arr = Array2::from_shape_fn((5, 2), |(i, j)| (i * 2 + j) as i32);
        obsm.add("x", arr.clone()).unwrap();

        obsm.inner()
            .unwrap()
            .export_select::<InMemory, _>(
                &SelectInfoElem::from(vec![3usize, 1]),
                &SelectInfoElem::full(),
                &target,
                "obsm",
            )
            .unwrap();
        let exported = AxisArrays::<InMemory>::new(
            target.open_group("obsm").unwrap(),
            Axis::Row,
            Dim::empty("obs"),
            None,
        )
        .unwrap();
        assert_eq!(
            exported.get_item("x").unwrap(),
            Some(ArrayData::from(ndarray::array![[6, 7], [2, 3]]))
        );
    }

    #[test]
    fn uns_collection() {
        let store = InMemory::new("uns").unwrap();
        let uns = ElemCollection::<InMemory>::new(store.new_group("uns").unwrap()).unwrap();
        uns.add("name", "pbmc").unwrap();
        uns.add("size", 3u64).unwrap();
        uns.add("name", "pbmc3k").unwrap();
        assert_eq!(uns.keys(), vec!["name", "size"]);
        assert_eq!(uns.get_item("name").unwrap(), Some(Data::from("pbmc3k")));
        uns.remove("size").unwrap();
        assert_eq!(uns.get_item("size").unwrap(), None);
    }
}
