mod builder;

pub use builder::AnnDataBuilder;

use crate::{
    backend::{Backend, DataContainer, GroupOp, StoreOp},
    container::{
        ArrayElem, Axis, AxisArrays, DataFrameElem, Dim, ElemCollection, InnerDataFrameElem, Slot,
    },
    data::*,
    error::AnnDataError,
    traits::AnnDataOp,
};

use anyhow::{anyhow, bail, Context, Result};
use itertools::Itertools;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// An annotated matrix bound to a store. Every accepted change is written to
/// the store before the call returns.
pub struct AnnData<B: Backend> {
    file: B::Store,
    // Shared with the axis-aligned collections, which validate against them.
    pub(crate) n_obs: Dim,
    pub(crate) n_vars: Dim,
    x: ArrayElem<B>,
    obs: DataFrameElem<B>,
    obsm: AxisArrays<B>,
    obsp: AxisArrays<B>,
    var: DataFrameElem<B>,
    varm: AxisArrays<B>,
    varp: AxisArrays<B>,
    uns: ElemCollection<B>,
    layers: AxisArrays<B>,
}

impl<B: Backend> std::fmt::Debug for AnnData<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl<B: Backend> std::fmt::Display for AnnData<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AnnData object with n_obs x n_vars = {} x {} backed at '{}'",
            self.n_obs(),
            self.n_vars(),
            self.filename().display(),
        )?;
        let obs = self.obs.column_names();
        if !obs.is_empty() {
            write!(f, "\n    obs: '{}'", obs.into_iter().join("', '"))?;
        }
        let var = self.var.column_names();
        if !var.is_empty() {
            write!(f, "\n    var: '{}'", var.into_iter().join("', '"))?;
        }
        for (name, keys) in [
            ("uns", self.uns.keys()),
            ("obsm", self.obsm.keys()),
            ("obsp", self.obsp.keys()),
            ("varm", self.varm.keys()),
            ("varp", self.varp.keys()),
            ("layers", self.layers.keys()),
        ] {
            if !keys.is_empty() {
                write!(f, "\n    {}: '{}'", name, keys.into_iter().join("', '"))?;
            }
        }
        Ok(())
    }
}

fn new_obsm<B: Backend>(group: B::Group, n_obs: &Dim) -> Result<AxisArrays<B>> {
    AxisArrays::new(group, Axis::Row, n_obs.clone(), None)
}

fn new_obsp<B: Backend>(group: B::Group, n_obs: &Dim) -> Result<AxisArrays<B>> {
    AxisArrays::new(group, Axis::Pairwise, n_obs.clone(), None)
}

fn new_varm<B: Backend>(group: B::Group, n_vars: &Dim) -> Result<AxisArrays<B>> {
    AxisArrays::new(group, Axis::Row, n_vars.clone(), None)
}

fn new_varp<B: Backend>(group: B::Group, n_vars: &Dim) -> Result<AxisArrays<B>> {
    AxisArrays::new(group, Axis::Pairwise, n_vars.clone(), None)
}

fn new_layers<B: Backend>(group: B::Group, n_obs: &Dim, n_vars: &Dim) -> Result<AxisArrays<B>> {
    AxisArrays::new(group, Axis::RowColumn, n_obs.clone(), Some(n_vars.clone()))
}

/// Shapes that disagree while opening a store mean the store is damaged.
fn inconsistent(err: anyhow::Error) -> anyhow::Error {
    match AnnDataError::of(&err) {
        Some(AnnDataError::AxisMismatch { .. }) => {
            anyhow!(AnnDataError::corrupt(format!("inconsistent shapes: {}", err)))
        }
        _ => err,
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Open `name` in `file`, or create it when the store accepts writes.
fn open_or_new_group<B: Backend>(file: &B::Store, name: &str) -> Option<B::Group> {
    file.open_group(name).or_else(|_| file.new_group(name)).ok()
}

impl<B: Backend> AnnData<B> {
    pub fn get_x(&self) -> &ArrayElem<B> {
        &self.x
    }
    pub fn get_obs(&self) -> &DataFrameElem<B> {
        &self.obs
    }
    pub fn get_var(&self) -> &DataFrameElem<B> {
        &self.var
    }

    /// Open an existing store. Only shapes and metadata are read, element
    /// payloads are read when they are accessed.
    pub fn open(file: B::Store) -> Result<Self> {
        debug!("opening {} store at '{}'", B::NAME, file.filename().display());
        let n_obs = Dim::empty("obs");
        let n_vars = Dim::empty("var");

        // Read X
        let x = if file.exists("X")? {
            let x = ArrayElem::<B>::try_from(DataContainer::open(&file, "X")?)?;
            let shape = x.inner()?.shape().clone();
            if shape.ndim() != 2 {
                bail!(AnnDataError::corrupt(format!("X has shape {}", shape)));
            }
            n_obs.try_set(shape[0])?;
            n_vars.try_set(shape[1])?;
            x
        } else {
            Slot::empty()
        };

        // Read obs
        let obs = if file.exists("obs")? {
            let obs = DataFrameElem::<B>::try_from(DataContainer::open(&file, "obs")?)?;
            n_obs.try_set(obs.inner()?.height()).map_err(inconsistent)?;
            obs
        } else {
            Slot::empty()
        };

        // Read var
        let var = if file.exists("var")? {
            let var = DataFrameElem::<B>::try_from(DataContainer::open(&file, "var")?)?;
            n_vars.try_set(var.inner()?.height()).map_err(inconsistent)?;
            var
        } else {
            Slot::empty()
        };

        let obsm = match open_or_new_group::<B>(&file, "obsm") {
            Some(group) => new_obsm(group, &n_obs).map_err(inconsistent)?,
            None => AxisArrays::empty(),
        };
        let obsp = match open_or_new_group::<B>(&file, "obsp") {
            Some(group) => new_obsp(group, &n_obs).map_err(inconsistent)?,
            None => AxisArrays::empty(),
        };
        let varm = match open_or_new_group::<B>(&file, "varm") {
            Some(group) => new_varm(group, &n_vars).map_err(inconsistent)?,
            None => AxisArrays::empty(),
        };
        let varp = match open_or_new_group::<B>(&file, "varp") {
            Some(group) => new_varp(group, &n_vars).map_err(inconsistent)?,
            None => AxisArrays::empty(),
        };
        let uns = match open_or_new_group::<B>(&file, "uns") {
            Some(group) => ElemCollection::new(group)?,
            None => ElemCollection::empty(),
        };
        let layers = match open_or_new_group::<B>(&file, "layers") {
            Some(group) => new_layers(group, &n_obs, &n_vars).map_err(inconsistent)?,
            None => AxisArrays::empty(),
        };

        Ok(Self {
            file,
            n_obs,
            n_vars,
            x,
            obs,
            obsm,
            obsp,
            var,
            varm,
            varp,
            uns,
            layers,
        })
    }

    /// Create an empty AnnData in a new store. Both axes are unset.
    pub fn new<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let file = B::new(filename)?;
        debug!("created {} store at '{}'", B::NAME, file.filename().display());
        let n_obs = Dim::empty("obs");
        let n_vars = Dim::empty("var");
        Ok(Self {
            x: Slot::empty(),
            obs: Slot::empty(),
            var: Slot::empty(),
            obsm: new_obsm(file.new_group("obsm")?, &n_obs)?,
            obsp: new_obsp(file.new_group("obsp")?, &n_obs)?,
            varm: new_varm(file.new_group("varm")?, &n_vars)?,
            varp: new_varp(file.new_group("varp")?, &n_vars)?,
            uns: ElemCollection::new(file.new_group("uns")?)?,
            layers: new_layers(file.new_group("layers")?, &n_obs, &n_vars)?,
            file,
            n_obs,
            n_vars,
        })
    }

    /// Whether the data outlives this process.
    pub fn is_backed(&self) -> bool {
        B::PERSISTENT
    }

    pub fn filename(&self) -> PathBuf {
        self.file.filename()
    }

    pub fn obsm(&self) -> &AxisArrays<B> {
        &self.obsm
    }
    pub fn obsp(&self) -> &AxisArrays<B> {
        &self.obsp
    }
    pub fn varm(&self) -> &AxisArrays<B> {
        &self.varm
    }
    pub fn varp(&self) -> &AxisArrays<B> {
        &self.varp
    }
    pub fn layers(&self) -> &AxisArrays<B> {
        &self.layers
    }
    pub fn uns(&self) -> &ElemCollection<B> {
        &self.uns
    }

    pub fn flush(&self) -> Result<()> {
        self.file.flush()
    }

    fn drop_slots(&self) {
        self.x.drop();
        self.obs.drop();
        self.var.drop();
        self.obsm.drop();
        self.obsp.drop();
        self.varm.drop();
        self.varp.drop();
        self.layers.drop();
        self.uns.drop();
    }

    /// Flush and release the store.
    pub fn close(self) -> Result<()> {
        self.drop_slots();
        self.file.close()
    }

    /// Remove the store and everything in it.
    pub(crate) fn discard(self) -> Result<()> {
        self.drop_slots();
        self.file.discard()
    }

    /// Copy everything into a new store at `filename` and return the copy.
    /// Elements go one at a time from this store to the new one. On failure
    /// the new store is removed and the error is returned.
    pub fn copy<O: Backend, P: AsRef<Path>>(&self, filename: P) -> Result<AnnData<O>> {
        let full = SelectInfoElem::full();
        self.copy_with::<O, _>(&full, &full, filename)
    }

    /// Copy the selected observations and variables into a new store.
    pub fn copy_select<O, S, P>(&self, selection: S, filename: P) -> Result<AnnData<O>>
    where
        O: Backend,
        S: AsRef<[SelectInfoElem]>,
        P: AsRef<Path>,
    {
        let slice = selection.as_ref();
        if slice.len() != 2 {
            bail!(
                "selection must have one entry per axis, got {}",
                slice.len()
            );
        }
        SelectInfoBounds::new(slice, &Shape::from(vec![self.n_obs(), self.n_vars()]))
            .context("invalid selection")?;
        self.copy_with::<O, _>(&slice[0], &slice[1], filename)
    }

    /// Copy everything into a new store and close it.
    pub fn write<O: Backend, P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        self.copy::<O, _>(filename)?.close()
    }

    pub fn write_select<O, S, P>(&self, selection: S, filename: P) -> Result<()>
    where
        O: Backend,
        S: AsRef<[SelectInfoElem]>,
        P: AsRef<Path>,
    {
        self.copy_select::<O, _, _>(selection, filename)?.close()
    }

    fn copy_with<O: Backend, P: AsRef<Path>>(
        &self,
        rows: &SelectInfoElem,
        cols: &SelectInfoElem,
        filename: P,
    ) -> Result<AnnData<O>> {
        let filename = filename.as_ref();
        if B::PERSISTENT && O::PERSISTENT && same_file(&self.filename(), filename) {
            bail!(AnnDataError::unavailable(
                filename,
                "the destination is the store being copied"
            ));
        }
        let file = O::new(filename)?;
        match self.export::<O>(&file, rows, cols).and_then(|_| file.flush()) {
            Ok(()) => {
                info!(
                    "copied AnnData from '{}' to '{}'",
                    self.filename().display(),
                    file.filename().display()
                );
                AnnData::open(file)
            }
            Err(e) => {
                let path = file.filename();
                if let Err(err) = file.discard() {
                    warn!("failed to remove incomplete copy at '{}': {}", path.display(), err);
                }
                Err(e)
            }
        }
    }

    fn export<O: Backend>(
        &self,
        file: &O::Store,
        rows: &SelectInfoElem,
        cols: &SelectInfoElem,
    ) -> Result<()> {
        if let Some(x) = self.x.lock().as_mut() {
            let full = SelectInfoElem::full();
            let mut slice = rows.set_axis(0, x.shape().ndim(), &full);
            slice[1] = cols.clone();
            x.export_select::<O, _, _>(slice.as_slice(), file, "X")
                .context("cannot copy 'X'")?;
        }
        if let Some(obs) = self.obs.lock().as_ref() {
            obs.export_select::<O, _>(rows, file, "obs")
                .context("cannot copy 'obs'")?;
        }
        if let Some(var) = self.var.lock().as_ref() {
            var.export_select::<O, _>(cols, file, "var")
                .context("cannot copy 'var'")?;
        }
        // varm and varp follow the columns.
        for (name, arrays, sel) in [
            ("obsm", &self.obsm, rows),
            ("obsp", &self.obsp, rows),
            ("varm", &self.varm, cols),
            ("varp", &self.varp, cols),
            ("layers", &self.layers, rows),
        ] {
            if let Some(x) = arrays.lock().as_ref() {
                x.export_select::<O, _>(sel, cols, file, name)
                    .with_context(|| format!("cannot copy '{}'", name))?;
            }
        }
        if let Some(uns) = self.uns.lock().as_ref() {
            uns.export::<O, _>(file, "uns").context("cannot copy 'uns'")?;
        }
        Ok(())
    }

    fn obs_elem(&self) -> Result<&DataFrameElem<B>> {
        if self.obs.is_empty() {
            let df = DataFrame::new(self.n_obs.get());
            self.obs.insert(InnerDataFrameElem::new(&self.file, "obs", &df)?);
        }
        Ok(&self.obs)
    }

    fn var_elem(&self) -> Result<&DataFrameElem<B>> {
        if self.var.is_empty() {
            let df = DataFrame::new(self.n_vars.get());
            self.var.insert(InnerDataFrameElem::new(&self.file, "var", &df)?);
        }
        Ok(&self.var)
    }

    /// Write an empty obs or var frame for every fixed axis that has none, so
    /// that the axis lengths survive without X.
    pub(crate) fn sync_axes(&self) -> Result<()> {
        if !self.n_obs.is_empty() {
            self.obs_elem()?;
        }
        if !self.n_vars.is_empty() {
            self.var_elem()?;
        }
        Ok(())
    }
}

impl<B: Backend> AnnDataOp for AnnData<B> {
    fn read_x<D>(&self) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>,
    {
        match self.x.lock().as_mut() {
            None => Ok(None),
            Some(x) => Ok(Some(x.data()?.try_into().map_err(Into::into)?)),
        }
    }

    fn read_x_slice<D, S>(&self, select: S) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        S: AsRef<[SelectInfoElem]>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>,
    {
        match self.x.lock().as_mut() {
            None => Ok(None),
            Some(x) => Ok(Some(
                x.select(select.as_ref())?.try_into().map_err(Into::into)?,
            )),
        }
    }

    fn set_x<D: Into<ArrayData>>(&self, data: D) -> Result<()> {
        let data = data.into();
        let shape = data.shape();
        if shape.ndim() != 2 {
            bail!("X must be a 2 dimensional array, got shape {}", shape);
        }
        self.n_obs.check(shape[0])?;
        self.n_vars.check(shape[1])?;

        if !self.x.is_empty() {
            self.x.inner()?.save(data)?;
        } else {
            let new_elem = ArrayElem::try_from(data.write(&self.file, "X")?)?;
            self.x.swap(&new_elem);
        }
        self.n_obs.try_set(shape[0])?;
        self.n_vars.try_set(shape[1])?;
        self.sync_axes()
    }

    fn del_x(&self) -> Result<()> {
        self.x.clear()
    }

    fn n_obs(&self) -> usize {
        self.n_obs.get()
    }
    fn n_vars(&self) -> usize {
        self.n_vars.get()
    }

    fn obs_names(&self) -> DataFrameIndex {
        self.obs
            .lock()
            .as_ref()
            .map_or(DataFrameIndex::from(self.n_obs()), |obs| obs.index().clone())
    }

    fn var_names(&self) -> DataFrameIndex {
        self.var
            .lock()
            .as_ref()
            .map_or(DataFrameIndex::from(self.n_vars()), |var| var.index().clone())
    }

    fn set_obs_names(&self, index: DataFrameIndex) -> Result<()> {
        self.n_obs.check(index.len())?;
        self.n_obs.try_set(index.len())?;
        self.obs_elem()?.inner()?.set_index(index)
    }

    fn set_var_names(&self, index: DataFrameIndex) -> Result<()> {
        self.n_vars.check(index.len())?;
        self.n_vars.try_set(index.len())?;
        self.var_elem()?.inner()?.set_index(index)
    }

    fn obs_ix<'a, I: IntoIterator<Item = &'a str>>(&self, names: I) -> Result<Vec<usize>> {
        let index = self.obs_names();
        names
            .into_iter()
            .map(|i| {
                index
                    .get_index(i)
                    .with_context(|| format!("'{}' does not exist in obs_names", i))
            })
            .collect()
    }

    fn var_ix<'a, I: IntoIterator<Item = &'a str>>(&self, names: I) -> Result<Vec<usize>> {
        let index = self.var_names();
        names
            .into_iter()
            .map(|i| {
                index
                    .get_index(i)
                    .with_context(|| format!("'{}' does not exist in var_names", i))
            })
            .collect()
    }

    fn read_obs(&self) -> Result<DataFrame> {
        self.obs
            .lock()
            .as_mut()
            .map_or(Ok(DataFrame::new(self.n_obs())), |x| x.data().map(Clone::clone))
    }
    fn read_var(&self) -> Result<DataFrame> {
        self.var
            .lock()
            .as_mut()
            .map_or(Ok(DataFrame::new(self.n_vars())), |x| x.data().map(Clone::clone))
    }

    fn set_obs(&self, obs: DataFrame) -> Result<()> {
        let nrows = obs.height();
        self.n_obs.check(nrows)?;
        if self.obs.is_empty() {
            self.obs.insert(InnerDataFrameElem::new(&self.file, "obs", &obs)?);
        } else {
            self.obs.inner()?.save(obs)?;
        }
        self.n_obs.try_set(nrows)
    }

    fn set_var(&self, var: DataFrame) -> Result<()> {
        let nrows = var.height();
        self.n_vars.check(nrows)?;
        if self.var.is_empty() {
            self.var.insert(InnerDataFrameElem::new(&self.file, "var", &var)?);
        } else {
            self.var.inner()?.save(var)?;
        }
        self.n_vars.try_set(nrows)
    }

    /// Remove every obs column and the names. The number of observations
    /// stays fixed.
    fn del_obs(&self) -> Result<()> {
        self.obs.clear()?;
        self.sync_axes()
    }

    fn del_var(&self) -> Result<()> {
        self.var.clear()?;
        self.sync_axes()
    }

    fn obs_keys(&self) -> Vec<String> {
        self.obs.column_names()
    }
    fn var_keys(&self) -> Vec<String> {
        self.var.column_names()
    }

    fn fetch_obs_column(&self, name: &str) -> Result<Option<Column>> {
        self.obs.column(name)
    }
    fn fetch_var_column(&self, name: &str) -> Result<Option<Column>> {
        self.var.column(name)
    }

    fn add_obs_column<C: Into<Column>>(&self, name: &str, column: C) -> Result<()> {
        let column = column.into();
        self.n_obs.check(column.len())?;
        self.n_obs.try_set(column.len())?;
        self.obs_elem()?.set_column(name, column)
    }
    fn add_var_column<C: Into<Column>>(&self, name: &str, column: C) -> Result<()> {
        let column = column.into();
        self.n_vars.check(column.len())?;
        self.n_vars.try_set(column.len())?;
        self.var_elem()?.set_column(name, column)
    }

    fn del_obs_column(&self, name: &str) -> Result<()> {
        if self.obs.is_empty() {
            return Ok(());
        }
        self.obs.remove_column(name)
    }
    fn del_var_column(&self, name: &str) -> Result<()> {
        if self.var.is_empty() {
            return Ok(());
        }
        self.var.remove_column(name)
    }

    fn uns_keys(&self) -> Vec<String> {
        self.uns.keys()
    }
    fn obsm_keys(&self) -> Vec<String> {
        self.obsm.keys()
    }
    fn obsp_keys(&self) -> Vec<String> {
        self.obsp.keys()
    }
    fn varm_keys(&self) -> Vec<String> {
        self.varm.keys()
    }
    fn varp_keys(&self) -> Vec<String> {
        self.varp.keys()
    }
    fn layers_keys(&self) -> Vec<String> {
        self.layers.keys()
    }

    fn fetch_uns<D>(&self, key: &str) -> Result<Option<D>>
    where
        D: TryFrom<Data>,
        <D as TryFrom<Data>>::Error: Into<anyhow::Error>,
    {
        self.uns
            .get_item(key)?
            .map(|x| x.try_into().map_err(Into::into))
            .transpose()
    }
    fn fetch_obsm<D>(&self, key: &str) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>,
    {
        fetch_array(&self.obsm, key)
    }
    fn fetch_obsp<D>(&self, key: &str) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>,
    {
        fetch_array(&self.obsp, key)
    }
    fn fetch_varm<D>(&self, key: &str) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>,
    {
        fetch_array(&self.varm, key)
    }
    fn fetch_varp<D>(&self, key: &str) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>,
    {
        fetch_array(&self.varp, key)
    }
    fn fetch_layer<D>(&self, key: &str) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>,
    {
        fetch_array(&self.layers, key)
    }

    fn add_uns<D: Into<Data>>(&self, key: &str, data: D) -> Result<()> {
        self.uns.add(key, data)
    }
    fn add_obsm<D: Into<ArrayData>>(&self, key: &str, data: D) -> Result<()> {
        self.obsm.add(key, data)?;
        self.sync_axes()
    }
    fn add_obsp<D: Into<ArrayData>>(&self, key: &str, data: D) -> Result<()> {
        self.obsp.add(key, data)?;
        self.sync_axes()
    }
    fn add_varm<D: Into<ArrayData>>(&self, key: &str, data: D) -> Result<()> {
        self.varm.add(key, data)?;
        self.sync_axes()
    }
    fn add_varp<D: Into<ArrayData>>(&self, key: &str, data: D) -> Result<()> {
        self.varp.add(key, data)?;
        self.sync_axes()
    }
    fn add_layer<D: Into<ArrayData>>(&self, key: &str, data: D) -> Result<()> {
        self.layers.add(key, data)?;
        self.sync_axes()
    }

    fn del_uns(&self, key: &str) -> Result<()> {
        self.uns.remove(key)
    }
    fn del_obsm(&self, key: &str) -> Result<()> {
        self.obsm.remove(key)
    }
    fn del_obsp(&self, key: &str) -> Result<()> {
        self.obsp.remove(key)
    }
    fn del_varm(&self, key: &str) -> Result<()> {
        self.varm.remove(key)
    }
    fn del_varp(&self, key: &str) -> Result<()> {
        self.varp.remove(key)
    }
    fn del_layer(&self, key: &str) -> Result<()> {
        self.layers.remove(key)
    }
}

fn fetch_array<B, D>(arrays: &AxisArrays<B>, key: &str) -> Result<Option<D>>
where
    B: Backend,
    D: TryFrom<ArrayData>,
    <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>,
{
    arrays
        .get_item(key)?
        .map(|x| x.try_into().map_err(Into::into))
        .transpose()
}
