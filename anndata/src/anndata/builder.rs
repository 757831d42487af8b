use crate::{
    backend::Backend,
    container::Dim,
    data::*,
    error::AnnDataError,
    traits::AnnDataOp,
    AnnData,
};

use anyhow::{bail, Result};
use log::warn;
use std::path::Path;

/// Collects the parts of an AnnData and writes them to a new store in one go.
///
/// Everything is checked against the axes before the store is created. If
/// writing fails halfway, the store is removed again.
///
/// ```
/// use anndata::{AnnData, AnnDataBuilder, AnnDataOp, backend::memory::InMemory};
/// use ndarray::Array2;
///
/// let adata: AnnData<InMemory> = AnnDataBuilder::new()
///     .x(Array2::<f64>::zeros((3, 4)))
///     .obsm("pca", Array2::<f32>::zeros((3, 2)))
///     .build("pbmc")
///     .unwrap();
/// assert_eq!(adata.n_obs(), 3);
/// assert_eq!(adata.n_vars(), 4);
/// ```
#[derive(Debug, Default, Clone)]
pub struct AnnDataBuilder {
    n_obs: Option<usize>,
    n_vars: Option<usize>,
    x: Option<ArrayData>,
    obs: Option<DataFrame>,
    var: Option<DataFrame>,
    obsm: Vec<(String, ArrayData)>,
    obsp: Vec<(String, ArrayData)>,
    varm: Vec<(String, ArrayData)>,
    varp: Vec<(String, ArrayData)>,
    layers: Vec<(String, ArrayData)>,
    uns: Vec<(String, Data)>,
}

impl AnnDataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the number of observations instead of inferring it.
    pub fn n_obs(mut self, n: usize) -> Self {
        self.n_obs = Some(n);
        self
    }

    /// Fix the number of variables instead of inferring it.
    pub fn n_vars(mut self, n: usize) -> Self {
        self.n_vars = Some(n);
        self
    }

    pub fn x<D: Into<ArrayData>>(mut self, data: D) -> Self {
        self.x = Some(data.into());
        self
    }

    pub fn obs(mut self, obs: DataFrame) -> Self {
        self.obs = Some(obs);
        self
    }

    pub fn var(mut self, var: DataFrame) -> Self {
        self.var = Some(var);
        self
    }

    pub fn obsm<D: Into<ArrayData>>(mut self, key: &str, data: D) -> Self {
        self.obsm.push((key.to_string(), data.into()));
        self
    }

    pub fn obsp<D: Into<ArrayData>>(mut self, key: &str, data: D) -> Self {
        self.obsp.push((key.to_string(), data.into()));
        self
    }

    pub fn varm<D: Into<ArrayData>>(mut self, key: &str, data: D) -> Self {
        self.varm.push((key.to_string(), data.into()));
        self
    }

    pub fn varp<D: Into<ArrayData>>(mut self, key: &str, data: D) -> Self {
        self.varp.push((key.to_string(), data.into()));
        self
    }

    pub fn layer<D: Into<ArrayData>>(mut self, key: &str, data: D) -> Self {
        self.layers.push((key.to_string(), data.into()));
        self
    }

    pub fn uns<D: Into<Data>>(mut self, key: &str, data: D) -> Self {
        self.uns.push((key.to_string(), data.into()));
        self
    }

    /// Resolve both axes. The number of observations comes from the explicit
    /// value, then X, then obs, then the first obsm array.
    fn check(&self) -> Result<(Dim, Dim)> {
        let n_obs = self.n_obs.map_or(Dim::empty("obs"), |n| Dim::new("obs", n));
        let n_vars = self.n_vars.map_or(Dim::empty("var"), |n| Dim::new("var", n));

        if let Some(x) = self.x.as_ref() {
            let shape = x.shape();
            if shape.ndim() != 2 {
                bail!("X must be a 2 dimensional array, got shape {}", shape);
            }
            n_obs.try_set(shape[0])?;
            n_vars.try_set(shape[1])?;
        }
        if let Some(obs) = self.obs.as_ref() {
            n_obs.try_set(obs.height())?;
        }
        if let Some(var) = self.var.as_ref() {
            n_vars.try_set(var.height())?;
        }
        for (dim, arrays) in [(&n_obs, &self.obsm), (&n_vars, &self.varm)] {
            for (_, data) in arrays {
                let shape = data.shape();
                if shape.ndim() == 0 {
                    bail!("arrays aligned to {} need at least 1 dimension", dim.name());
                }
                dim.try_set(shape[0])?;
            }
        }
        for (dim, arrays) in [(&n_obs, &self.obsp), (&n_vars, &self.varp)] {
            for (_, data) in arrays {
                let shape = data.shape();
                if shape.ndim() < 2 {
                    bail!("pairwise arrays need 2 dimensions, got shape {}", shape);
                }
                if shape[0] != shape[1] {
                    bail!(AnnDataError::axis_mismatch("pairwise", shape[0], shape[1]));
                }
                dim.try_set(shape[0])?;
            }
        }
        for (_, data) in &self.layers {
            let shape = data.shape();
            if shape.ndim() < 2 {
                bail!("layers need 2 dimensions, got shape {}", shape);
            }
            n_obs.try_set(shape[0])?;
            n_vars.try_set(shape[1])?;
        }
        Ok((n_obs, n_vars))
    }

    /// Write everything to a new store at `filename`.
    pub fn build<B: Backend, P: AsRef<Path>>(self, filename: P) -> Result<AnnData<B>> {
        let (n_obs, n_vars) = self.check()?;
        let adata = AnnData::<B>::new(filename)?;
        match self.write_into(&adata, n_obs.size(), n_vars.size()) {
            Ok(()) => Ok(adata),
            Err(e) => {
                let path = adata.filename();
                if let Err(err) = adata.discard() {
                    warn!("failed to remove '{}': {}", path.display(), err);
                }
                Err(e)
            }
        }
    }

    fn write_into<B: Backend>(
        self,
        adata: &AnnData<B>,
        n_obs: Option<usize>,
        n_vars: Option<usize>,
    ) -> Result<()> {
        if let Some(n) = n_obs {
            adata.n_obs.try_set(n)?;
        }
        if let Some(n) = n_vars {
            adata.n_vars.try_set(n)?;
        }
        if let Some(x) = self.x {
            adata.set_x(x)?;
        }
        if let Some(obs) = self.obs {
            adata.set_obs(obs)?;
        }
        if let Some(var) = self.var {
            adata.set_var(var)?;
        }
        for (key, data) in self.obsm {
            adata.add_obsm(&key, data)?;
        }
        for (key, data) in self.obsp {
            adata.add_obsp(&key, data)?;
        }
        for (key, data) in self.varm {
            adata.add_varm(&key, data)?;
        }
        for (key, data) in self.varp {
            adata.add_varp(&key, data)?;
        }
        for (key, data) in self.layers {
            adata.add_layer(&key, data)?;
        }
        for (key, data) in self.uns {
            adata.add_uns(&key, data)?;
        }
        adata.sync_axes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemory;
    use ndarray::{Array1, Array2};

    #[test]
    fn infer_axes() {
        let mut obs = DataFrame::new(5);
        obs.insert("n_genes", Array1::<u32>::zeros(5)).unwrap();
        let adata: AnnData<InMemory> = AnnDataBuilder::new()
            .obs(obs)
            .obsm("umap", Array2::<f32>::zeros((5, 2)))
            .varm("loadings", Array2::<f32>::zeros((9, 2)))
            .build("infer")
            .unwrap();
        assert_eq!((adata.n_obs(), adata.n_vars()), (5, 9));
        assert!(adata.read_x::<ArrayData>().unwrap().is_none());
        assert_eq!(adata.obs_keys(), vec!["n_genes"]);
    }

    #[test]
    fn explicit_size_wins() {
        let err = AnnDataBuilder::new()
            .n_obs(4)
            .x(Array2::<f64>::zeros((3, 2)))
            .build::<InMemory, _>("explicit")
            .unwrap_err();
        assert!(matches!(
            AnnDataError::of(&err),
            Some(AnnDataError::AxisMismatch { expected: 4, got: 3, .. })
        ));

        let adata: AnnData<InMemory> = AnnDataBuilder::new()
            .n_obs(0)
            .n_vars(3)
            .build("empty")
            .unwrap();
        assert_eq!((adata.n_obs(), adata.n_vars()), (0, 3));
    }

    #[test]
    fn sizes_survive_copy() {
        let adata: AnnData<InMemory> = AnnDataBuilder::new()
            .n_obs(5)
            .n_vars(3)
            .build("sized")
            .unwrap();
        assert!(!adata.obs.is_empty() && !adata.var.is_empty());
        let copied = adata.copy::<InMemory, _>("copy").unwrap();
        assert_eq!((copied.n_obs(), copied.n_vars()), (5, 3));

        adata.del_var().unwrap();
        assert!(!adata.var.is_empty());
        let copied = adata.copy::<InMemory, _>("copy").unwrap();
        assert_eq!((copied.n_obs(), copied.n_vars()), (5, 3));
    }

    #[test]
    fn reject_non_square_pairwise() {
        let err = AnnDataBuilder::new()
            .obsp("distances", Array2::<f64>::zeros((3, 2)))
            .build::<InMemory, _>("pairwise")
            .unwrap_err();
        assert!(AnnDataError::of(&err).is_some());
    }
}
