use crate::data::*;

use anyhow::Result;

/// Read and write access to the elements of an annotated matrix.
pub trait AnnDataOp {
    /// Reading/writing the 'X' element.
    fn read_x<D>(&self) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>;

    fn read_x_slice<D, S>(&self, select: S) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        S: AsRef<[SelectInfoElem]>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>;

    /// Set 'X'. The shape must agree with the number of observations and variables.
    fn set_x<D: Into<ArrayData>>(&self, data: D) -> Result<()>;

    /// Delete the 'X' element.
    fn del_x(&self) -> Result<()>;

    /// Return the number of observations (rows).
    fn n_obs(&self) -> usize;
    /// Return the number of variables (columns).
    fn n_vars(&self) -> usize;

    /// Return the names of observations. Unnamed rows are numbered from 0.
    fn obs_names(&self) -> DataFrameIndex;
    /// Return the names of variables.
    fn var_names(&self) -> DataFrameIndex;

    fn set_obs_names(&self, index: DataFrameIndex) -> Result<()>;
    fn set_var_names(&self, index: DataFrameIndex) -> Result<()>;

    fn obs_ix<'a, I: IntoIterator<Item = &'a str>>(&self, names: I) -> Result<Vec<usize>>;
    fn var_ix<'a, I: IntoIterator<Item = &'a str>>(&self, names: I) -> Result<Vec<usize>>;

    fn read_obs(&self) -> Result<DataFrame>;
    fn read_var(&self) -> Result<DataFrame>;

    /// Change the observations annotation.
    fn set_obs(&self, obs: DataFrame) -> Result<()>;
    /// Change the variables annotation.
    fn set_var(&self, var: DataFrame) -> Result<()>;

    fn del_obs(&self) -> Result<()>;
    fn del_var(&self) -> Result<()>;

    fn obs_keys(&self) -> Vec<String>;
    fn var_keys(&self) -> Vec<String>;

    fn fetch_obs_column(&self, name: &str) -> Result<Option<Column>>;
    fn fetch_var_column(&self, name: &str) -> Result<Option<Column>>;

    /// Add or replace one column of the observations annotation.
    fn add_obs_column<C: Into<Column>>(&self, name: &str, column: C) -> Result<()>;
    fn add_var_column<C: Into<Column>>(&self, name: &str, column: C) -> Result<()>;

    fn del_obs_column(&self, name: &str) -> Result<()>;
    fn del_var_column(&self, name: &str) -> Result<()>;

    fn uns_keys(&self) -> Vec<String>;
    fn obsm_keys(&self) -> Vec<String>;
    fn obsp_keys(&self) -> Vec<String>;
    fn varm_keys(&self) -> Vec<String>;
    fn varp_keys(&self) -> Vec<String>;
    fn layers_keys(&self) -> Vec<String>;

    fn fetch_uns<D>(&self, key: &str) -> Result<Option<D>>
    where
        D: TryFrom<Data>,
        <D as TryFrom<Data>>::Error: Into<anyhow::Error>;
    fn fetch_obsm<D>(&self, key: &str) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>;
    fn fetch_obsp<D>(&self, key: &str) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>;
    fn fetch_varm<D>(&self, key: &str) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>;
    fn fetch_varp<D>(&self, key: &str) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>;
    fn fetch_layer<D>(&self, key: &str) -> Result<Option<D>>
    where
        D: TryFrom<ArrayData>,
        <D as TryFrom<ArrayData>>::Error: Into<anyhow::Error>;

    fn add_uns<D: Into<Data>>(&self, key: &str, data: D) -> Result<()>;
    fn add_obsm<D: Into<ArrayData>>(&self, key: &str, data: D) -> Result<()>;
    fn add_obsp<D: Into<ArrayData>>(&self, key: &str, data: D) -> Result<()>;
    fn add_varm<D: Into<ArrayData>>(&self, key: &str, data: D) -> Result<()>;
    fn add_varp<D: Into<ArrayData>>(&self, key: &str, data: D) -> Result<()>;
    fn add_layer<D: Into<ArrayData>>(&self, key: &str, data: D) -> Result<()>;

    fn del_uns(&self, key: &str) -> Result<()>;
    fn del_obsm(&self, key: &str) -> Result<()>;
    fn del_obsp(&self, key: &str) -> Result<()>;
    fn del_varm(&self, key: &str) -> Result<()>;
    fn del_varp(&self, key: &str) -> Result<()>;
    fn del_layer(&self, key: &str) -> Result<()>;
}
