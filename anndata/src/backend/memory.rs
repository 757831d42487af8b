//! A non-persistent store that keeps groups and arrays in process memory.
//!
//! Used for containers that are not bound to a file, and as the reference
//! backend in tests.

use super::*;
use crate::error::AnnDataError;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Map;
use std::sync::Arc;

pub struct InMemory;

#[derive(Debug, Clone)]
enum Node {
    Group {
        children: IndexMap<String, Node>,
        attrs: Map<String, Value>,
    },
    Dataset {
        data: DynArray,
        attrs: Map<String, Value>,
    },
}

impl Node {
    fn empty_group() -> Self {
        Node::Group {
            children: IndexMap::new(),
            attrs: Map::new(),
        }
    }

    fn attrs(&self) -> &Map<String, Value> {
        match self {
            Node::Group { attrs, .. } | Node::Dataset { attrs, .. } => attrs,
        }
    }

    fn attrs_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            Node::Group { attrs, .. } | Node::Dataset { attrs, .. } => attrs,
        }
    }
}

#[derive(Clone)]
pub struct InMemoryStore {
    name: PathBuf,
    root: Arc<RwLock<Node>>,
}

/// Handle to a node: the store plus the node's components from the root.
#[derive(Clone)]
pub struct Location {
    store: InMemoryStore,
    path: Vec<String>,
}

#[derive(Clone)]
pub struct InMemoryGroup(Location);

#[derive(Clone)]
pub struct InMemoryDataset(Location);

fn components(name: &str) -> impl Iterator<Item = &str> {
    name.split('/').filter(|x| !x.is_empty())
}

impl Location {
    fn child(&self, name: &str) -> Location {
        let mut path = self.path.clone();
        path.extend(components(name).map(String::from));
        Location {
            store: self.store.clone(),
            path,
        }
    }

    fn display(&self) -> PathBuf {
        PathBuf::from(format!("/{}", self.path.join("/")))
    }

    fn with_node<R>(&self, f: impl FnOnce(&Node) -> Result<R>) -> Result<R> {
        let root = self.store.root.read();
        let mut node = &*root;
        for c in &self.path {
            node = match node {
                Node::Group { children, .. } => children
                    .get(c)
                    .ok_or_else(|| AnnDataError::NotFound(self.display()))?,
                Node::Dataset { .. } => bail!(AnnDataError::NotFound(self.display())),
            };
        }
        f(node)
    }

    fn with_node_mut<R>(&self, f: impl FnOnce(&mut Node) -> Result<R>) -> Result<R> {
        let mut root = self.store.root.write();
        let mut node = &mut *root;
        for c in &self.path {
            node = match node {
                Node::Group { children, .. } => children
                    .get_mut(c)
                    .ok_or_else(|| AnnDataError::NotFound(self.display()))?,
                Node::Dataset { .. } => bail!(AnnDataError::NotFound(self.display())),
            };
        }
        f(node)
    }

    /// Insert a new child node under the parent of `self`.
    fn create(&self, node: Node) -> Result<()> {
        let (name, parent) = self
            .path
            .split_last()
            .ok_or_else(|| anyhow!("cannot replace the root group"))?;
        let parent = Location {
            store: self.store.clone(),
            path: parent.to_vec(),
        };
        parent.with_node_mut(|p| match p {
            Node::Group { children, .. } => {
                if children.contains_key(name) {
                    bail!("'{}' already exists", self.display().display());
                }
                children.insert(name.clone(), node);
                Ok(())
            }
            Node::Dataset { .. } => bail!("'{}' is not a group", parent.display().display()),
        })
    }
}

impl Backend for InMemory {
    const NAME: &'static str = "memory";
    const PERSISTENT: bool = false;

    type Store = InMemoryStore;
    type Group = InMemoryGroup;
    type Dataset = InMemoryDataset;

    fn new<P: AsRef<Path>>(path: P) -> Result<Self::Store> {
        Ok(InMemoryStore {
            name: path.as_ref().to_path_buf(),
            root: Arc::new(RwLock::new(Node::empty_group())),
        })
    }

    /// In-memory stores cannot be reopened once their handles are gone.
    fn open<P: AsRef<Path>>(path: P) -> Result<Self::Store> {
        bail!(AnnDataError::NotFound(path.as_ref().to_path_buf()))
    }

    fn open_rw<P: AsRef<Path>>(path: P) -> Result<Self::Store> {
        Self::open(path)
    }
}

impl InMemoryStore {
    fn root_location(&self) -> Location {
        Location {
            store: self.clone(),
            path: Vec::new(),
        }
    }
}

impl StoreOp<InMemory> for InMemoryStore {
    fn filename(&self) -> PathBuf {
        self.name.clone()
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(self) -> Result<()> {
        Ok(())
    }

    fn discard(self) -> Result<()> {
        *self.root.write() = Node::empty_group();
        Ok(())
    }
}

fn list(loc: &Location) -> Result<Vec<String>> {
    loc.with_node(|node| match node {
        Node::Group { children, .. } => Ok(children.keys().cloned().collect()),
        Node::Dataset { .. } => bail!("'{}' is not a group", loc.display().display()),
    })
}

fn new_group(loc: &Location, name: &str) -> Result<InMemoryGroup> {
    let child = loc.child(name);
    child.create(Node::empty_group())?;
    Ok(InMemoryGroup(child))
}

fn open_group(loc: &Location, name: &str) -> Result<InMemoryGroup> {
    let child = loc.child(name);
    child.with_node(|node| match node {
        Node::Group { .. } => Ok(()),
        Node::Dataset { .. } => bail!("'{}' is not a group", child.display().display()),
    })?;
    Ok(InMemoryGroup(child))
}

fn new_empty_dataset<T: BackendData>(
    loc: &Location,
    name: &str,
    shape: &Shape,
) -> Result<InMemoryDataset> {
    let child = loc.child(name);
    let data = ndarray::ArrayD::<T>::default(IxDyn(shape.as_ref()));
    child.create(Node::Dataset {
        data: T::into_dyn_arr(data),
        attrs: Map::new(),
    })?;
    Ok(InMemoryDataset(child))
}

fn open_dataset(loc: &Location, name: &str) -> Result<InMemoryDataset> {
    let child = loc.child(name);
    child.with_node(|node| match node {
        Node::Dataset { .. } => Ok(()),
        Node::Group { .. } => bail!("'{}' is not a dataset", child.display().display()),
    })?;
    Ok(InMemoryDataset(child))
}

fn delete(loc: &Location, name: &str) -> Result<()> {
    let child = loc.child(name);
    let (last, parent) = child
        .path
        .split_last()
        .ok_or_else(|| anyhow!("cannot delete the root group"))?;
    let parent = Location {
        store: child.store.clone(),
        path: parent.to_vec(),
    };
    parent.with_node_mut(|node| match node {
        Node::Group { children, .. } => {
            children
                .shift_remove(last)
                .ok_or_else(|| AnnDataError::NotFound(child.display()))?;
            Ok(())
        }
        Node::Dataset { .. } => bail!(AnnDataError::NotFound(child.display())),
    })
}

fn rename(loc: &Location, from: &str, to: &str) -> Result<()> {
    check_name(from)?;
    check_name(to)?;
    loc.with_node_mut(|node| match node {
        Node::Group { children, .. } => {
            if children.contains_key(to) {
                bail!("'{}' already exists", loc.child(to).display().display());
            }
            let child = children
                .shift_remove(from)
                .ok_or_else(|| AnnDataError::NotFound(loc.child(from).display()))?;
            children.insert(to.to_string(), child);
            Ok(())
        }
        Node::Dataset { .. } => bail!("'{}' is not a group", loc.display().display()),
    })
}

fn exists(loc: &Location, name: &str) -> Result<bool> {
    match loc.child(name).with_node(|_| Ok(())) {
        Ok(()) => Ok(true),
        Err(e) => match AnnDataError::of(&e) {
            Some(AnnDataError::NotFound(_)) => Ok(false),
            _ => Err(e),
        },
    }
}

macro_rules! impl_group_op {
    ($ty:ty, $loc:ident) => {
        impl GroupOp<InMemory> for $ty {
            fn list(&self) -> Result<Vec<String>> {
                list(&self.$loc())
            }

            fn new_group(&self, name: &str) -> Result<InMemoryGroup> {
                new_group(&self.$loc(), name)
            }

            fn open_group(&self, name: &str) -> Result<InMemoryGroup> {
                open_group(&self.$loc(), name)
            }

            fn new_empty_dataset<T: BackendData>(
                &self,
                name: &str,
                shape: &Shape,
                _config: WriteConfig,
            ) -> Result<InMemoryDataset> {
                new_empty_dataset::<T>(&self.$loc(), name, shape)
            }

            fn open_dataset(&self, name: &str) -> Result<InMemoryDataset> {
                open_dataset(&self.$loc(), name)
            }

            fn delete(&self, name: &str) -> Result<()> {
                delete(&self.$loc(), name)
            }

            fn exists(&self, name: &str) -> Result<bool> {
                exists(&self.$loc(), name)
            }

            fn rename(&self, from: &str, to: &str) -> Result<()> {
                rename(&self.$loc(), from, to)
            }
        }
    };
}

impl InMemoryGroup {
    fn location(&self) -> Location {
        self.0.clone()
    }
}

impl_group_op!(InMemoryStore, root_location);
impl_group_op!(InMemoryGroup, location);

macro_rules! impl_attribute_op {
    ($ty:ty) => {
        impl AttributeOp<InMemory> for $ty {
            fn store(&self) -> Result<InMemoryStore> {
                Ok(self.0.store.clone())
            }

            fn path(&self) -> PathBuf {
                self.0.display()
            }

            fn new_json_attr(&mut self, name: &str, value: &Value) -> Result<()> {
                self.0.with_node_mut(|node| {
                    node.attrs_mut().insert(name.to_string(), value.clone());
                    Ok(())
                })
            }

            fn get_json_attr(&self, name: &str) -> Result<Value> {
                self.0.with_node(|node| {
                    node.attrs()
                        .get(name)
                        .cloned()
                        .ok_or_else(|| anyhow!("attribute '{}' not found", name))
                })
            }
        }
    };
}

impl_attribute_op!(InMemoryGroup);
impl_attribute_op!(InMemoryDataset);

impl InMemoryDataset {
    fn data(&self) -> Result<DynArray> {
        self.0.with_node(|node| match node {
            Node::Dataset { data, .. } => Ok(data.clone()),
            Node::Group { .. } => bail!("'{}' is not a dataset", self.0.display().display()),
        })
    }
}

impl DatasetOp<InMemory> for InMemoryDataset {
    fn dtype(&self) -> Result<ScalarType> {
        self.0.with_node(|node| match node {
            Node::Dataset { data, .. } => Ok(data.dtype()),
            Node::Group { .. } => bail!("'{}' is not a dataset", self.0.display().display()),
        })
    }

    fn shape(&self) -> Shape {
        self.0
            .with_node(|node| match node {
                Node::Dataset { data, .. } => Ok(data.shape()),
                Node::Group { .. } => Ok(Shape::from(Vec::new())),
            })
            .unwrap_or_else(|_| Shape::from(Vec::new()))
    }

    fn write_array_slice<S, T, D>(&self, arr: CowArray<'_, T, D>, selection: &[S]) -> Result<()>
    where
        T: BackendData,
        S: AsRef<SelectInfoElem>,
        D: Dimension,
    {
        self.0.with_node_mut(|node| match node {
            Node::Dataset { data, .. } => {
                if data.dtype() != T::DTYPE {
                    bail!(
                        "cannot write {} values into a {} dataset",
                        T::DTYPE,
                        data.dtype()
                    );
                }
                let shape = data.shape();
                *data = whole_array::write(Some(data.clone()), &shape, arr, selection)?;
                Ok(())
            }
            Node::Group { .. } => bail!("'{}' is not a dataset", self.0.display().display()),
        })
    }

    fn read_array_slice<T: BackendData, S, D>(&self, selection: &[S]) -> Result<Array<T, D>>
    where
        S: AsRef<SelectInfoElem>,
        D: Dimension,
    {
        whole_array::read(self.data()?, selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn groups_and_datasets() {
        let store = InMemory::new("mem").unwrap();
        let g = store.new_group("a").unwrap();
        g.new_group("b").unwrap();
        g.new_array_dataset("x", array![1i32, 2, 3].into(), WriteConfig::default())
            .unwrap();
        assert_eq!(g.list().unwrap(), vec!["b", "x"]);
        assert!(store.exists("a/x").unwrap());
        assert!(!store.exists("a/y").unwrap());
        assert!(store.new_group("a").is_err());

        let ds = store.open_dataset("a/x").unwrap();
        assert_eq!(ds.dtype().unwrap(), ScalarType::I32);
        assert_eq!(ds.read_array::<i32, ndarray::Ix1>().unwrap(), array![1, 2, 3]);

        g.rename("x", "y").unwrap();
        assert_eq!(g.list().unwrap(), vec!["b", "y"]);
        assert!(g.rename("y", "b").is_err());
        assert!(g.rename("missing", "z").is_err());
        assert!(g.rename("y", "c/d").is_err());
        assert_eq!(
            store.open_dataset("a/y").unwrap().read_array::<i32, ndarray::Ix1>().unwrap(),
            array![1, 2, 3]
        );

        g.delete("y").unwrap();
        assert_eq!(g.list().unwrap(), vec!["b"]);
    }

    #[test]
    fn partial_write() {
        let store = InMemory::new("mem").unwrap();
        let ds = store
            .new_empty_dataset::<u8>("x", &vec![3, 4].into(), WriteConfig::default())
            .unwrap();
        let block = Array2::<u8>::from_elem((2, 2), 7);
        let select: [SelectInfoElem; 2] = [(1..3).into(), (2..4).into()];
        ds.write_array_slice(block.into(), &select).unwrap();
        let out: Array2<u8> = ds.read_array().unwrap();
        assert_eq!(out.sum(), 28);
        assert_eq!(out[[1, 2]], 7);
        assert_eq!(out[[0, 0]], 0);

        let wrong = Array2::<f32>::zeros((3, 4));
        assert!(ds.write_array(wrong.into()).is_err());
    }

    #[test]
    fn attributes() {
        let store = InMemory::new("mem").unwrap();
        let mut g = store.new_group("g").unwrap();
        g.new_attr("shape", vec![3usize, 4]).unwrap();
        assert_eq!(g.get_attr::<Vec<usize>>("shape").unwrap(), vec![3, 4]);
        assert!(g.get_attr::<String>("missing").is_err());
    }
}
