//! Hierarchical attribute/data store abstraction.
//!
//! The container engine itself (HDF5) lives outside this crate. Anything that
//! can answer the [`ContainerStore`] queries can feed the pipeline; this module
//! also ships [`MemoryStore`], an in-memory implementation for building
//! containers programmatically.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    /// Numeric value as `i64`; floats are truncated toward zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    /// Numeric value as `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Read-only access to a hierarchical container.
///
/// Absence is never an error: attribute reads return `Ok(None)` when the
/// attribute does not exist. Errors are reserved for I/O failures, corrupt
/// data, and (for [`ContainerStore::list_group_members`] and
/// [`ContainerStore::read_opaque`]) missing paths.
pub trait ContainerStore: Send + Sync {
    /// Returns true if `name` is attached to the object at `path`.
    fn has_attribute(&self, path: &str, name: &str) -> Result<bool>;

    /// Reads a scalar attribute.
    fn read_scalar(&self, path: &str, name: &str) -> Result<Option<AttrValue>>;

    /// Reads a numeric array attribute, converting elements to `f64`.
    fn read_array(&self, path: &str, name: &str) -> Result<Option<Vec<f64>>>;

    /// Reads a string attribute.
    fn read_string(&self, path: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .read_scalar(path, name)?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Lists member names of a group in the store's native order.
    fn list_group_members(&self, path: &str) -> Result<Vec<String>>;

    /// Reads the opaque byte payload stored at `path`.
    fn read_opaque(&self, path: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Default)]
struct Node {
    attrs: BTreeMap<String, MemoryAttr>,
    members: Vec<String>,
    payload: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
enum MemoryAttr {
    Scalar(AttrValue),
    Array(Vec<f64>),
}

/// In-memory [`ContainerStore`].
///
/// Paths are absolute (`/`, `/Channels`, `/Channels/Channel_0`). Group members
/// keep insertion order.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    nodes: BTreeMap<String, Node>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store containing only the root group.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::default());
        Self { nodes }
    }

    /// Creates a group (and any missing parents).
    pub fn add_group(&mut self, path: &str) -> &mut Self {
        self.ensure(&normalize(path));
        self
    }

    /// Sets a scalar attribute, creating the object if needed.
    pub fn set_attr(&mut self, path: &str, name: &str, value: AttrValue) -> &mut Self {
        self.ensure(&normalize(path))
            .attrs
            .insert(name.to_string(), MemoryAttr::Scalar(value));
        self
    }

    /// Sets an array attribute, creating the object if needed.
    pub fn set_array_attr(&mut self, path: &str, name: &str, values: &[f64]) -> &mut Self {
        self.ensure(&normalize(path))
            .attrs
            .insert(name.to_string(), MemoryAttr::Array(values.to_vec()));
        self
    }

    /// Stores an opaque payload at `path`, registering it with its parent group.
    pub fn set_opaque(&mut self, path: &str, bytes: Vec<u8>) -> &mut Self {
        self.ensure(&normalize(path)).payload = Some(bytes);
        self
    }

    fn ensure(&mut self, path: &str) -> &mut Node {
        if !self.nodes.contains_key(path) {
            if let Some((parent, name)) = split_parent(path) {
                let parent = parent.to_string();
                let name = name.to_string();
                let parent_node = self.ensure(&parent);
                if !parent_node.members.contains(&name) {
                    parent_node.members.push(name);
                }
            }
            self.nodes.insert(path.to_string(), Node::default());
        }
        self.nodes.entry(path.to_string()).or_default()
    }

    fn node(&self, path: &str) -> Option<&Node> {
        self.nodes.get(&normalize(path))
    }

    fn attr(&self, path: &str, name: &str) -> Option<&MemoryAttr> {
        self.node(path).and_then(|n| n.attrs.get(name))
    }
}

impl ContainerStore for MemoryStore {
    fn has_attribute(&self, path: &str, name: &str) -> Result<bool> {
        Ok(self.attr(path, name).is_some())
    }

    fn read_scalar(&self, path: &str, name: &str) -> Result<Option<AttrValue>> {
        match self.attr(path, name) {
            Some(MemoryAttr::Scalar(v)) => Ok(Some(v.clone())),
            Some(MemoryAttr::Array(values)) => match values.as_slice() {
                [single] => Ok(Some(AttrValue::Float(*single))),
                _ => Err(Error::container(
                    path,
                    format!("attribute {name} is an array, not a scalar"),
                )),
            },
            None => Ok(None),
        }
    }

    fn read_array(&self, path: &str, name: &str) -> Result<Option<Vec<f64>>> {
        match self.attr(path, name) {
            Some(MemoryAttr::Array(values)) => Ok(Some(values.clone())),
            Some(MemoryAttr::Scalar(v)) => v.as_f64().map(|f| Some(vec![f])).ok_or_else(|| {
                Error::container(path, format!("attribute {name} is not numeric"))
            }),
            None => Ok(None),
        }
    }

    fn list_group_members(&self, path: &str) -> Result<Vec<String>> {
        self.node(path)
            .map(|n| n.members.clone())
            .ok_or_else(|| Error::container(path, "group does not exist"))
    }

    fn read_opaque(&self, path: &str) -> Result<Vec<u8>> {
        self.node(path)
            .and_then(|n| n.payload.clone())
            .ok_or_else(|| Error::container(path, "no opaque payload at path"))
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn split_parent(path: &str) -> Option<(&str, &str)> {
    if path == "/" {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = if idx == 0 { "/" } else { &path[..idx] };
    Some((parent, &path[idx + 1..]))
}
