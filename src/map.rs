//! Ordered member map for object nodes.
//!
//! [`NodeMap`] wraps [`IndexMap`] so members keep the order in which the engine
//! visited them. Member order is part of the output contract: two runs over the
//! same graph produce byte-identical documents.
//!
//! ## Examples
//!
//! ```rust
//! use serde_graph::{Node, NodeMap};
//!
//! let mut map = NodeMap::new();
//! map.insert("Name".to_string(), Node::from("Alice"));
//! map.insert("Age".to_string(), Node::from(30));
//!
//! let keys: Vec<_> = map.keys().cloned().collect();
//! assert_eq!(keys, vec!["Name", "Age"]);
//! ```

use crate::Node;
use indexmap::IndexMap;

/// An ordered map of member names to nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMap(IndexMap<String, Node>);

impl NodeMap {
    /// Creates an empty `NodeMap`.
    #[must_use]
    pub fn new() -> Self {
        NodeMap(IndexMap::new())
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        NodeMap(IndexMap::with_capacity(capacity))
    }

    /// Inserts a member. If the map already contained this name, the old node is returned.
    pub fn insert(&mut self, key: String, value: Node) -> Option<Node> {
        self.0.insert(key, value)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.0.get(key)
    }

    /// Removes a member, keeping the order of the others.
    pub fn remove(&mut self, key: &str) -> Option<Node> {
        self.0.shift_remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, String, Node> {
        self.0.keys()
    }

    pub fn values(&self) -> indexmap::map::Values<'_, String, Node> {
        self.0.values()
    }

    /// Returns an iterator over the members, in insertion order.
    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Node> {
        self.0.iter()
    }
}

impl Default for NodeMap {
    fn default() -> Self {
        Self::new()
    }
}

impl IntoIterator for NodeMap {
    type Item = (String, Node);
    type IntoIter = indexmap::map::IntoIter<String, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a NodeMap {
    type Item = (&'a String, &'a Node);
    type IntoIter = indexmap::map::Iter<'a, String, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(String, Node)> for NodeMap {
    fn from_iter<T: IntoIterator<Item = (String, Node)>>(iter: T) -> Self {
        NodeMap(IndexMap::from_iter(iter))
    }
}
