//! The wire-neutral graph document.
//!
//! The engine turns a model graph into a tree of [`Node`]s and back; formats
//! only ever see nodes. Shared instances appear once in full, tagged with a
//! graph id, and every later occurrence is a [`Node::Reference`].
//!
//! ```rust
//! use serde_graph::{Node, NodeMap};
//!
//! let mut members = NodeMap::new();
//! members.insert("Count".to_string(), Node::from(3));
//! let node = Node::object(Some("A"), Some(1), members);
//!
//! assert_eq!(node.graph_id(), Some(1));
//! assert_eq!(node.type_name(), Some("A"));
//! ```

use crate::{Number, NodeMap};
use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::borrow::Cow;

/// Reserved key carrying the graph id of an object or list.
pub const GRAPH_ID_KEY: &str = "$graph_id";
/// Reserved key of a reference marker.
pub const GRAPH_REF_ID_KEY: &str = "$graph_ref_id";
/// Reserved key carrying the type name of an object.
pub const TYPE_KEY: &str = "$type";
/// Reserved key holding the items of a tracked list.
pub const VALUES_KEY: &str = "$values";
/// Reserved key naming the kind of a typed scalar or pair.
pub const KIND_KEY: &str = "$kind";
/// Reserved key holding the key of a pair.
pub const KEY_KEY: &str = "$key";
/// Reserved key holding the payload of a typed scalar, or the value of a pair.
pub const VALUE_KEY: &str = "$value";

pub(crate) const DATETIME_KIND: &str = "DateTime";
pub(crate) const BIGINT_KIND: &str = "BigInt";
pub(crate) const PAIR_KIND: &str = "Pair";

/// Returns `true` if a member name collides with the reserved sentinel keys.
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with('$')
}

/// Map keys starting with `$` get one more `$` in formats that put
/// annotations and keys in the same namespace.
pub(crate) fn escape_key(key: &str) -> Cow<'_, str> {
    if is_reserved_name(key) {
        Cow::Owned(format!("${}", key))
    } else {
        Cow::Borrowed(key)
    }
}

/// Reverses [`escape_key`]. Returns `None` for a reserved key.
pub(crate) fn unescape_key(key: &str) -> Option<&str> {
    match key.strip_prefix('$') {
        Some(rest) if rest.starts_with('$') => Some(rest),
        Some(_) => None,
        None => Some(key),
    }
}

/// A node of a serialized object graph.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    /// A date written where the declared member type does not say so.
    DateTime(DateTime<Utc>),
    /// A big integer written where the declared member type does not say so.
    BigInt(BigInt),
    /// A key/value pair written where the declared member type does not say so.
    Pair(Box<Node>, Box<Node>),
    List {
        graph_id: Option<u32>,
        items: Vec<Node>,
    },
    /// A model instance or a string-keyed map. `type_name` is omitted when the
    /// declared member type already names the runtime type.
    Object {
        type_name: Option<String>,
        graph_id: Option<u32>,
        members: NodeMap,
    },
    /// Marker for an instance written earlier under this graph id.
    Reference(u32),
}

impl Node {
    pub fn object(type_name: Option<&str>, graph_id: Option<u32>, members: NodeMap) -> Self {
        Node::Object {
            type_name: type_name.map(str::to_string),
            graph_id,
            members,
        }
    }

    #[must_use]
    pub fn list(graph_id: Option<u32>, items: Vec<Node>) -> Self {
        Node::List { graph_id, items }
    }

    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Number(Number::Integer(_)) => "integer",
            Node::Number(Number::Float(_)) => "float",
            Node::Text(_) => "text",
            Node::DateTime(_) => "datetime",
            Node::BigInt(_) => "bigint",
            Node::Pair(..) => "pair",
            Node::List { .. } => "list",
            Node::Object { .. } => "object",
            Node::Reference(_) => "reference",
        }
    }

    #[must_use]
    pub fn graph_id(&self) -> Option<u32> {
        match self {
            Node::List { graph_id, .. } | Node::Object { graph_id, .. } => *graph_id,
            _ => None,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Node::Object { type_name, .. } => type_name.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn members(&self) -> Option<&NodeMap> {
        match self {
            Node::Object { members, .. } => Some(members),
            _ => None,
        }
    }

    /// Looks up a member of an object node.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.members().and_then(|members| members.get(name))
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Counts the nodes of this tree, references included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + match self {
            Node::Pair(key, value) => key.node_count() + value.node_count(),
            Node::List { items, .. } => items.iter().map(Node::node_count).sum(),
            Node::Object { members, .. } => members.values().map(Node::node_count).sum(),
            _ => 0,
        }
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Bool(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Number(Number::Integer(value))
    }
}

impl From<i32> for Node {
    fn from(value: i32) -> Self {
        Node::Number(Number::Integer(value as i64))
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::Number(Number::Float(value))
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Text(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Text(value)
    }
}

/// JSON-shaped representation: objects carry `$type` and `$graph_id`, tracked
/// lists become `{"$graph_id": n, "$values": [...]}`, references become
/// `{"$graph_ref_id": n}`. Non-finite floats are written as strings. Typed
/// scalars and pairs carry a `$kind`, and map keys starting with `$` are
/// escaped with a second `$`.
impl Serialize for Node {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Number(Number::Integer(i)) => serializer.serialize_i64(*i),
            Node::Number(Number::Float(f)) if f.is_finite() => serializer.serialize_f64(*f),
            Node::Number(n) => serializer.serialize_str(&n.to_string()),
            Node::Text(s) => serializer.serialize_str(s),
            Node::DateTime(dt) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(KIND_KEY, DATETIME_KIND)?;
                map.serialize_entry(VALUE_KEY, &dt.to_rfc3339())?;
                map.end()
            }
            Node::BigInt(big) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(KIND_KEY, BIGINT_KIND)?;
                map.serialize_entry(VALUE_KEY, &big.to_string())?;
                map.end()
            }
            Node::Pair(key, value) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry(KIND_KEY, PAIR_KIND)?;
                map.serialize_entry(KEY_KEY, key)?;
                map.serialize_entry(VALUE_KEY, value)?;
                map.end()
            }
            Node::List {
                graph_id: None,
                items,
            } => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::List {
                graph_id: Some(id),
                items,
            } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(GRAPH_ID_KEY, id)?;
                map.serialize_entry(VALUES_KEY, items)?;
                map.end()
            }
            Node::Object {
                type_name,
                graph_id,
                members,
            } => {
                let len = members.len()
                    + usize::from(type_name.is_some())
                    + usize::from(graph_id.is_some());
                let mut map = serializer.serialize_map(Some(len))?;
                if let Some(type_name) = type_name {
                    map.serialize_entry(TYPE_KEY, type_name)?;
                }
                if let Some(id) = graph_id {
                    map.serialize_entry(GRAPH_ID_KEY, id)?;
                }
                for (name, node) in members {
                    map.serialize_entry(&escape_key(name), node)?;
                }
                map.end()
            }
            Node::Reference(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(GRAPH_REF_ID_KEY, id)?;
                map.end()
            }
        }
    }
}
