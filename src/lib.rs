//! # serde_graph
//!
//! A format-agnostic serializer for object graphs.
//!
//! Unlike a tree serializer, `serde_graph` preserves identity: an instance that
//! is reachable along several paths is written once and every later occurrence
//! becomes a reference marker, so shared instances stay shared and cycles
//! survive a round trip.
//!
//! ## Key Features
//!
//! - **Reference preservation**: models and shared lists are tracked by identity
//! - **Three formats**: XML, JSON and a compact binary encoding over one engine
//! - **Modifiers**: plug-ins that can skip or rewrite members per type, or globally
//! - **Lifecycle hooks**: start/finish callbacks fire exactly once per instance
//! - **Scopes**: callers can share reference state across several operations
//!
//! ## Quick Start
//!
//! Model types are registered once with their members in declaration order:
//!
//! ```rust
//! use serde_graph::{JsonSerializer, MemberType, Model, ModelRef, TypeRegistry, Value};
//!
//! #[derive(Default)]
//! struct Leaf {
//!     count: i64,
//! }
//!
//! #[derive(Default)]
//! struct Holder {
//!     first: Option<ModelRef>,
//!     second: Option<ModelRef>,
//! }
//!
//! impl Model for Leaf {}
//! impl Model for Holder {}
//!
//! let mut registry = TypeRegistry::new();
//! registry
//!     .register::<Leaf>("Leaf")
//!     .field("Count", MemberType::Integer, |l| Value::from(l.count), |l, v| {
//!         l.count = v.try_into()?;
//!         Ok(())
//!     })
//!     .finish()
//!     .unwrap();
//! registry
//!     .register::<Holder>("Holder")
//!     .field("First", MemberType::model("Leaf"), |h| h.first.clone().into(), |h, v| {
//!         h.first = v.as_model().cloned();
//!         Ok(())
//!     })
//!     .field("Second", MemberType::model("Leaf"), |h| h.second.clone().into(), |h, v| {
//!         h.second = v.as_model().cloned();
//!         Ok(())
//!     })
//!     .finish()
//!     .unwrap();
//!
//! let leaf = ModelRef::new(Leaf { count: 3 });
//! let holder = ModelRef::new(Holder {
//!     first: Some(leaf.clone()),
//!     second: Some(leaf),
//! });
//!
//! let serializer = JsonSerializer::new(registry);
//! let bytes = serializer.serialize_to_vec(&holder).unwrap();
//! assert_eq!(
//!     String::from_utf8(bytes.clone()).unwrap(),
//!     r#"{"$type":"Holder","$graph_id":1,"First":{"$graph_id":2,"Count":3},"Second":{"$graph_ref_id":2}}"#
//! );
//!
//! let copy = serializer.deserialize_as::<Holder>(&bytes[..]).unwrap();
//! let copy = copy.borrow();
//! assert!(copy.first.as_ref().unwrap().ptr_eq(copy.second.as_ref().unwrap()));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! model graph ──GraphWriter──▶ Node ──Format──▶ bytes
//! model graph ◀──GraphReader── Node ◀──Format── bytes
//! ```
//!
//! The engine ([`ser`], [`de`]) owns identity tracking, hooks and modifiers and
//! produces a wire-neutral [`Node`] document. A [`Format`] only encodes and
//! decodes those documents, so the same graph semantics hold for every backend.
//!
//! ## Threading
//!
//! A [`Serializer`] is `Send + Sync`: the registry is immutable after setup and
//! the member and modifier caches are lock-protected. Graph state is not; model
//! handles and scopes are `Rc`-based and stay on the thread running the operation.

pub mod context;
pub mod de;
pub mod error;
pub mod format;
pub mod macros;
pub mod map;
pub mod member;
pub mod model;
pub mod modifier;
pub mod node;
pub mod options;
pub mod reference;
pub mod registry;
pub mod scope;
pub mod ser;
pub mod serializer;
pub mod value;

pub use context::{ContextFrame, ContextMode, ContextState, SerializationContext};
pub use de::GraphReader;
pub use error::{Error, Result};
pub use format::{BinaryFormat, Format, JsonFormat, XmlFormat};
pub use map::NodeMap;
pub use member::{MemberCache, MemberValue, MemberValues};
pub use model::{Model, ModelRef, PropertyBag};
pub use modifier::{KeyValuePairModifier, ModifierRegistry, SerializerModifier};
pub use node::Node;
pub use options::SerializationConfiguration;
pub use reference::{ReferenceInfo, ReferenceManager};
pub use registry::{MemberDescriptor, MemberGroup, MemberType, TypeMeta, TypeRegistration, TypeRegistry};
pub use scope::{ScopeManager, SerializationScope};
pub use ser::GraphWriter;
pub use serializer::{BinarySerializer, JsonSerializer, Serializer, XmlSerializer};
pub use value::{Number, SharedList, Value};
