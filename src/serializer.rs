//! The format-generic serializer.
//!
//! A [`Serializer`] owns the type registry, the member and modifier caches and
//! the configuration; the format parameter only decides how the resulting
//! [`Node`] document is put on the wire. Serializers are `Send + Sync` and can
//! be shared between threads; every call runs in its own
//! [`SerializationScope`] unless the caller passes one in.
//!
//! ```rust
//! use serde_graph::{JsonSerializer, MemberType, Model, ModelRef, TypeRegistry, Value};
//!
//! #[derive(Default)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! impl Model for Counter {}
//!
//! let mut registry = TypeRegistry::new();
//! registry
//!     .register::<Counter>("Counter")
//!     .field(
//!         "Count",
//!         MemberType::Integer,
//!         |c| Value::from(c.count),
//!         |c, v| {
//!             c.count = v.try_into()?;
//!             Ok(())
//!         },
//!     )
//!     .finish()
//!     .unwrap();
//!
//! let serializer = JsonSerializer::new(registry);
//! let bytes = serializer.serialize_to_vec(&ModelRef::new(Counter { count: 3 })).unwrap();
//! assert_eq!(bytes, br#"{"$type":"Counter","$graph_id":1,"Count":3}"#);
//!
//! let counter = serializer.deserialize_as::<Counter>(&bytes[..]).unwrap();
//! assert_eq!(counter.borrow().count, 3);
//! ```

use crate::de::GraphReader;
use crate::format::{BinaryFormat, Format, JsonFormat, XmlFormat};
use crate::member::MemberCache;
use crate::modifier::{ModifierRegistry, SerializerModifier};
use crate::ser::GraphWriter;
use crate::{Error, Model, ModelRef, Node, Result, SerializationConfiguration, SerializationScope, TypeRegistry};
use std::cell::RefCell;
use std::fmt;
use std::io::{Read, Write};
use std::rc::Rc;
use std::sync::Arc;

/// Serializer writing XML documents.
pub type XmlSerializer = Serializer<XmlFormat>;
/// Serializer writing JSON documents.
pub type JsonSerializer = Serializer<JsonFormat>;
/// Serializer writing binary documents.
pub type BinarySerializer = Serializer<BinaryFormat>;

/// Object graph serializer for the format `F`.
pub struct Serializer<F: Format> {
    registry: Arc<TypeRegistry>,
    members: MemberCache,
    modifiers: ModifierRegistry,
    configuration: Arc<SerializationConfiguration>,
    format: F,
}

impl<F: Format> Serializer<F> {
    /// Creates a serializer over a finished registry, with the default configuration.
    pub fn new(registry: impl Into<Arc<TypeRegistry>>) -> Self {
        Serializer {
            registry: registry.into(),
            members: MemberCache::new(),
            modifiers: ModifierRegistry::new(),
            configuration: Arc::new(SerializationConfiguration::default()),
            format: F::default(),
        }
    }

    /// Replaces the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the configuration does not validate.
    pub fn with_configuration(mut self, configuration: SerializationConfiguration) -> Result<Self> {
        configuration.validate()?;
        self.configuration = Arc::new(configuration);
        Ok(self)
    }

    /// Adds a modifier for the model type `T`.
    pub fn add_modifier<T: Model>(&mut self, modifier: impl SerializerModifier + 'static) -> &mut Self {
        self.modifiers.add::<T>(Arc::new(modifier));
        self
    }

    /// Adds a modifier for every model type. Global modifiers run before per-type ones.
    pub fn add_global_modifier(&mut self, modifier: impl SerializerModifier + 'static) -> &mut Self {
        self.modifiers.add_global(Arc::new(modifier));
        self
    }

    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    #[must_use]
    pub fn configuration(&self) -> &SerializationConfiguration {
        &self.configuration
    }

    /// Converts a model graph into its wire-neutral document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredType`] for instances of unregistered types,
    /// [`Error::CircularReference`] for cycles when graph ids are disabled, and
    /// any error raised by a modifier.
    pub fn serialize_to_node(&self, model: &ModelRef) -> Result<Node> {
        self.serialize_to_node_in_scope(model, &SerializationScope::new("serialize"))
    }

    pub fn serialize_to_node_in_scope(&self, model: &ModelRef, scope: &SerializationScope) -> Result<Node> {
        tracing::debug!(
            format = F::NAME,
            scope = scope.name(),
            model = model.rust_type_name(),
            "serializing object graph"
        );
        let node = GraphWriter::new(
            &self.registry,
            &self.members,
            &self.modifiers,
            &self.configuration,
            scope,
        )
        .write_root(model)?;
        tracing::debug!(
            format = F::NAME,
            scope = scope.name(),
            nodes = node.node_count(),
            "serialized object graph"
        );
        Ok(node)
    }

    /// Serializes a model graph into `writer`.
    pub fn serialize<W: Write>(&self, model: &ModelRef, writer: W) -> Result<()> {
        self.serialize_in_scope(model, writer, &SerializationScope::new("serialize"))
    }

    /// Serializes inside a caller-owned scope.
    ///
    /// Instances already written through the same scope are emitted as
    /// reference markers.
    pub fn serialize_in_scope<W: Write>(
        &self,
        model: &ModelRef,
        mut writer: W,
        scope: &SerializationScope,
    ) -> Result<()> {
        let node = self.serialize_to_node_in_scope(model, scope)?;
        self.format
            .write_document(&node, &mut writer, &self.configuration)?;
        writer.flush()?;
        Ok(())
    }

    pub fn serialize_to_vec(&self, model: &ModelRef) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(256);
        self.serialize(model, &mut output)?;
        Ok(output)
    }

    /// Materializes a model graph from a document.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeNotFound`] for type names that are not registered
    /// - [`Error::UnknownReference`] for reference markers without a target
    /// - format errors for malformed input
    pub fn deserialize_node(&self, node: Node) -> Result<ModelRef> {
        self.deserialize_node_in_scope(node, &SerializationScope::new("deserialize"))
    }

    pub fn deserialize_node_in_scope(&self, node: Node, scope: &SerializationScope) -> Result<ModelRef> {
        tracing::debug!(
            format = F::NAME,
            scope = scope.name(),
            nodes = node.node_count(),
            "deserializing object graph"
        );
        let model = self.reader(scope).read_root(node)?;
        tracing::debug!(
            format = F::NAME,
            scope = scope.name(),
            model = model.rust_type_name(),
            "deserialized object graph"
        );
        Ok(model)
    }

    /// Reads a model graph from `reader`.
    pub fn deserialize<R: Read>(&self, reader: R) -> Result<ModelRef> {
        self.deserialize_in_scope(reader, &SerializationScope::new("deserialize"))
    }

    /// Reads inside a caller-owned scope, so reference markers may point at
    /// instances read by earlier calls.
    pub fn deserialize_in_scope<R: Read>(&self, mut reader: R, scope: &SerializationScope) -> Result<ModelRef> {
        let node = self.format.read_document(&mut reader, &self.configuration)?;
        self.deserialize_node_in_scope(node, scope)
    }

    pub fn deserialize_from_slice(&self, bytes: &[u8]) -> Result<ModelRef> {
        self.deserialize(bytes)
    }

    /// Reads a model graph whose root must be a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the root is of another type.
    pub fn deserialize_as<T: Model>(&self, reader: impl Read) -> Result<Rc<RefCell<T>>> {
        let model = self.deserialize(reader)?;
        model.downcast::<T>().ok_or_else(|| {
            Error::type_mismatch("<root>", std::any::type_name::<T>(), model.rust_type_name())
        })
    }

    /// Reads a document into an existing instance.
    ///
    /// Members missing from the document keep their current values.
    pub fn deserialize_into<R: Read>(&self, model: &ModelRef, mut reader: R) -> Result<()> {
        let node = self.format.read_document(&mut reader, &self.configuration)?;
        let scope = SerializationScope::new("deserialize");
        tracing::debug!(
            format = F::NAME,
            model = model.rust_type_name(),
            "deserializing into existing instance"
        );
        self.reader(&scope).read_root_into(node, model)
    }

    fn reader<'a>(&'a self, scope: &'a SerializationScope) -> GraphReader<'a> {
        GraphReader::new(
            &self.registry,
            &self.members,
            &self.modifiers,
            &self.configuration,
            scope,
        )
    }
}

impl<F: Format> fmt::Debug for Serializer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("format", &F::NAME)
            .field("registry", &self.registry)
            .field("modifiers", &self.modifiers)
            .field("configuration", &self.configuration)
            .finish()
    }
}
