//! Registration table for model types.
//!
//! Rust has no runtime reflection, so every model type is registered once with
//! an ordered list of member descriptors. A descriptor carries the member name,
//! its declared [`MemberType`], its [`MemberGroup`] and an accessor pair.
//!
//! # Example
//!
//! ```
//! use serde_graph::{MemberType, Model, TypeRegistry, Value};
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
//! let meta = registry.get_by_name("Counter").unwrap();
//! assert_eq!(meta.members().len(), 1);
//! assert!(registry.get_by_name("Missing").is_err());
//! ```

use crate::node::is_reserved_name;
use crate::{Error, Model, ModelRef, Result, Value};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use num_bigint::BigInt;
use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

type Getter = Arc<dyn Fn(&ModelRef) -> Result<Value> + Send + Sync>;
type Setter = Arc<dyn Fn(&ModelRef, Value) -> Result<()> + Send + Sync>;
type Factory = Arc<dyn Fn() -> ModelRef + Send + Sync>;

// -----------------------------------------------------------------------------
// MemberType

/// Static declared type of a member.
///
/// The engine uses it to coerce loosely typed input (XML text, JSON numbers)
/// and to decide whether an object node needs an explicit type name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberType {
    /// Any value; nested models must carry their type name.
    Any,
    Bool,
    Integer,
    Float,
    String,
    DateTime,
    BigInt,
    List(Box<MemberType>),
    Map(Box<MemberType>),
    Pair(Box<MemberType>, Box<MemberType>),
    /// A model of the named registered type.
    Model(String),
    /// A model of any registered type.
    AnyModel,
}

impl MemberType {
    pub fn model(type_name: impl Into<String>) -> Self {
        MemberType::Model(type_name.into())
    }

    #[must_use]
    pub fn list(item: MemberType) -> Self {
        MemberType::List(Box::new(item))
    }

    #[must_use]
    pub fn map(value: MemberType) -> Self {
        MemberType::Map(Box::new(value))
    }

    #[must_use]
    pub fn pair(key: MemberType, value: MemberType) -> Self {
        MemberType::Pair(Box::new(key), Box::new(value))
    }

    #[must_use]
    pub const fn is_primitive(&self) -> bool {
        matches!(
            self,
            MemberType::Bool
                | MemberType::Integer
                | MemberType::Float
                | MemberType::String
                | MemberType::DateTime
                | MemberType::BigInt
        )
    }

    /// Name used on the wire, e.g. inside key/value pair encodings.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            MemberType::Any => "object".to_string(),
            MemberType::Bool => "bool".to_string(),
            MemberType::Integer => "i64".to_string(),
            MemberType::Float => "f64".to_string(),
            MemberType::String => "String".to_string(),
            MemberType::DateTime => "DateTime".to_string(),
            MemberType::BigInt => "BigInt".to_string(),
            MemberType::List(item) => format!("List<{}>", item.type_name()),
            MemberType::Map(value) => format!("Map<{}>", value.type_name()),
            MemberType::Pair(key, value) => {
                format!("KeyValuePair<{},{}>", key.type_name(), value.type_name())
            }
            MemberType::Model(name) => name.clone(),
            MemberType::AnyModel => "model".to_string(),
        }
    }

    /// Resolves a primitive type name written by [`MemberType::type_name`].
    #[must_use]
    pub fn from_type_name(name: &str) -> Option<MemberType> {
        match name {
            "object" => Some(MemberType::Any),
            "bool" => Some(MemberType::Bool),
            "i64" => Some(MemberType::Integer),
            "f64" => Some(MemberType::Float),
            "String" => Some(MemberType::String),
            "DateTime" => Some(MemberType::DateTime),
            "BigInt" => Some(MemberType::BigInt),
            _ => None,
        }
    }

    /// Parses the invariant text form of a primitive value.
    ///
    /// `Any` keeps the text as a string; non-primitive types yield `None`.
    #[must_use]
    pub fn parse_text(&self, text: &str) -> Option<Value> {
        match self {
            MemberType::Any | MemberType::String => Some(Value::String(text.to_string())),
            MemberType::Bool => text.parse::<bool>().ok().map(Value::Bool),
            MemberType::Integer => text.parse::<i64>().ok().map(Value::from),
            MemberType::Float => text.parse::<f64>().ok().map(Value::from),
            MemberType::DateTime => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc))),
            MemberType::BigInt => text.parse::<BigInt>().ok().map(Value::BigInt),
            _ => None,
        }
    }

    /// Infers the declared type of a primitive runtime value.
    #[must_use]
    pub fn of_value(value: &Value) -> MemberType {
        match value {
            Value::Bool(_) => MemberType::Bool,
            Value::Number(n) if n.is_integer() => MemberType::Integer,
            Value::Number(_) => MemberType::Float,
            Value::String(_) => MemberType::String,
            Value::DateTime(_) => MemberType::DateTime,
            Value::BigInt(_) => MemberType::BigInt,
            Value::Model(_) => MemberType::AnyModel,
            _ => MemberType::Any,
        }
    }
}

impl fmt::Display for MemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

// -----------------------------------------------------------------------------
// MemberDescriptor

/// Where a member's value lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberGroup {
    /// Stored out-of-band in the model's [`PropertyBag`](crate::PropertyBag).
    ManagedProperty,
    /// A property reached through an accessor pair.
    RegularProperty,
    /// A plain field reached through an accessor pair.
    Field,
}

/// One registered member of a model type.
pub struct MemberDescriptor {
    name: String,
    member_type: MemberType,
    group: MemberGroup,
    excluded: bool,
    getter: Getter,
    setter: Setter,
}

impl MemberDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn member_type(&self) -> &MemberType {
        &self.member_type
    }

    #[must_use]
    pub fn group(&self) -> MemberGroup {
        self.group
    }

    /// Excluded members stay registered but are skipped by the serializer.
    #[must_use]
    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    /// Reads the member from a model instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance is not of the registered type.
    pub fn get_value(&self, model: &ModelRef) -> Result<Value> {
        (self.getter)(model)
    }

    /// Writes the member on a model instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] naming this member when the value does not convert.
    pub fn set_value(&self, model: &ModelRef, value: Value) -> Result<()> {
        (self.setter)(model, value).map_err(|err| match err {
            Error::TypeMismatch {
                member,
                expected,
                found,
            } if member.is_empty() => Error::TypeMismatch {
                member: self.name.clone(),
                expected,
                found,
            },
            other => other,
        })
    }
}

impl fmt::Debug for MemberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDescriptor")
            .field("name", &self.name)
            .field("member_type", &self.member_type)
            .field("group", &self.group)
            .field("excluded", &self.excluded)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// TypeMeta

/// Everything the engine knows about one registered model type.
pub struct TypeMeta {
    type_id: TypeId,
    type_name: Arc<str>,
    factory: Factory,
    members: Vec<Arc<MemberDescriptor>>,
}

impl TypeMeta {
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn shared_type_name(&self) -> Arc<str> {
        self.type_name.clone()
    }

    /// Creates a fresh instance to deserialize into.
    #[must_use]
    pub fn create_instance(&self) -> ModelRef {
        (self.factory)()
    }

    /// All registered members, in declaration order.
    #[must_use]
    pub fn members(&self) -> &[Arc<MemberDescriptor>] {
        &self.members
    }

    #[must_use]
    pub fn member(&self, name: &str) -> Option<&Arc<MemberDescriptor>> {
        self.members.iter().find(|member| member.name == name)
    }
}

impl fmt::Debug for TypeMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMeta")
            .field("type_name", &self.type_name)
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// TypeRegistry

/// The central store of registered model types, keyed by `TypeId` and by name.
#[derive(Default)]
pub struct TypeRegistry {
    types: IndexMap<TypeId, Arc<TypeMeta>>,
    names: IndexMap<String, TypeId>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts registering `T`, created through `Default` on deserialization.
    pub fn register<T: Model + Default>(&mut self, name: &str) -> TypeRegistration<'_, T> {
        self.register_with_factory(name, T::default)
    }

    /// Starts registering `T` with a custom instance factory.
    pub fn register_with_factory<T, F>(&mut self, name: &str, factory: F) -> TypeRegistration<'_, T>
    where
        T: Model,
        F: Fn() -> T + Send + Sync + 'static,
    {
        TypeRegistration {
            registry: self,
            name: name.to_string(),
            factory: Arc::new(move || ModelRef::new(factory())),
            members: Vec::new(),
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn get(&self, type_id: TypeId) -> Option<&Arc<TypeMeta>> {
        self.types.get(&type_id)
    }

    /// Resolves a type name from the input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] for names that were never registered.
    pub fn get_by_name(&self, name: &str) -> Result<&Arc<TypeMeta>> {
        self.names
            .get(name)
            .and_then(|type_id| self.types.get(type_id))
            .ok_or_else(|| Error::type_not_found(name))
    }

    /// Metadata of a model instance's concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredType`] if the instance's type was never registered.
    pub fn meta_of(&self, model: &ModelRef) -> Result<&Arc<TypeMeta>> {
        self.get(model.model_type_id())
            .ok_or_else(|| Error::UnregisteredType(model.rust_type_name().to_string()))
    }

    #[must_use]
    pub fn contains<T: Model>(&self) -> bool {
        self.types.contains_key(&TypeId::of::<T>())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registered names, in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names.keys()).finish()
    }
}

// -----------------------------------------------------------------------------
// TypeRegistration

/// Builder returned by [`TypeRegistry::register`].
#[must_use = "call `finish` to add the type to the registry"]
pub struct TypeRegistration<'r, T: Model> {
    registry: &'r mut TypeRegistry,
    name: String,
    factory: Factory,
    members: Vec<MemberDescriptor>,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, T: Model> TypeRegistration<'r, T> {
    /// Adds a field reached through a typed accessor pair.
    pub fn field<G, S>(self, name: &str, member_type: MemberType, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
        S: Fn(&mut T, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.accessor(name, member_type, MemberGroup::Field, get, set)
    }

    /// Adds a regular property reached through a typed accessor pair.
    pub fn regular_property<G, S>(self, name: &str, member_type: MemberType, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
        S: Fn(&mut T, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.accessor(name, member_type, MemberGroup::RegularProperty, get, set)
    }

    /// Adds a managed property stored in the model's property bag.
    ///
    /// Reading a property that was never set yields `default()`.
    pub fn property<D>(mut self, name: &str, member_type: MemberType, default: D) -> Self
    where
        D: Fn() -> Value + Send + Sync + 'static,
    {
        let get_name = name.to_string();
        let set_name = name.to_string();
        let type_name = self.name.clone();
        self.members.push(MemberDescriptor {
            name: name.to_string(),
            member_type,
            group: MemberGroup::ManagedProperty,
            excluded: false,
            getter: Arc::new(move |model: &ModelRef| {
                let stored = model
                    .borrow()
                    .property_bag()
                    .and_then(|bag| bag.get(&get_name).cloned());
                Ok(stored.unwrap_or_else(&default))
            }),
            setter: Arc::new(move |model: &ModelRef, value: Value| {
                let mut borrowed = model.borrow_mut();
                let bag = borrowed.property_bag_mut().ok_or_else(|| {
                    Error::invalid_argument(format!("type '{}' has no property bag", type_name))
                })?;
                bag.set(set_name.clone(), value);
                Ok(())
            }),
        });
        self
    }

    /// Marks the member added last as not serialized.
    pub fn exclude_from_serialization(mut self) -> Self {
        if let Some(member) = self.members.last_mut() {
            member.excluded = true;
        }
        self
    }

    fn accessor<G, S>(
        mut self,
        name: &str,
        member_type: MemberType,
        group: MemberGroup,
        get: G,
        set: S,
    ) -> Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
        S: Fn(&mut T, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.members.push(MemberDescriptor {
            name: name.to_string(),
            member_type,
            group,
            excluded: false,
            getter: Arc::new(move |model: &ModelRef| {
                let typed = downcast::<T>(model)?;
                let value = get(&typed.borrow());
                Ok(value)
            }),
            setter: Arc::new(move |model: &ModelRef, value: Value| {
                let typed = downcast::<T>(model)?;
                let result = set(&mut typed.borrow_mut(), value);
                result
            }),
        });
        self
    }

    /// Validates the registration and adds it to the registry.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for an empty, already registered or `;`-containing
    ///   type name, reserved member names, or managed properties on a model without a property bag
    /// - [`Error::DuplicateMember`] when two members share a name
    pub fn finish(self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_argument("type name must not be empty"));
        }
        // XML lists known types separated by ';'
        if self.name.contains(';') {
            return Err(Error::invalid_argument(format!(
                "type name '{}' must not contain ';'",
                self.name
            )));
        }
        if self.registry.names.contains_key(&self.name) {
            return Err(Error::invalid_argument(format!(
                "type name '{}' is already registered",
                self.name
            )));
        }
        if self.registry.types.contains_key(&TypeId::of::<T>()) {
            return Err(Error::invalid_argument(format!(
                "{} is already registered",
                std::any::type_name::<T>()
            )));
        }

        let mut seen = HashSet::new();
        for member in &self.members {
            if member.name.is_empty() || is_reserved_name(&member.name) {
                return Err(Error::invalid_argument(format!(
                    "member name '{}' on type '{}' is reserved",
                    member.name, self.name
                )));
            }
            if !seen.insert(member.name.as_str()) {
                return Err(Error::DuplicateMember {
                    type_name: self.name.clone(),
                    member: member.name.clone(),
                });
            }
        }

        let has_managed = self
            .members
            .iter()
            .any(|member| member.group == MemberGroup::ManagedProperty);
        if has_managed && (self.factory)().borrow().property_bag().is_none() {
            return Err(Error::invalid_argument(format!(
                "type '{}' declares managed properties but has no property bag",
                self.name
            )));
        }

        let meta = TypeMeta {
            type_id: TypeId::of::<T>(),
            type_name: Arc::from(self.name.as_str()),
            factory: self.factory,
            members: self.members.into_iter().map(Arc::new).collect(),
        };
        tracing::trace!(
            type_name = %meta.type_name,
            members = meta.members.len(),
            "registered model type"
        );
        self.registry.names.insert(self.name, TypeId::of::<T>());
        self.registry.types.insert(TypeId::of::<T>(), Arc::new(meta));
        Ok(())
    }
}

fn downcast<T: Model>(model: &ModelRef) -> Result<std::rc::Rc<std::cell::RefCell<T>>> {
    model.downcast::<T>().ok_or_else(|| {
        Error::type_mismatch(
            "",
            std::any::type_name::<T>(),
            model.rust_type_name(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PropertyBag;

    #[derive(Default)]
    struct Plain {
        count: i64,
    }

    impl Model for Plain {}

    #[derive(Default)]
    struct Managed {
        bag: PropertyBag,
    }

    impl Model for Managed {
        fn property_bag(&self) -> Option<&PropertyBag> {
            Some(&self.bag)
        }

        fn property_bag_mut(&mut self) -> Option<&mut PropertyBag> {
            Some(&mut self.bag)
        }
    }

    fn count_field<'r>(
        registration: TypeRegistration<'r, Plain>,
        name: &str,
    ) -> TypeRegistration<'r, Plain> {
        registration.field(
            name,
            MemberType::Integer,
            |p| Value::from(p.count),
            |p, v| {
                p.count = v.try_into()?;
                Ok(())
            },
        )
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let mut registry = TypeRegistry::new();
        let registration = registry.register::<Plain>("Plain");
        let registration = count_field(registration, "Count");
        let err = count_field(registration, "Count").finish().unwrap_err();
        assert!(matches!(err, Error::DuplicateMember { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reserved_member_rejected() {
        let mut registry = TypeRegistry::new();
        let registration = registry.register::<Plain>("Plain");
        let err = count_field(registration, "$graph_id").finish().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_type_name_with_separator_rejected() {
        let mut registry = TypeRegistry::new();
        let err = count_field(registry.register::<Plain>("A;B"), "Count")
            .finish()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref msg) if msg.contains(';')));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_managed_property_requires_bag() {
        let mut registry = TypeRegistry::new();
        let err = registry
            .register::<Plain>("Plain")
            .property("Name", MemberType::String, || Value::Null)
            .finish()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_managed_property_default_and_set() {
        let mut registry = TypeRegistry::new();
        registry
            .register::<Managed>("Managed")
            .property("Name", MemberType::String, || Value::from("unnamed"))
            .finish()
            .unwrap();

        let meta = registry.get_by_name("Managed").unwrap();
        let model = meta.create_instance();
        let member = meta.member("Name").unwrap();
        assert_eq!(member.group(), MemberGroup::ManagedProperty);
        assert_eq!(member.get_value(&model).unwrap(), Value::from("unnamed"));
        member.set_value(&model, Value::from("set")).unwrap();
        assert_eq!(member.get_value(&model).unwrap(), Value::from("set"));
    }

    #[test]
    fn test_setter_mismatch_names_member() {
        let mut registry = TypeRegistry::new();
        count_field(registry.register::<Plain>("Plain"), "Count")
            .finish()
            .unwrap();
        let meta = registry.get_by_name("Plain").unwrap();
        let model = meta.create_instance();
        let err = meta.members()[0]
            .set_value(&model, Value::from("three"))
            .unwrap_err();
        match err {
            Error::TypeMismatch { member, .. } => assert_eq!(member, "Count"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_meta_of_unregistered() {
        let registry = TypeRegistry::new();
        let err = registry.meta_of(&ModelRef::new(Plain::default())).unwrap_err();
        assert!(matches!(err, Error::UnregisteredType(_)));
    }

    #[test]
    fn test_type_name_round_trip() {
        for member_type in [
            MemberType::Bool,
            MemberType::Integer,
            MemberType::Float,
            MemberType::String,
            MemberType::DateTime,
            MemberType::BigInt,
        ] {
            assert_eq!(
                MemberType::from_type_name(&member_type.type_name()),
                Some(member_type)
            );
        }
        assert_eq!(MemberType::from_type_name("Nope"), None);
        assert_eq!(MemberType::Float.parse_text("-Infinity"), Some(Value::from(f64::NEG_INFINITY)));
        assert_eq!(MemberType::Integer.parse_text("1.5"), None);
        assert_eq!(
            MemberType::pair(MemberType::String, MemberType::Integer).to_string(),
            "KeyValuePair<String,i64>"
        );
    }
}
