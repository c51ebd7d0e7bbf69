//! [`Node`] document to model graph.
//!
//! [`GraphReader`] materializes instances in document order. An object or
//! list carrying a graph id is bound to that id before its members are read,
//! so a [`Node::Reference`] further down (including one that closes a cycle)
//! resolves to the instance under construction.
//!
//! Input is coerced leniently against the declared member type: text formats
//! carry numbers, dates and big integers as text, and a JSON float with no
//! fraction is accepted for an integer member. Typed date, big integer and
//! pair nodes are read as such whatever the declared type. The member setter has the last
//! word and rejects what still does not fit.

use crate::member::{MemberCache, MemberValue};
use crate::modifier::{run_deserialize_modifiers, ModifierRegistry};
use crate::registry::TypeMeta;
use crate::{
    ContextMode, Error, MemberType, ModelRef, Node, NodeMap, Number, Result,
    SerializationConfiguration, SerializationContext, SerializationScope, TypeRegistry, Value,
};
use indexmap::IndexMap;
use num_bigint::BigInt;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

static ANY: MemberType = MemberType::Any;

/// Converts one [`Node`] document into a model graph.
pub struct GraphReader<'a> {
    registry: &'a TypeRegistry,
    members: &'a MemberCache,
    modifiers: &'a ModifierRegistry,
    configuration: &'a Arc<SerializationConfiguration>,
    scope: &'a SerializationScope,
}

impl<'a> GraphReader<'a> {
    pub(crate) fn new(
        registry: &'a TypeRegistry,
        members: &'a MemberCache,
        modifiers: &'a ModifierRegistry,
        configuration: &'a Arc<SerializationConfiguration>,
        scope: &'a SerializationScope,
    ) -> Self {
        GraphReader {
            registry,
            members,
            modifiers,
            configuration,
            scope,
        }
    }

    /// Reads the root object into a new instance of the type it names.
    pub fn read_root(&mut self, node: Node) -> Result<ModelRef> {
        match self.read_value(node, &MemberType::AnyModel)? {
            Value::Model(model) => Ok(model),
            other => Err(Error::unsupported_value(format!(
                "document root is a {}, expected a model",
                other.kind()
            ))),
        }
    }

    /// Reads the root object into an existing instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the document names a different type.
    pub fn read_root_into(&mut self, node: Node, target: &ModelRef) -> Result<()> {
        let kind = node.kind();
        let Node::Object {
            type_name,
            graph_id,
            members,
        } = node
        else {
            return Err(Error::unsupported_value(format!(
                "document root is a {} node, expected an object",
                kind
            )));
        };

        let registry = self.registry;
        let meta = registry.meta_of(target)?;
        if let Some(name) = type_name.as_deref() {
            if name != meta.type_name() {
                return Err(Error::type_mismatch("<root>", meta.type_name(), name));
            }
        }
        self.bind(graph_id, &Value::Model(target.clone()))?;
        self.read_members(target, meta, members)
    }

    /// Reads one node against its declared member type.
    pub fn read_value(&mut self, node: Node, declared: &MemberType) -> Result<Value> {
        match node {
            Node::Null => Ok(Value::Null),
            Node::Bool(b) => Ok(Value::Bool(b)),
            Node::Number(n) => Ok(coerce_number(n, declared)),
            Node::Text(text) => Ok(coerce_text(text, declared)),
            Node::DateTime(dt) => Ok(Value::DateTime(dt)),
            Node::BigInt(big) => Ok(Value::BigInt(big)),
            Node::Pair(key, item) => {
                let (key_type, item_type) = match declared {
                    MemberType::Pair(key_type, item_type) => (&**key_type, &**item_type),
                    _ => (&ANY, &ANY),
                };
                let key = self.read_value(*key, key_type)?;
                let item = self.read_value(*item, item_type)?;
                Ok(Value::pair(key, item))
            }
            Node::List { graph_id, items } => self.read_list(graph_id, items, declared),
            Node::Object {
                type_name: None,
                graph_id: None,
                members,
            } if matches!(declared, MemberType::Any | MemberType::Map(_)) => {
                self.read_map(members, declared)
            }
            Node::Object {
                type_name,
                graph_id,
                members,
            } => self.read_object(type_name, graph_id, members, declared),
            Node::Reference(id) => {
                let value = self.scope.reference_manager().resolve(id)?;
                tracing::trace!(id, kind = value.kind(), "resolved reference marker");
                Ok(value)
            }
        }
    }

    fn bind(&self, graph_id: Option<u32>, value: &Value) -> Result<()> {
        match graph_id {
            Some(id) => self.scope.reference_manager().register_manually(id, value),
            None => Ok(()),
        }
    }

    fn read_list(&mut self, graph_id: Option<u32>, items: Vec<Node>, declared: &MemberType) -> Result<Value> {
        if let (MemberType::Pair(key_type, item_type), None, 2) = (declared, graph_id, items.len()) {
            let mut items = items.into_iter();
            let key = self.read_value(items.next().unwrap_or_default(), key_type)?;
            let item = self.read_value(items.next().unwrap_or_default(), item_type)?;
            return Ok(Value::pair(key, item));
        }

        let item_type = match declared {
            MemberType::List(item_type) => &**item_type,
            _ => &ANY,
        };
        let list = Rc::new(RefCell::new(Vec::with_capacity(items.len())));
        let value = Value::List(list.clone());
        self.bind(graph_id, &value)?;
        for item in items {
            let item = self.read_value(item, item_type)?;
            list.borrow_mut().push(item);
        }
        Ok(value)
    }

    fn read_map(&mut self, members: NodeMap, declared: &MemberType) -> Result<Value> {
        let item_type = match declared {
            MemberType::Map(item_type) => &**item_type,
            _ => &ANY,
        };
        let mut map = IndexMap::with_capacity(members.len());
        for (name, node) in members {
            map.insert(name, self.read_value(node, item_type)?);
        }
        Ok(Value::Map(map))
    }

    fn read_object(
        &mut self,
        type_name: Option<String>,
        graph_id: Option<u32>,
        members: NodeMap,
        declared: &MemberType,
    ) -> Result<Value> {
        let name = match (type_name.as_deref(), declared) {
            (Some(name), _) => name,
            (None, MemberType::Model(name)) => name.as_str(),
            (None, _) => {
                return Err(Error::unsupported_value(format!(
                    "object without a type name where a {} is expected",
                    declared
                )))
            }
        };
        let registry = self.registry;
        let meta = registry.get_by_name(name)?;

        let model = meta.create_instance();
        let value = Value::Model(model.clone());
        self.bind(graph_id, &value)?;
        self.read_members(&model, meta, members)?;
        Ok(value)
    }

    fn read_members(&mut self, model: &ModelRef, meta: &TypeMeta, mut members: NodeMap) -> Result<()> {
        let context = SerializationContext::new(
            model,
            meta,
            ContextMode::Deserialize,
            (),
            self.scope,
            self.configuration.clone(),
        )?;
        let modifiers = self.modifiers.modifiers_for(meta.type_id());
        for modifier in modifiers.iter() {
            modifier.on_deserializing(context.frame(), model)?;
        }

        for descriptor in self.members.serializable_members(meta).iter() {
            // absent members keep the value the factory gave them
            let Some(node) = members.remove(descriptor.name()) else {
                continue;
            };
            let value = self.read_value(node, descriptor.member_type())?;
            let mut member = MemberValue::from_descriptor(descriptor, value);
            if modifiers
                .iter()
                .any(|modifier| modifier.should_ignore_member(context.frame(), &member))
            {
                continue;
            }
            run_deserialize_modifiers(&modifiers, context.frame(), &mut member)?;
            descriptor.set_value(model, member.value)?;
        }

        for name in members.keys() {
            if meta.member(name).is_none() {
                tracing::warn!(
                    type_name = meta.type_name(),
                    member = %name,
                    "skipping unknown member"
                );
            }
        }

        for modifier in modifiers.iter() {
            modifier.on_deserialized(context.frame(), model)?;
        }
        Ok(())
    }
}

fn coerce_number(number: Number, declared: &MemberType) -> Value {
    match (declared, number) {
        (MemberType::Float, Number::Integer(i)) => Value::from(i as f64),
        (MemberType::Integer, Number::Float(_)) => number
            .as_i64()
            .map_or(Value::Number(number), Value::from),
        (MemberType::BigInt, Number::Integer(i)) => Value::BigInt(BigInt::from(i)),
        _ => Value::Number(number),
    }
}

fn coerce_text(text: String, declared: &MemberType) -> Value {
    if declared.is_primitive() {
        if let Some(value) = declared.parse_text(&text) {
            return value;
        }
    }
    Value::String(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Model;

    #[derive(Default)]
    struct Vertex {
        label: String,
        weight: f64,
        next: Option<Rc<RefCell<Vertex>>>,
        tags: Option<crate::SharedList>,
    }

    impl Model for Vertex {}

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register::<Vertex>("Vertex")
            .field(
                "Label",
                MemberType::String,
                |n| Value::from(n.label.clone()),
                |n, v| {
                    n.label = v.try_into()?;
                    Ok(())
                },
            )
            .field(
                "Weight",
                MemberType::Float,
                |n| Value::from(n.weight),
                |n, v| {
                    n.weight = v.try_into()?;
                    Ok(())
                },
            )
            .field(
                "Next",
                MemberType::model("Vertex"),
                |n| n.next.clone().map(ModelRef::from).into(),
                |n, v| {
                    n.next = v.into_model()?;
                    Ok(())
                },
            )
            .field(
                "Tags",
                MemberType::list(MemberType::String),
                |n| n.tags.clone().into(),
                |n, v| {
                    n.tags = v.into_list()?;
                    Ok(())
                },
            )
            .finish()
            .unwrap();
        registry
    }

    fn read(node: Node) -> Result<ModelRef> {
        let registry = registry();
        let members = MemberCache::new();
        let modifiers = ModifierRegistry::new();
        let configuration = Arc::new(SerializationConfiguration::default());
        let scope = SerializationScope::new("test");
        let model = GraphReader::new(&registry, &members, &modifiers, &configuration, &scope)
            .read_root(node);
        assert_eq!(scope.depth(), 0);
        model
    }

    fn object(type_name: Option<&str>, graph_id: Option<u32>, members: Vec<(&str, Node)>) -> Node {
        Node::object(
            type_name,
            graph_id,
            members
                .into_iter()
                .map(|(name, node)| (name.to_string(), node))
                .collect(),
        )
    }

    #[test]
    fn test_text_is_coerced_to_declared_type() {
        let node = object(
            Some("Vertex"),
            None,
            vec![("Label", Node::from("a")), ("Weight", Node::from("2.5"))],
        );
        let model = read(node).unwrap();
        let typed = model.downcast::<Vertex>().unwrap();
        assert_eq!(typed.borrow().label, "a");
        assert_eq!(typed.borrow().weight, 2.5);
    }

    #[test]
    fn test_cycle_resolves_to_instance_under_construction() {
        let node = object(
            Some("Vertex"),
            Some(1),
            vec![(
                "Next",
                object(None, Some(2), vec![("Next", Node::Reference(1))]),
            )],
        );
        let model = read(node).unwrap();
        let root = model.downcast::<Vertex>().unwrap();
        let next = root.borrow().next.clone().unwrap();
        let back = next.borrow().next.clone().unwrap();
        assert!(Rc::ptr_eq(&root, &back));
        next.borrow_mut().next = None;
    }

    #[test]
    fn test_shared_list_identity() {
        let tags = Node::list(Some(3), vec![Node::from("x")]);
        let node = object(
            Some("Vertex"),
            Some(1),
            vec![
                ("Tags", tags),
                (
                    "Next",
                    object(None, Some(2), vec![("Tags", Node::Reference(3))]),
                ),
            ],
        );
        let model = read(node).unwrap();
        let root = model.downcast::<Vertex>().unwrap();
        let root_tags = root.borrow().tags.clone().unwrap();
        let next = root.borrow().next.clone().unwrap();
        let next_tags = next.borrow().tags.clone().unwrap();
        assert!(Rc::ptr_eq(&root_tags, &next_tags));
        assert_eq!(*root_tags.borrow(), vec![Value::from("x")]);
    }

    #[test]
    fn test_unknown_reference() {
        let node = object(Some("Vertex"), None, vec![("Next", Node::Reference(7))]);
        assert!(matches!(read(node), Err(Error::UnknownReference { id: 7 })));
    }

    #[test]
    fn test_unknown_type_name() {
        let node = object(Some("Missing.Type"), None, vec![]);
        let err = read(node).unwrap_err();
        assert_eq!(err.to_string(), "Cannot find type 'Missing.Type'");
    }

    #[test]
    fn test_unknown_members_are_skipped() {
        let node = object(
            Some("Vertex"),
            None,
            vec![("Label", Node::from("kept")), ("Removed", Node::from(1))],
        );
        let model = read(node).unwrap();
        assert_eq!(model.downcast::<Vertex>().unwrap().borrow().label, "kept");
    }

    #[test]
    fn test_setter_rejects_wrong_kind() {
        let node = object(Some("Vertex"), None, vec![("Weight", Node::from("heavy"))]);
        let err = read(node).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref member, .. } if member == "Weight"));
    }
}
