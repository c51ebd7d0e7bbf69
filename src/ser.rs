//! Model graph to [`Node`] document.
//!
//! [`GraphWriter`] walks a model graph depth-first in member declaration
//! order. Every model instance is entered through a [`SerializationContext`],
//! so lifecycle hooks and the scope's stacks follow the traversal exactly.
//!
//! Shared instances are written once: the first encounter carries the graph id
//! handed out by the scope's reference manager, later encounters become
//! [`Node::Reference`] markers. With graph ids disabled, instances are written
//! in full every time and a cycle is an error.

use crate::member::MemberCache;
use crate::modifier::{run_serialize_modifiers, ModifierRegistry};
use crate::registry::TypeMeta;
use crate::{
    ContextMode, Error, MemberType, ModelRef, Node, NodeMap, Result, SerializationConfiguration,
    SerializationContext, SerializationScope, SharedList, TypeRegistry, Value,
};
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

static ANY: MemberType = MemberType::Any;

/// Outcome of looking an instance up in the reference manager.
enum Tracking {
    First(u32),
    Repeat(u32),
    Untracked,
}

/// Converts one model graph into a [`Node`] document.
pub struct GraphWriter<'a> {
    registry: &'a TypeRegistry,
    members: &'a MemberCache,
    modifiers: &'a ModifierRegistry,
    configuration: &'a Arc<SerializationConfiguration>,
    scope: &'a SerializationScope,
    in_progress: HashSet<usize>,
}

impl<'a> GraphWriter<'a> {
    pub(crate) fn new(
        registry: &'a TypeRegistry,
        members: &'a MemberCache,
        modifiers: &'a ModifierRegistry,
        configuration: &'a Arc<SerializationConfiguration>,
        scope: &'a SerializationScope,
    ) -> Self {
        GraphWriter {
            registry,
            members,
            modifiers,
            configuration,
            scope,
            in_progress: HashSet::new(),
        }
    }

    /// Writes the root model. The root node always carries its type name.
    pub fn write_root(&mut self, model: &ModelRef) -> Result<Node> {
        self.write_value(&Value::Model(model.clone()), &MemberType::AnyModel)
    }

    /// Writes one value against its declared member type.
    pub fn write_value(&mut self, value: &Value, declared: &MemberType) -> Result<Node> {
        match value {
            Value::Null => Ok(Node::Null),
            Value::Bool(b) => Ok(Node::Bool(*b)),
            Value::Number(n) => Ok(Node::Number(*n)),
            Value::String(s) => Ok(Node::Text(s.clone())),
            // dates, big integers and pairs keep their kind on the wire unless
            // the declared type already names it
            Value::DateTime(dt) => Ok(match declared {
                MemberType::DateTime => Node::Text(dt.to_rfc3339()),
                _ => Node::DateTime(*dt),
            }),
            Value::BigInt(big) => Ok(match declared {
                MemberType::BigInt => Node::Text(big.to_string()),
                _ => Node::BigInt(big.clone()),
            }),
            Value::Pair(key, item) => match declared {
                MemberType::Pair(key_type, item_type) => {
                    let key = self.write_value(key, key_type)?;
                    let item = self.write_value(item, item_type)?;
                    Ok(Node::list(None, vec![key, item]))
                }
                _ => {
                    let key = self.write_value(key, &ANY)?;
                    let item = self.write_value(item, &ANY)?;
                    Ok(Node::Pair(Box::new(key), Box::new(item)))
                }
            },
            Value::Map(map) => {
                let item_type = match declared {
                    MemberType::Map(item_type) => &**item_type,
                    _ => &ANY,
                };
                let mut members = NodeMap::with_capacity(map.len());
                for (name, item) in map {
                    members.insert(name.clone(), self.write_value(item, item_type)?);
                }
                Ok(Node::object(None, None, members))
            }
            Value::List(list) => self.write_list(value, list, declared),
            Value::Model(model) => self.write_model(value, model, declared),
        }
    }

    fn track(&self, value: &Value) -> Tracking {
        let mut manager = self.scope.reference_manager();
        match manager.get_info(value, self.configuration.auto_generate_graph_ids) {
            Some(info) if info.is_first_usage() => Tracking::First(info.id()),
            Some(info) => {
                tracing::trace!(id = info.id(), kind = value.kind(), "wrote reference marker");
                Tracking::Repeat(info.id())
            }
            None => Tracking::Untracked,
        }
    }

    fn write_list(&mut self, value: &Value, list: &SharedList, declared: &MemberType) -> Result<Node> {
        let graph_id = match self.track(value) {
            Tracking::Repeat(id) => return Ok(Node::Reference(id)),
            Tracking::First(id) => Some(id),
            Tracking::Untracked => None,
        };
        let identity = Rc::as_ptr(list) as *const () as usize;
        if !self.in_progress.insert(identity) {
            return Err(Error::CircularReference {
                type_name: "list".to_string(),
            });
        }

        let item_type = match declared {
            MemberType::List(item_type) => &**item_type,
            _ => &ANY,
        };
        // items are cloned so the list is not borrowed while members run
        let items: Vec<Value> = list.borrow().clone();
        let written: Result<Vec<Node>> = items
            .iter()
            .map(|item| self.write_value(item, item_type))
            .collect();
        self.in_progress.remove(&identity);
        Ok(Node::list(graph_id, written?))
    }

    fn write_model(&mut self, value: &Value, model: &ModelRef, declared: &MemberType) -> Result<Node> {
        let registry = self.registry;
        let meta = registry.meta_of(model)?;
        let graph_id = match self.track(value) {
            Tracking::Repeat(id) => return Ok(Node::Reference(id)),
            Tracking::First(id) => Some(id),
            Tracking::Untracked => None,
        };

        let identity = model.identity();
        if !self.in_progress.insert(identity) {
            return Err(Error::CircularReference {
                type_name: meta.type_name().to_string(),
            });
        }
        let members = self.write_members(model, meta);
        self.in_progress.remove(&identity);

        let type_name = match declared {
            MemberType::Model(name) if name == meta.type_name() => None,
            _ => Some(meta.type_name()),
        };
        Ok(Node::object(type_name, graph_id, members?))
    }

    fn write_members(&mut self, model: &ModelRef, meta: &TypeMeta) -> Result<NodeMap> {
        let mut context = SerializationContext::new(
            model,
            meta,
            ContextMode::Serialize,
            NodeMap::with_capacity(meta.members().len()),
            self.scope,
            self.configuration.clone(),
        )?;
        let modifiers = self.modifiers.modifiers_for(meta.type_id());
        for modifier in modifiers.iter() {
            modifier.on_serializing(context.frame(), model)?;
        }

        for member in self.members.member_values(model, meta) {
            let mut member = member?;
            if modifiers
                .iter()
                .any(|modifier| modifier.should_ignore_member(context.frame(), &member))
            {
                continue;
            }
            run_serialize_modifiers(&modifiers, context.frame(), &mut member)?;
            let node = self.write_value(&member.value, &member.member_type)?;
            context.context_info_mut().insert(member.name, node);
        }

        for modifier in modifiers.iter() {
            modifier.on_serialized(context.frame(), model)?;
        }
        Ok(context.take_context_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Model;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Leaf {
        count: i64,
    }

    impl Model for Leaf {}

    #[derive(Default)]
    struct Branch {
        left: Option<Rc<RefCell<Leaf>>>,
        right: Option<Rc<RefCell<Leaf>>>,
        next: Option<Rc<RefCell<Branch>>>,
    }

    impl Model for Branch {}

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register::<Leaf>("Leaf")
            .field(
                "Count",
                MemberType::Integer,
                |l| Value::from(l.count),
                |l, v| {
                    l.count = v.try_into()?;
                    Ok(())
                },
            )
            .finish()
            .unwrap();
        registry
            .register::<Branch>("Branch")
            .field(
                "Left",
                MemberType::model("Leaf"),
                |b| b.left.clone().map(ModelRef::from).into(),
                |b, v| {
                    b.left = v.into_model()?;
                    Ok(())
                },
            )
            .field(
                "Right",
                MemberType::AnyModel,
                |b| b.right.clone().map(ModelRef::from).into(),
                |b, v| {
                    b.right = v.into_model()?;
                    Ok(())
                },
            )
            .field(
                "Next",
                MemberType::model("Branch"),
                |b| b.next.clone().map(ModelRef::from).into(),
                |b, v| {
                    b.next = v.into_model()?;
                    Ok(())
                },
            )
            .finish()
            .unwrap();
        registry
    }

    fn write(model: &ModelRef, configuration: SerializationConfiguration) -> Result<Node> {
        let registry = registry();
        let members = MemberCache::new();
        let modifiers = ModifierRegistry::new();
        let configuration = Arc::new(configuration);
        let scope = SerializationScope::new("test");
        let node = GraphWriter::new(&registry, &members, &modifiers, &configuration, &scope)
            .write_root(model);
        assert_eq!(scope.depth(), 0);
        node
    }

    #[test]
    fn test_shared_instance_becomes_reference() {
        let leaf = Rc::new(RefCell::new(Leaf { count: 3 }));
        let branch = ModelRef::new(Branch {
            left: Some(leaf.clone()),
            right: Some(leaf),
            next: None,
        });

        let node = write(&branch, SerializationConfiguration::default()).unwrap();
        assert_eq!(node.type_name(), Some("Branch"));
        assert_eq!(node.graph_id(), Some(1));

        let left = node.get("Left").unwrap();
        assert_eq!(left.type_name(), None);
        assert_eq!(left.graph_id(), Some(2));
        assert_eq!(left.get("Count"), Some(&Node::from(3)));
        assert_eq!(node.get("Right"), Some(&Node::Reference(2)));
        assert_eq!(node.get("Next"), Some(&Node::Null));
    }

    #[test]
    fn test_declared_any_model_keeps_type_name() {
        let branch = ModelRef::new(Branch {
            right: Some(Rc::new(RefCell::new(Leaf::default()))),
            ..Default::default()
        });
        let node = write(&branch, SerializationConfiguration::default()).unwrap();
        assert_eq!(node.get("Right").unwrap().type_name(), Some("Leaf"));
    }

    #[test]
    fn test_without_graph_ids_repeats_are_written_in_full() {
        let leaf = Rc::new(RefCell::new(Leaf { count: 1 }));
        let branch = ModelRef::new(Branch {
            left: Some(leaf.clone()),
            right: Some(leaf),
            next: None,
        });
        let node = write(&branch, SerializationConfiguration::new().with_graph_ids(false)).unwrap();
        assert_eq!(node.graph_id(), None);
        assert_eq!(node.get("Right").unwrap().get("Count"), Some(&Node::from(1)));
    }

    #[test]
    fn test_cycle() {
        let first = Rc::new(RefCell::new(Branch::default()));
        let second = Rc::new(RefCell::new(Branch::default()));
        first.borrow_mut().next = Some(second.clone());
        second.borrow_mut().next = Some(first.clone());
        let root = ModelRef::from(first.clone());

        let node = write(&root, SerializationConfiguration::default()).unwrap();
        assert_eq!(node.get("Next").unwrap().get("Next"), Some(&Node::Reference(1)));

        let err = write(&root, SerializationConfiguration::new().with_graph_ids(false)).unwrap_err();
        assert!(matches!(err, Error::CircularReference { ref type_name } if type_name == "Branch"));

        // break the cycle so both allocations are freed
        second.borrow_mut().next = None;
    }

    #[test]
    fn test_kind_is_kept_unless_declared() {
        let registry = registry();
        let members = MemberCache::new();
        let modifiers = ModifierRegistry::new();
        let configuration = Arc::new(SerializationConfiguration::default());
        let scope = SerializationScope::new("test");
        let mut writer = GraphWriter::new(&registry, &members, &modifiers, &configuration, &scope);

        let big = Value::BigInt(num_bigint::BigInt::from(7));
        assert_eq!(
            writer.write_value(&big, &MemberType::BigInt).unwrap(),
            Node::from("7")
        );
        assert_eq!(
            writer.write_value(&big, &MemberType::Any).unwrap(),
            Node::BigInt(num_bigint::BigInt::from(7))
        );

        let pair = Value::pair(Value::from(1), Value::from("x"));
        let declared = MemberType::pair(MemberType::Integer, MemberType::String);
        assert_eq!(
            writer.write_value(&pair, &declared).unwrap(),
            Node::list(None, vec![Node::from(1), Node::from("x")])
        );
        assert_eq!(
            writer.write_value(&pair, &MemberType::list(MemberType::Any)).unwrap(),
            Node::Pair(Box::new(Node::from(1)), Box::new(Node::from("x")))
        );
    }

    #[test]
    fn test_unregistered_model() {
        #[derive(Default)]
        struct Stranger;
        impl Model for Stranger {}

        let err = write(&ModelRef::new(Stranger), SerializationConfiguration::default()).unwrap_err();
        assert!(matches!(err, Error::UnregisteredType(_)));
    }
}
