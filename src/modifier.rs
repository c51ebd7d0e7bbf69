//! Serializer modifiers.
//!
//! A modifier hooks into the member pipeline of the types it is registered
//! for. Global modifiers run first, then the per-type ones, each group in
//! registration order. Every hook has a no-op default, so a modifier only
//! implements what it needs.
//!
//! ```rust
//! use serde_graph::{ContextFrame, MemberValue, Result, SerializerModifier, Value};
//!
//! struct Uppercase;
//!
//! impl SerializerModifier for Uppercase {
//!     fn serialize_member(&self, _context: &ContextFrame, member: &mut MemberValue) -> Result<()> {
//!         if let Value::String(s) = &mut member.value {
//!             *s = s.to_uppercase();
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use crate::{ContextFrame, Error, MemberType, MemberValue, Model, ModelRef, Result, Value};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Per-member and per-instance hooks around (de)serialization.
pub trait SerializerModifier: Send + Sync {
    /// Returning `true` leaves the member out of the output entirely.
    fn should_ignore_member(&self, _context: &ContextFrame, _member: &MemberValue) -> bool {
        false
    }

    /// Rewrites a member value before it is written.
    fn serialize_member(&self, _context: &ContextFrame, _member: &mut MemberValue) -> Result<()> {
        Ok(())
    }

    /// Rewrites a member value after it is read, before it is committed.
    fn deserialize_member(&self, _context: &ContextFrame, _member: &mut MemberValue) -> Result<()> {
        Ok(())
    }

    fn on_serializing(&self, _context: &ContextFrame, _model: &ModelRef) -> Result<()> {
        Ok(())
    }

    fn on_serialized(&self, _context: &ContextFrame, _model: &ModelRef) -> Result<()> {
        Ok(())
    }

    fn on_deserializing(&self, _context: &ContextFrame, _model: &ModelRef) -> Result<()> {
        Ok(())
    }

    fn on_deserialized(&self, _context: &ContextFrame, _model: &ModelRef) -> Result<()> {
        Ok(())
    }
}

type ModifierList = Arc<[Arc<dyn SerializerModifier>]>;

/// Ordered modifier lists, resolved per model type through a cache.
#[derive(Default)]
pub struct ModifierRegistry {
    global: Vec<Arc<dyn SerializerModifier>>,
    per_type: HashMap<TypeId, Vec<Arc<dyn SerializerModifier>>>,
    resolved: RwLock<HashMap<TypeId, ModifierList>>,
}

impl ModifierRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a modifier that applies to every model type.
    pub fn add_global(&mut self, modifier: Arc<dyn SerializerModifier>) {
        self.global.push(modifier);
        self.resolved.get_mut().clear();
    }

    /// Adds a modifier for the model type `T`.
    pub fn add<T: Model>(&mut self, modifier: Arc<dyn SerializerModifier>) {
        self.add_for(TypeId::of::<T>(), modifier);
    }

    pub fn add_for(&mut self, type_id: TypeId, modifier: Arc<dyn SerializerModifier>) {
        self.per_type.entry(type_id).or_default().push(modifier);
        self.resolved.get_mut().remove(&type_id);
    }

    /// The modifiers that apply to `type_id`, global ones first.
    pub fn modifiers_for(&self, type_id: TypeId) -> ModifierList {
        if let Some(list) = self.resolved.read().get(&type_id) {
            return list.clone();
        }

        let list: ModifierList = self
            .global
            .iter()
            .chain(self.per_type.get(&type_id).into_iter().flatten())
            .cloned()
            .collect();
        self.resolved
            .write()
            .entry(type_id)
            .or_insert(list)
            .clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.per_type.is_empty()
    }
}

impl fmt::Debug for ModifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifierRegistry")
            .field("global", &self.global.len())
            .field("per_type", &self.per_type.len())
            .finish()
    }
}

/// Threads `member` through every modifier in order.
pub fn run_serialize_modifiers(
    modifiers: &[Arc<dyn SerializerModifier>],
    context: &ContextFrame,
    member: &mut MemberValue,
) -> Result<()> {
    for modifier in modifiers {
        modifier.serialize_member(context, member)?;
    }
    Ok(())
}

pub fn run_deserialize_modifiers(
    modifiers: &[Arc<dyn SerializerModifier>],
    context: &ContextFrame,
    member: &mut MemberValue,
) -> Result<()> {
    for modifier in modifiers {
        modifier.deserialize_member(context, member)?;
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// KeyValuePairModifier

/// Prefix of an encoded key/value pair.
pub const KEY_VALUE_PAIR_PREFIX: &str = "CTL_KeyValuePair";
const KEY_VALUE_PAIR_SEPARATOR: char = '|';

/// Encodes [`Value::Pair`] members as a single string and decodes them back.
///
/// The encoding is `CTL_KeyValuePair|<keyType>|<valueType>|<key>|<value>`,
/// where the type names are those of [`MemberType::type_name`]. Only pairs of
/// primitive values are encoded; the value part may itself contain `|`.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyValuePairModifier;

impl KeyValuePairModifier {
    /// Encodes a key/value pair, or returns `None` if either side is not
    /// primitive or the key contains the separator.
    #[must_use]
    pub fn encode(key: &Value, value: &Value) -> Option<String> {
        let key_type = MemberType::of_value(key);
        let value_type = MemberType::of_value(value);
        if !key_type.is_primitive() || !value_type.is_primitive() {
            return None;
        }
        let key = key.to_string();
        if key.contains(KEY_VALUE_PAIR_SEPARATOR) {
            return None;
        }
        Some(format!(
            "{prefix}{sep}{key_type}{sep}{value_type}{sep}{key}{sep}{value}",
            prefix = KEY_VALUE_PAIR_PREFIX,
            sep = KEY_VALUE_PAIR_SEPARATOR,
        ))
    }

    /// Decodes an encoded pair. Returns `Ok(None)` for strings without the prefix.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeNotFound`] if a type name cannot be resolved
    /// - [`Error::InvalidFormat`] if the encoding is truncated or a part does not parse
    pub fn decode(text: &str) -> Result<Option<Value>> {
        let mut parts = text.splitn(5, KEY_VALUE_PAIR_SEPARATOR);
        if parts.next() != Some(KEY_VALUE_PAIR_PREFIX) {
            return Ok(None);
        }
        let (Some(key_type), Some(value_type), Some(key), Some(value)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::invalid_format(
                "key/value pair",
                format!("'{}' has fewer than 5 parts", text),
            ));
        };

        let key = Self::parse_part(key_type, key)?;
        let value = Self::parse_part(value_type, value)?;
        Ok(Some(Value::pair(key, value)))
    }

    fn parse_part(type_name: &str, text: &str) -> Result<Value> {
        let member_type =
            MemberType::from_type_name(type_name).ok_or_else(|| Error::type_not_found(type_name))?;
        member_type.parse_text(text).ok_or_else(|| {
            Error::invalid_format(
                "key/value pair",
                format!("'{}' is not a valid {}", text, type_name),
            )
        })
    }
}

impl SerializerModifier for KeyValuePairModifier {
    fn serialize_member(&self, _context: &ContextFrame, member: &mut MemberValue) -> Result<()> {
        if let Value::Pair(key, value) = &member.value {
            if let Some(encoded) = Self::encode(key, value) {
                member.value = Value::String(encoded);
            }
        }
        Ok(())
    }

    fn deserialize_member(&self, _context: &ContextFrame, member: &mut MemberValue) -> Result<()> {
        let Value::String(text) = &member.value else {
            return Ok(());
        };
        if let Some(pair) = Self::decode(text)? {
            member.value = pair;
        }
        Ok(())
    }
}
