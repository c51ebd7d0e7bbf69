//! Member values and per-type member enumeration.
//!
//! Member metadata is computed once per model type and cached; member values
//! are read lazily from each instance as the engine walks it.

use crate::registry::{MemberDescriptor, MemberGroup, MemberType, TypeMeta};
use crate::{ModelRef, Result, Value};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// One member of one instance, as seen by modifiers and formats.
///
/// Modifiers may rewrite `value` in place; the other fields describe the
/// registered member and should be left alone.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberValue {
    pub group: MemberGroup,
    pub name: String,
    pub member_type: MemberType,
    pub value: Value,
}

impl MemberValue {
    pub fn new(group: MemberGroup, name: impl Into<String>, member_type: MemberType, value: Value) -> Self {
        MemberValue {
            group,
            name: name.into(),
            member_type,
            value,
        }
    }

    pub(crate) fn from_descriptor(descriptor: &MemberDescriptor, value: Value) -> Self {
        MemberValue {
            group: descriptor.group(),
            name: descriptor.name().to_string(),
            member_type: descriptor.member_type().clone(),
            value,
        }
    }
}

/// Lazy, declaration-ordered walk over the serializable members of one instance.
pub struct MemberValues {
    model: ModelRef,
    members: Arc<[Arc<MemberDescriptor>]>,
    index: usize,
}

impl MemberValues {
    pub(crate) fn new(model: ModelRef, members: Arc<[Arc<MemberDescriptor>]>) -> Self {
        MemberValues {
            model,
            members,
            index: 0,
        }
    }
}

impl Iterator for MemberValues {
    type Item = Result<MemberValue>;

    fn next(&mut self) -> Option<Self::Item> {
        let descriptor = self.members.get(self.index)?.clone();
        self.index += 1;
        Some(
            descriptor
                .get_value(&self.model)
                .map(|value| MemberValue::from_descriptor(&descriptor, value)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.members.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MemberValues {}

/// Per-type cache of serializable members.
#[derive(Default)]
pub struct MemberCache {
    entries: RwLock<HashMap<TypeId, Arc<[Arc<MemberDescriptor>]>>>,
}

impl MemberCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered members of `meta` that take part in serialization.
    pub fn serializable_members(&self, meta: &TypeMeta) -> Arc<[Arc<MemberDescriptor>]> {
        if let Some(members) = self.entries.read().get(&meta.type_id()) {
            return members.clone();
        }

        let members: Arc<[Arc<MemberDescriptor>]> = meta
            .members()
            .iter()
            .filter(|member| !member.is_excluded())
            .cloned()
            .collect();
        self.entries
            .write()
            .entry(meta.type_id())
            .or_insert(members)
            .clone()
    }

    /// Starts a lazy member walk over `model`.
    pub fn member_values(&self, model: &ModelRef, meta: &TypeMeta) -> MemberValues {
        MemberValues::new(model.clone(), self.serializable_members(meta))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
