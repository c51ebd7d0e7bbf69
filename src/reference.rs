//! Object identity tracking for one serialization pass.
//!
//! The [`ReferenceManager`] maps the identity of every trackable instance
//! (shared lists and models) to a [`ReferenceInfo`]. Ids start at
//! [`FIRST_GRAPH_ID`] and are handed out in first-encounter order, so a reader
//! that registers instances in the order it meets them ends up with the same
//! table as the writer.
//!
//! ```rust
//! use serde_graph::{ReferenceManager, Value};
//!
//! let mut manager = ReferenceManager::new();
//! let shared = Value::list(vec![Value::from(1)]);
//!
//! let first = manager.get_info(&shared, true).unwrap();
//! assert_eq!(first.id(), 1);
//! assert!(first.is_first_usage());
//!
//! let again = manager.get_info(&shared, true).unwrap();
//! assert_eq!(again.id(), 1);
//! assert!(!again.is_first_usage());
//!
//! assert!(manager.get_info(&Value::from(5), true).is_none());
//! ```

use crate::{Error, Result, Value};
use std::collections::HashMap;

/// The id assigned to the first tracked instance.
pub const FIRST_GRAPH_ID: u32 = 1;

/// Tracking record of one instance.
#[derive(Debug)]
pub struct ReferenceInfo {
    id: u32,
    is_first_usage: bool,
    // Keeps the allocation alive so its address cannot be reused mid-pass.
    instance: Value,
    has_called_start_serialization: bool,
    has_called_finish_serialization: bool,
    has_called_start_deserialization: bool,
    has_called_finish_deserialization: bool,
}

impl ReferenceInfo {
    fn new(id: u32, instance: Value) -> Self {
        ReferenceInfo {
            id,
            is_first_usage: true,
            instance,
            has_called_start_serialization: false,
            has_called_finish_serialization: false,
            has_called_start_deserialization: false,
            has_called_finish_deserialization: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// `true` only on the lookup that created this record.
    #[must_use]
    pub fn is_first_usage(&self) -> bool {
        self.is_first_usage
    }

    #[must_use]
    pub fn instance(&self) -> &Value {
        &self.instance
    }

    /// Marks a lifecycle hook as called; returns `true` if it had not been called yet.
    pub(crate) fn claim_hook(&mut self, hook: LifecycleHook) -> bool {
        let flag = match hook {
            LifecycleHook::StartSerialization => &mut self.has_called_start_serialization,
            LifecycleHook::FinishSerialization => &mut self.has_called_finish_serialization,
            LifecycleHook::StartDeserialization => &mut self.has_called_start_deserialization,
            LifecycleHook::FinishDeserialization => &mut self.has_called_finish_deserialization,
        };
        !std::mem::replace(flag, true)
    }
}

/// The completion callbacks a context fires on its model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LifecycleHook {
    StartSerialization,
    FinishSerialization,
    StartDeserialization,
    FinishDeserialization,
}

/// Identity → [`ReferenceInfo`] table, plus the reverse id → instance lookup.
///
/// Lives inside a [`SerializationScope`](crate::SerializationScope), which is
/// neither `Send` nor `Sync`: a manager is only ever used by the thread that
/// runs the operation.
#[derive(Debug, Default)]
pub struct ReferenceManager {
    by_identity: HashMap<usize, u32>,
    infos: HashMap<u32, ReferenceInfo>,
    next_id: u32,
}

impl ReferenceManager {
    #[must_use]
    pub fn new() -> Self {
        ReferenceManager {
            by_identity: HashMap::new(),
            infos: HashMap::new(),
            next_id: FIRST_GRAPH_ID,
        }
    }

    /// Looks up (and optionally starts tracking) an instance.
    ///
    /// Returns `None` for values that are not trackable, and for instances seen
    /// for the first time when `auto_generate_id` is `false`.
    pub fn get_info(&mut self, value: &Value, auto_generate_id: bool) -> Option<&mut ReferenceInfo> {
        let identity = value.identity()?;
        if let Some(id) = self.by_identity.get(&identity).copied() {
            let info = self.infos.get_mut(&id)?;
            info.is_first_usage = false;
            return Some(info);
        }
        if !auto_generate_id {
            return None;
        }

        let id = self.allocate_id();
        self.by_identity.insert(identity, id);
        tracing::trace!(id, kind = value.kind(), "tracking new instance");
        Some(self.infos.entry(id).or_insert_with(|| ReferenceInfo::new(id, value.clone())))
    }

    /// Looks up an instance without touching its first-usage flag.
    pub fn lookup(&mut self, value: &Value) -> Option<&mut ReferenceInfo> {
        let identity = value.identity()?;
        let id = self.by_identity.get(&identity)?;
        self.infos.get_mut(id)
    }

    /// Binds an id read from the input to a freshly materialized instance.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateReference`] if the id is already bound
    /// - [`Error::InvalidArgument`] if the value is not trackable or the id is below [`FIRST_GRAPH_ID`]
    pub fn register_manually(&mut self, id: u32, value: &Value) -> Result<()> {
        let identity = value.identity().ok_or_else(|| {
            Error::invalid_argument(format!("a {} value cannot carry a graph id", value.kind()))
        })?;
        if id < FIRST_GRAPH_ID {
            return Err(Error::invalid_argument(format!("graph id {} is out of range", id)));
        }
        if self.infos.contains_key(&id) {
            return Err(Error::DuplicateReference { id });
        }
        self.by_identity.insert(identity, id);
        self.infos.insert(id, ReferenceInfo::new(id, value.clone()));
        self.next_id = self.next_id.max(id.saturating_add(1));
        Ok(())
    }

    /// Resolves a reference marker to its instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownReference`] if the id was never registered.
    pub fn resolve(&self, id: u32) -> Result<Value> {
        self.infos
            .get(&id)
            .map(|info| info.instance.clone())
            .ok_or(Error::UnknownReference { id })
    }

    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        value
            .identity()
            .map_or(false, |identity| self.by_identity.contains_key(&identity))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    fn allocate_id(&mut self) -> u32 {
        while self.infos.contains_key(&self.next_id) {
            self.next_id += 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Model;

    #[derive(Default)]
    struct Leaf;

    impl Model for Leaf {}

    #[test]
    fn test_ids_follow_first_encounter_order() {
        let mut manager = ReferenceManager::new();
        let a = Value::model(Leaf);
        let b = Value::list(vec![]);
        let c = Value::model(Leaf);
        assert_eq!(manager.get_info(&a, true).unwrap().id(), 1);
        assert_eq!(manager.get_info(&b, true).unwrap().id(), 2);
        assert_eq!(manager.get_info(&a, true).unwrap().id(), 1);
        assert_eq!(manager.get_info(&c, true).unwrap().id(), 3);
        assert_eq!(manager.len(), 3);
    }

    #[test]
    fn test_identity_not_equality() {
        let mut manager = ReferenceManager::new();
        let a = Value::list(vec![Value::from(1)]);
        let b = Value::list(vec![Value::from(1)]);
        assert_eq!(a, b);
        let id_a = manager.get_info(&a, true).unwrap().id();
        let info_b = manager.get_info(&b, true).unwrap();
        assert_ne!(id_a, info_b.id());
        assert!(info_b.is_first_usage());
    }

    #[test]
    fn test_no_auto_generation() {
        let mut manager = ReferenceManager::new();
        let a = Value::model(Leaf);
        assert!(manager.get_info(&a, false).is_none());
        assert!(manager.is_empty());
        manager.get_info(&a, true).unwrap();
        let info = manager.get_info(&a, false).unwrap();
        assert!(!info.is_first_usage());
    }

    #[test]
    fn test_lookup_keeps_first_usage() {
        let mut manager = ReferenceManager::new();
        let a = Value::model(Leaf);
        manager.get_info(&a, true).unwrap();
        assert!(manager.lookup(&a).unwrap().is_first_usage());
    }

    #[test]
    fn test_register_manually_and_resolve() {
        let mut manager = ReferenceManager::new();
        let a = Value::model(Leaf);
        manager.register_manually(4, &a).unwrap();
        assert_eq!(manager.resolve(4).unwrap(), a);
        assert!(matches!(
            manager.resolve(9),
            Err(Error::UnknownReference { id: 9 })
        ));
        assert!(matches!(
            manager.register_manually(4, &Value::model(Leaf)),
            Err(Error::DuplicateReference { id: 4 })
        ));
        // auto ids continue after manually registered ones
        assert_eq!(manager.get_info(&Value::model(Leaf), true).unwrap().id(), 5);
    }

    #[test]
    fn test_claim_hook_once() {
        let mut manager = ReferenceManager::new();
        let a = Value::model(Leaf);
        let info = manager.get_info(&a, true).unwrap();
        assert!(info.claim_hook(LifecycleHook::StartSerialization));
        assert!(!info.claim_hook(LifecycleHook::StartSerialization));
        assert!(info.claim_hook(LifecycleHook::StartDeserialization));
    }
}
