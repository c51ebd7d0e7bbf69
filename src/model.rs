//! Models and shared model handles.
//!
//! A model is any `'static` type implementing [`Model`]. Instances take part in
//! a graph through [`ModelRef`], a shared handle whose identity (not value) is
//! what the reference manager tracks.
//!
//! ```rust
//! use serde_graph::{Model, ModelRef};
//!
//! #[derive(Default)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! impl Model for Counter {}
//!
//! let a = ModelRef::new(Counter { count: 3 });
//! let b = a.clone();
//! assert!(a.ptr_eq(&b));
//! assert_eq!(a.downcast::<Counter>().unwrap().borrow().count, 3);
//! ```

use crate::Value;
use indexmap::IndexMap;
use std::any::{Any, TypeId};
use std::cell::{BorrowMutError, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// An object with named, typed, persistable members.
///
/// The lifecycle hooks are optional; the engine calls each `start_*`/`finish_*`
/// pair at most once per distinct instance per operation.
pub trait Model: Any {
    /// Backing store for managed properties, if the model has one.
    fn property_bag(&self) -> Option<&PropertyBag> {
        None
    }

    fn property_bag_mut(&mut self) -> Option<&mut PropertyBag> {
        None
    }

    fn start_serialization(&mut self) {}

    fn finish_serialization(&mut self) {}

    fn start_deserialization(&mut self) {}

    fn finish_deserialization(&mut self) {}
}

/// Out-of-band storage for managed properties, keyed by property name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyBag(IndexMap<String, Value>);

impl PropertyBag {
    #[must_use]
    pub fn new() -> Self {
        PropertyBag(IndexMap::new())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.0.iter()
    }
}

/// Shared handle to a model instance.
///
/// Holds the same allocation twice: once as `dyn Model` for the lifecycle hooks,
/// once as `dyn Any` so typed accessors can get the concrete `Rc<RefCell<T>>` back.
#[derive(Clone)]
pub struct ModelRef {
    cell: Rc<RefCell<dyn Model>>,
    any: Rc<dyn Any>,
    type_id: TypeId,
    rust_type_name: &'static str,
}

impl ModelRef {
    /// Wraps a new model instance.
    pub fn new<T: Model>(model: T) -> Self {
        Self::from_rc(Rc::new(RefCell::new(model)))
    }

    /// Wraps an existing shared instance without copying it.
    pub fn from_rc<T: Model>(rc: Rc<RefCell<T>>) -> Self {
        ModelRef {
            cell: rc.clone(),
            any: rc,
            type_id: TypeId::of::<T>(),
            rust_type_name: std::any::type_name::<T>(),
        }
    }

    /// Returns the typed instance if this handle holds a `T`.
    #[must_use]
    pub fn downcast<T: Model>(&self) -> Option<Rc<RefCell<T>>> {
        self.any.clone().downcast::<RefCell<T>>().ok()
    }

    #[must_use]
    pub fn is<T: Model>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// `TypeId` of the concrete model type.
    #[must_use]
    pub fn model_type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name of the concrete model type, for diagnostics.
    #[must_use]
    pub fn rust_type_name(&self) -> &'static str {
        self.rust_type_name
    }

    pub fn borrow(&self) -> Ref<'_, dyn Model> {
        self.cell.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, dyn Model> {
        self.cell.borrow_mut()
    }

    pub fn try_borrow_mut(&self) -> Result<RefMut<'_, dyn Model>, BorrowMutError> {
        self.cell.try_borrow_mut()
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &ModelRef) -> bool {
        self.identity() == other.identity()
    }

    /// Address of the shared allocation; stable for the lifetime of the instance.
    #[must_use]
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.any) as *const () as usize
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRef")
            .field("type", &self.rust_type_name)
            .field("identity", &format_args!("{:#x}", self.identity()))
            .finish()
    }
}

impl<T: Model> From<Rc<RefCell<T>>> for ModelRef {
    fn from(rc: Rc<RefCell<T>>) -> Self {
        ModelRef::from_rc(rc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Sample {
        value: i64,
        bag: PropertyBag,
        started: usize,
    }

    impl Model for Sample {
        fn property_bag(&self) -> Option<&PropertyBag> {
            Some(&self.bag)
        }

        fn property_bag_mut(&mut self) -> Option<&mut PropertyBag> {
            Some(&mut self.bag)
        }

        fn start_serialization(&mut self) {
            self.started += 1;
        }
    }

    #[derive(Default)]
    struct Other;

    impl Model for Other {}

    #[test]
    fn test_downcast_shares_allocation() {
        let rc = Rc::new(RefCell::new(Sample::default()));
        let handle = ModelRef::from_rc(rc.clone());
        handle.downcast::<Sample>().unwrap().borrow_mut().value = 7;
        assert_eq!(rc.borrow().value, 7);
        assert!(handle.downcast::<Other>().is_none());
        assert!(handle.is::<Sample>());
    }

    #[test]
    fn test_identity_is_per_allocation() {
        let a = ModelRef::new(Sample::default());
        let b = ModelRef::new(Sample::default());
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));
    }

    #[test]
    fn test_hooks_through_dyn_handle() {
        let handle = ModelRef::new(Sample::default());
        handle.borrow_mut().start_serialization();
        handle
            .borrow_mut()
            .property_bag_mut()
            .unwrap()
            .set("Name", Value::from("x"));
        let typed = handle.downcast::<Sample>().unwrap();
        assert_eq!(typed.borrow().started, 1);
        assert_eq!(typed.borrow().bag.get("Name"), Some(&Value::from("x")));
    }
}
