//! Shared traversal state for one logical operation.
//!
//! A [`SerializationScope`] bundles the type stack, the [`ReferenceManager`]
//! and the context stack. Every nested context of one operation works on the
//! same bundle; cloning the handle acquires it and dropping the handle releases
//! it, so the bundle lives exactly as long as its last holder.
//!
//! Passing the same scope to two top-level calls makes them share reference
//! identity: an instance written by the first call is only a reference marker in
//! the second.
//!
//! ```rust
//! use serde_graph::SerializationScope;
//!
//! let scope = SerializationScope::new("save-document");
//! let nested = scope.acquire();
//! assert_eq!(scope.ref_count(), 2);
//! drop(nested);
//! assert_eq!(scope.ref_count(), 1);
//! ```

use crate::context::ContextFrame;
use crate::ReferenceManager;
use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

struct ScopeState {
    name: String,
    type_stack: RefCell<Vec<Arc<str>>>,
    reference_manager: RefCell<ReferenceManager>,
    contexts: RefCell<Vec<Rc<ContextFrame>>>,
}

/// Ref-counted handle to the state of one (de)serialization operation.
#[derive(Clone)]
pub struct SerializationScope {
    state: Rc<ScopeState>,
}

impl SerializationScope {
    pub fn new(name: impl Into<String>) -> Self {
        SerializationScope {
            state: Rc::new(ScopeState {
                name: name.into(),
                type_stack: RefCell::new(Vec::new()),
                reference_manager: RefCell::new(ReferenceManager::new()),
                contexts: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Acquires another holder of the same bundle.
    #[must_use]
    pub fn acquire(&self) -> Self {
        self.clone()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Number of live holders.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.state)
    }

    /// Number of contexts currently on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.state.contexts.borrow().len()
    }

    /// The innermost active context.
    #[must_use]
    pub fn current_context(&self) -> Option<Rc<ContextFrame>> {
        self.state.contexts.borrow().last().cloned()
    }

    /// Snapshot of the type stack, outermost first.
    #[must_use]
    pub fn type_stack(&self) -> Vec<Arc<str>> {
        self.state.type_stack.borrow().clone()
    }

    /// Runs `f` with exclusive access to the reference manager.
    pub fn with_reference_manager<R>(&self, f: impl FnOnce(&mut ReferenceManager) -> R) -> R {
        f(&mut self.state.reference_manager.borrow_mut())
    }

    pub(crate) fn reference_manager(&self) -> RefMut<'_, ReferenceManager> {
        self.state.reference_manager.borrow_mut()
    }

    pub(crate) fn push(&self, frame: Rc<ContextFrame>) {
        self.state
            .type_stack
            .borrow_mut()
            .push(frame.shared_type_name());
        self.state.contexts.borrow_mut().push(frame);
    }

    pub(crate) fn pop(&self, frame: &Rc<ContextFrame>) {
        let popped_type = self.state.type_stack.borrow_mut().pop();
        let popped = self.state.contexts.borrow_mut().pop();
        debug_assert!(
            popped.as_ref().map_or(false, |top| Rc::ptr_eq(top, frame)),
            "contexts must be disposed in LIFO order"
        );
        debug_assert_eq!(popped_type.as_deref(), Some(frame.type_name()));
    }

    fn downgrade(&self) -> Weak<ScopeState> {
        Rc::downgrade(&self.state)
    }
}

impl fmt::Debug for SerializationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationScope")
            .field("name", &self.state.name)
            .field("depth", &self.depth())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// Caller-owned registry that hands out one scope per name.
///
/// Only weak handles are kept: a name resolves to the same bundle while any
/// holder is alive, and to a fresh one afterwards.
#[derive(Default)]
pub struct ScopeManager {
    scopes: RefCell<HashMap<String, Weak<ScopeState>>>,
}

impl ScopeManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the live scope registered under `name`, or creates it.
    pub fn get_or_create(&self, name: &str) -> SerializationScope {
        let mut scopes = self.scopes.borrow_mut();
        if let Some(state) = scopes.get(name).and_then(Weak::upgrade) {
            return SerializationScope { state };
        }
        scopes.retain(|_, weak| weak.strong_count() > 0);
        let scope = SerializationScope::new(name);
        scopes.insert(name.to_string(), scope.downgrade());
        tracing::trace!(scope = name, "created serialization scope");
        scope
    }

    /// `true` while some holder keeps the named scope alive.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.scopes
            .borrow()
            .get(name)
            .map_or(false, |weak| weak.strong_count() > 0)
    }

    /// Number of live scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
