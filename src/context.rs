//! Per-instance serialization contexts.
//!
//! A [`SerializationContext`] is alive while the engine is inside one model
//! instance. Creating it pushes a [`ContextFrame`] on the scope's context stack
//! and the model's type name on the type stack, then fires the model's start
//! hook; dropping it fires the finish hook and pops both stacks. Contexts are
//! therefore disposed in strict LIFO order, including when member traversal
//! bails out with an error.
//!
//! Lifecycle: `Created → Active → Completing → Disposed`.

use crate::reference::LifecycleHook;
use crate::{Error, ModelRef, Result, SerializationConfiguration, SerializationScope, TypeMeta, Value};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Direction of the operation a context belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextMode {
    Serialize,
    Deserialize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Created,
    Active,
    Completing,
    Disposed,
}

/// The format-independent part of a context, shared with modifiers and with
/// child contexts as their parent link.
pub struct ContextFrame {
    model: ModelRef,
    type_name: Arc<str>,
    depth: usize,
    mode: ContextMode,
    parent: Option<Rc<ContextFrame>>,
    configuration: Arc<SerializationConfiguration>,
}

impl ContextFrame {
    #[must_use]
    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    /// Registered name of the model type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub(crate) fn shared_type_name(&self) -> Arc<str> {
        self.type_name.clone()
    }

    /// Number of ancestor contexts; the root context has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    /// Context of the object that referenced this one.
    #[must_use]
    pub fn parent(&self) -> Option<&ContextFrame> {
        self.parent.as_deref()
    }

    #[must_use]
    pub fn configuration(&self) -> &SerializationConfiguration {
        &self.configuration
    }

    /// Walks the parent chain, innermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = &ContextFrame> {
        std::iter::successors(self.parent(), |frame| frame.parent())
    }
}

impl fmt::Debug for ContextFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextFrame")
            .field("type_name", &self.type_name)
            .field("depth", &self.depth)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Context of one model instance, carrying the format payload `C`.
pub struct SerializationContext<C> {
    frame: Rc<ContextFrame>,
    context_info: C,
    scope: SerializationScope,
    state: ContextState,
}

impl<C> SerializationContext<C> {
    /// Enters `model` inside `scope`.
    ///
    /// The parent is whatever context is currently on top of the scope's stack.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `meta` does not describe the model's
    /// type. Nothing is pushed and no hook fires in that case.
    pub fn new(
        model: &ModelRef,
        meta: &TypeMeta,
        mode: ContextMode,
        context_info: C,
        scope: &SerializationScope,
        configuration: Arc<SerializationConfiguration>,
    ) -> Result<Self> {
        if meta.type_id() != model.model_type_id() {
            return Err(Error::invalid_argument(format!(
                "metadata for '{}' does not describe {}",
                meta.type_name(),
                model.rust_type_name()
            )));
        }

        let parent = scope.current_context();
        let frame = Rc::new(ContextFrame {
            model: model.clone(),
            type_name: meta.shared_type_name(),
            depth: scope.depth(),
            mode,
            parent,
            configuration,
        });
        let mut context = SerializationContext {
            frame,
            context_info,
            scope: scope.acquire(),
            state: ContextState::Created,
        };

        context.scope.push(context.frame.clone());
        context.state = ContextState::Active;
        tracing::trace!(
            type_name = %context.frame.type_name,
            depth = context.frame.depth,
            mode = ?mode,
            "entered context"
        );
        context.fire(match mode {
            ContextMode::Serialize => LifecycleHook::StartSerialization,
            ContextMode::Deserialize => LifecycleHook::StartDeserialization,
        });
        Ok(context)
    }

    #[must_use]
    pub fn frame(&self) -> &ContextFrame {
        &self.frame
    }

    #[must_use]
    pub fn model(&self) -> &ModelRef {
        &self.frame.model
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frame.depth
    }

    #[must_use]
    pub fn mode(&self) -> ContextMode {
        self.frame.mode
    }

    #[must_use]
    pub fn parent(&self) -> Option<&ContextFrame> {
        self.frame.parent()
    }

    #[must_use]
    pub fn state(&self) -> ContextState {
        self.state
    }

    #[must_use]
    pub fn scope(&self) -> &SerializationScope {
        &self.scope
    }

    #[must_use]
    pub fn context_info(&self) -> &C {
        &self.context_info
    }

    pub fn context_info_mut(&mut self) -> &mut C {
        &mut self.context_info
    }

    /// Moves the format payload out, leaving its default behind.
    pub fn take_context_info(&mut self) -> C
    where
        C: Default,
    {
        std::mem::take(&mut self.context_info)
    }

    fn fire(&self, hook: LifecycleHook) {
        let value = Value::Model(self.frame.model.clone());
        // untracked instances have no record and fire every time
        let should_call = self
            .scope
            .reference_manager()
            .lookup(&value)
            .map_or(true, |info| info.claim_hook(hook));
        if !should_call {
            return;
        }

        let Ok(mut model) = self.frame.model.try_borrow_mut() else {
            tracing::warn!(
                type_name = %self.frame.type_name,
                hook = ?hook,
                "model is borrowed, skipping lifecycle hook"
            );
            return;
        };
        match hook {
            LifecycleHook::StartSerialization => model.start_serialization(),
            LifecycleHook::FinishSerialization => model.finish_serialization(),
            LifecycleHook::StartDeserialization => model.start_deserialization(),
            LifecycleHook::FinishDeserialization => model.finish_deserialization(),
        }
    }
}

impl<C> Drop for SerializationContext<C> {
    fn drop(&mut self) {
        if self.state != ContextState::Active {
            return;
        }
        self.state = ContextState::Completing;
        self.fire(match self.frame.mode {
            ContextMode::Serialize => LifecycleHook::FinishSerialization,
            ContextMode::Deserialize => LifecycleHook::FinishDeserialization,
        });
        self.scope.pop(&self.frame);
        self.state = ContextState::Disposed;
        tracing::trace!(
            type_name = %self.frame.type_name,
            depth = self.frame.depth,
            "left context"
        );
    }
}

impl<C> fmt::Debug for SerializationContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationContext")
            .field("frame", &self.frame)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
