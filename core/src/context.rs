use core::any::Any;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::rc::Rc;

use crate::element::{ElementBuilder, ElementType};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Identifies a [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

/// A value passed implicitly to every component below a provider.
///
/// Components read the nearest provided value with
/// [`RenderCx::use_context`](crate::RenderCx::use_context); without a
/// provider they see the default.
pub struct Context<T: 'static> {
    id: ContextId,
    default: Rc<T>,
}

impl<T: 'static> Context<T> {
    /// Creates a context with a default value.
    pub fn new(default: T) -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed)),
            default: Rc::new(default),
        }
    }

    /// The context's identifier.
    #[must_use]
    pub const fn id(&self) -> ContextId {
        self.id
    }

    /// The value seen without a provider.
    #[must_use]
    pub fn default_value(&self) -> Rc<T> {
        self.default.clone()
    }

    /// Starts a provider element supplying `value` to its children.
    #[must_use]
    pub fn provider(&self, value: T) -> ElementBuilder {
        ElementBuilder::new(ElementType::Provider(self.id)).data_rc(Rc::new(value))
    }
}

impl<T: 'static> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: self.default.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}

/// Values pushed by providers on the path from the root to the fiber being
/// rendered.
#[derive(Default)]
pub(crate) struct ProviderStack {
    entries: Vec<(ContextId, Option<Rc<dyn Any>>)>,
}

impl ProviderStack {
    pub(crate) fn push(&mut self, id: ContextId, value: Option<Rc<dyn Any>>) {
        self.entries.push((id, value));
    }

    pub(crate) fn pop(&mut self) {
        self.entries.pop();
    }

    /// Nearest provided value for `id`.
    pub(crate) fn read(&self, id: ContextId) -> Option<Rc<dyn Any>> {
        self.entries
            .iter()
            .rev()
            .find(|(entry, _)| *entry == id)
            .and_then(|(_, value)| value.clone())
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for ProviderStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(id, _)| id))
            .finish()
    }
}

/// A context value observed by a component during its last render.
#[derive(Clone)]
pub(crate) struct ContextDependency {
    pub(crate) context: ContextId,
    pub(crate) observed: Option<Rc<dyn Any>>,
}

impl ContextDependency {
    /// Whether `current` is the value that was observed.
    pub(crate) fn matches(&self, current: Option<&Rc<dyn Any>>) -> bool {
        match (&self.observed, current) {
            (None, None) => true,
            (Some(observed), Some(current)) => Rc::ptr_eq(observed, current),
            _ => false,
        }
    }
}

impl fmt::Debug for ContextDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextDependency")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_provider_wins() {
        let theme = Context::new("light");
        let mut stack = ProviderStack::default();
        assert!(stack.read(theme.id()).is_none());

        let dark: Rc<dyn Any> = Rc::new("dark");
        let blue: Rc<dyn Any> = Rc::new("blue");
        stack.push(theme.id(), Some(dark));
        stack.push(theme.id(), Some(blue));
        let value = stack.read(theme.id()).expect("provided");
        assert_eq!(value.downcast_ref::<&str>(), Some(&"blue"));

        stack.pop();
        let value = stack.read(theme.id()).expect("provided");
        assert_eq!(value.downcast_ref::<&str>(), Some(&"dark"));
    }

    #[test]
    fn contexts_get_distinct_ids() {
        let a = Context::new(0_u8);
        let b = Context::new(0_u8);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }
}
