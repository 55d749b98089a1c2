//! Resources components can suspend on.
//!
//! A [`Resource`] starts pending and is settled once through its
//! [`Resolver`]. Reading a pending resource interrupts rendering with
//! [`Interrupt::Suspend`]; the runtime subscribes through [`Wakeable`] and
//! retries once the resource settles.

use core::cell::RefCell;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::rc::Rc;

use crate::error::{Error, Interrupt, Render};

static NEXT_WAKEABLE: AtomicU64 = AtomicU64::new(1);

/// Identifies a [`Wakeable`] in the ping cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakeableId(u64);

impl WakeableId {
    /// Allocates a fresh identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_WAKEABLE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Something a render can wait on.
pub trait Wakeable {
    /// Stable identity used to deduplicate listeners.
    fn id(&self) -> WakeableId;

    /// Registers `listener` to run once the value settles.
    ///
    /// Runs the listener immediately when the value has already settled.
    fn subscribe(&self, listener: Box<dyn FnOnce()>);
}

/// State of a [`Resource`].
#[derive(Debug)]
pub enum ResourceState<T> {
    /// Not settled yet.
    Pending,
    /// Resolved with a value.
    Ready(Rc<T>),
    /// Rejected with a message.
    Failed(Rc<str>),
}

struct ResourceInner<T> {
    id: WakeableId,
    state: RefCell<ResourceState<T>>,
    listeners: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl<T> ResourceInner<T> {
    fn settle(&self, state: ResourceState<T>) {
        {
            let mut current = self.state.borrow_mut();
            if !matches!(*current, ResourceState::Pending) {
                return;
            }
            *current = state;
        }
        let listeners = core::mem::take(&mut *self.listeners.borrow_mut());
        for listener in listeners {
            listener();
        }
    }
}

/// A value that may not be available yet.
pub struct Resource<T: 'static>(Rc<ResourceInner<T>>);

/// Settles the paired [`Resource`].
pub struct Resolver<T: 'static>(Rc<ResourceInner<T>>);

impl<T: 'static> Resource<T> {
    /// Creates a pending resource and its resolver.
    #[must_use]
    pub fn pending() -> (Self, Resolver<T>) {
        let inner = Rc::new(ResourceInner {
            id: WakeableId::next(),
            state: RefCell::new(ResourceState::Pending),
            listeners: RefCell::new(Vec::new()),
        });
        (Self(inner.clone()), Resolver(inner))
    }

    /// Creates an already resolved resource.
    #[must_use]
    pub fn ready(value: T) -> Self {
        Self(Rc::new(ResourceInner {
            id: WakeableId::next(),
            state: RefCell::new(ResourceState::Ready(Rc::new(value))),
            listeners: RefCell::new(Vec::new()),
        }))
    }

    /// Whether the resource has not settled yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(*self.0.state.borrow(), ResourceState::Pending)
    }

    /// Reads the value, suspending while pending.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupt::Suspend`] while pending and
    /// [`Error::ResourceRejected`] once rejected.
    pub fn read(&self) -> Render<Rc<T>> {
        match &*self.0.state.borrow() {
            ResourceState::Ready(value) => Ok(value.clone()),
            ResourceState::Failed(message) => {
                Err(Error::ResourceRejected(message.clone()).into())
            }
            ResourceState::Pending => Err(Interrupt::Suspend(Rc::new(self.clone()))),
        }
    }
}

impl<T: 'static> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: 'static> Wakeable for Resource<T> {
    fn id(&self) -> WakeableId {
        self.0.id
    }

    fn subscribe(&self, listener: Box<dyn FnOnce()>) {
        if matches!(*self.0.state.borrow(), ResourceState::Pending) {
            self.0.listeners.borrow_mut().push(listener);
            return;
        }
        listener();
    }
}

impl<T: 'static> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.0.state.borrow() {
            ResourceState::Pending => "pending",
            ResourceState::Ready(_) => "ready",
            ResourceState::Failed(_) => "failed",
        };
        f.debug_struct("Resource")
            .field("id", &self.0.id)
            .field("state", &state)
            .finish()
    }
}

impl<T: 'static> Resolver<T> {
    /// Resolves the resource and wakes every subscriber.
    pub fn resolve(self, value: T) {
        self.0.settle(ResourceState::Ready(Rc::new(value)));
    }

    /// Rejects the resource and wakes every subscriber.
    pub fn reject(self, message: impl Into<Rc<str>>) {
        self.0.settle(ResourceState::Failed(message.into()));
    }
}

impl<T: 'static> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("id", &self.0.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn pending_read_suspends_until_resolved() {
        let (resource, resolver) = Resource::<u32>::pending();
        assert!(matches!(resource.read(), Err(Interrupt::Suspend(_))));

        let woken = Rc::new(Cell::new(0));
        let counter = woken.clone();
        resource.subscribe(Box::new(move || counter.set(counter.get() + 1)));

        resolver.resolve(7);
        assert_eq!(woken.get(), 1);
        assert_eq!(*resource.read().ok().expect("ready"), 7);
    }

    #[test]
    fn subscribing_after_settle_fires_immediately() {
        let resource = Resource::ready("x");
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        resource.subscribe(Box::new(move || flag.set(true)));
        assert!(fired.get());
    }

    #[test]
    fn rejection_surfaces_as_error() {
        let (resource, resolver) = Resource::<u32>::pending();
        resolver.reject("offline");
        match resource.read() {
            Err(Interrupt::Error(Error::ResourceRejected(message))) => {
                assert_eq!(&*message, "offline");
            }
            other => panic!("unexpected read result: {other:?}"),
        }
    }
}
