//! Error types.

use core::fmt;
use std::rc::Rc;

use crate::element::Node;
use crate::resource::Wakeable;

/// Fatal render errors.
///
/// Any of these aborts the render attempt; nothing from the attempt is
/// committed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A component called more hooks than during its previous render.
    #[error("component `{component}` rendered more hooks than during the previous render")]
    TooManyHooks {
        /// Component name.
        component: Rc<str>,
    },
    /// A component called fewer hooks than during its previous render.
    #[error("component `{component}` rendered fewer hooks than during the previous render")]
    TooFewHooks {
        /// Component name.
        component: Rc<str>,
    },
    /// A hook call did not match the hook at the same position last render.
    #[error("component `{component}` called `{found}` where `{expected}` was called before (hook #{index})")]
    HookOrder {
        /// Component name.
        component: Rc<str>,
        /// Position of the hook.
        index: usize,
        /// Hook kind recorded during the previous render.
        expected: &'static str,
        /// Hook kind called now.
        found: &'static str,
    },
    /// A state or ref hook changed its value type between renders.
    #[error("component `{component}` changed the value type of hook #{index}")]
    StateType {
        /// Component name.
        component: Rc<str>,
        /// Position of the hook.
        index: usize,
    },
    /// A resource read by a component was rejected.
    #[error("resource rejected: {0}")]
    ResourceRejected(Rc<str>),
    /// A component reported a failure.
    #[error("component `{component}` failed: {message}")]
    Component {
        /// Component name.
        component: Rc<str>,
        /// Failure description.
        message: String,
    },
}

/// Errors reported by a host adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The instance is unknown to the host.
    #[error("host node {0} not found")]
    NodeNotFound(String),
    /// The node is not a child of the given parent.
    #[error("{child} is not a child of {parent}")]
    NotAChild {
        /// Parent instance.
        parent: String,
        /// Child instance.
        child: String,
    },
    /// The host cannot perform the operation.
    #[error("unsupported host operation: {0}")]
    Unsupported(String),
}

/// Why rendering a component stopped early.
pub enum Interrupt {
    /// The component is waiting on a resource.
    Suspend(Rc<dyn Wakeable>),
    /// The component failed.
    Error(Error),
}

impl From<Error> for Interrupt {
    fn from(error: Error) -> Self {
        Self::Error(error)
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suspend(wakeable) => f.debug_tuple("Suspend").field(&wakeable.id()).finish(),
            Self::Error(error) => f.debug_tuple("Error").field(error).finish(),
        }
    }
}

/// Result of rendering a component or calling a hook.
pub type Render<T = Node> = Result<T, Interrupt>;
