//! Core of the undertow runtime.
//!
//! Applications describe a UI as a tree of [`Node`]s built from host
//! elements, components, fragments, context providers and suspense
//! boundaries. A [`Root`] keeps two fiber trees: the committed one and the
//! one under construction. Updates are tagged with [`Lanes`]; the root picks
//! the most urgent lane, renders it (yielding to the [`Scheduler`] between
//! units of work when not synchronous) and commits the result to a
//! [`HostConfig`] in one pass.
#![allow(clippy::multiple_crate_versions)]

mod begin_work;
mod child_fibers;
mod commit;
mod complete_work;
mod context;
mod element;
mod error;
mod fiber;
mod flags;
mod hooks;
mod host;
pub mod lane;
mod resource;
pub mod ring;
mod root;
mod scheduler;
mod sync_queue;
mod unwind;
pub mod update_queue;
mod work_loop;

pub use commit::CommitStats;
pub use context::{Context, ContextId};
pub use element::{
    Component, Element, ElementBuilder, ElementType, Key, MemoComponent, Node, NodeRef, PropValue, Props, fragment,
    host, suspense, text,
};
pub use error::{Error, HostError, Interrupt, Render};
pub use fiber::FiberId;
pub use flags::Flags;
pub use hooks::{Cleanup, DepValue, Deps, IntoCleanup, MutableRef, RenderCx, SetState, StartTransition, Usable};
pub use host::HostConfig;
pub use lane::{Lane, Lanes, RootLanes};
pub use resource::{Resolver, Resource, ResourceState, Wakeable, WakeableId};
pub use root::{Root, RootBuilder, RootMode};
pub use scheduler::{Priority, Scheduler, Task, TaskHandle, TaskStatus, with_priority};

#[cfg(test)]
mod tests;
