#![doc = include_str!("../README.md")]
#![allow(clippy::multiple_crate_versions)]

pub mod debug;
pub mod testing;

#[doc(inline)]
pub use undertow_core::*;
/// The in-memory host.
pub use undertow_memory as memory;
/// The cooperative scheduler.
pub use undertow_scheduler as scheduler;

pub mod prelude {
    //! Commonly used types in one import.
    //!
    //! ```rust
    //! use undertow::prelude::*;
    //!
    //! let greeting = Component::new("Greeting", |_cx, props| {
    //!     Ok(host("p").child(props.str("name").unwrap_or("world").to_owned()).into())
    //! });
    //! let _ = greeting.element().attr("name", "undertow").build();
    //! ```
    pub use undertow_core::{
        Component, Context, Deps, Element, Error, HostConfig, Key, Lanes, Node, NodeRef, Priority, Props, Render,
        RenderCx, Resource, Root, RootMode, Scheduler, SetState, deps, fragment, host, suspense, text,
    };
    pub use undertow_memory::MemoryHost;
    pub use undertow_scheduler::{CooperativeScheduler, SchedulerConfig};
}

#[cfg(test)]
mod tests;
