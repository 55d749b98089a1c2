//! Development-time diagnostics.
//!
//! [`logging::install_tracing`] makes the runtime's `tracing` output
//! visible; [`logging::install_panic_logger`] sends panics through the same
//! subscriber.

pub mod logging;

pub use logging::{install_panic_logger, install_tracing};
