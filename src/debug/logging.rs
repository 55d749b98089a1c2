//! Tracing and panic output for applications and tests.

use std::io::{self, Write};
use std::panic::{self, PanicHookInfo};
use std::sync::Once;

use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const TRACING_PREFIX: &str = "[undertow] ";
const FILTER_ENV: &str = "UNDERTOW_LOG";
const DEFAULT_FILTER: &str = "info";

static PANIC_HOOK_INSTALLED: Once = Once::new();
static TRACING_INSTALLED: Once = Once::new();

/// Installs a global `tracing` subscriber writing to stderr (idempotent).
///
/// The filter is read from `UNDERTOW_LOG`, then `RUST_LOG`, and defaults to
/// `info`. `UNDERTOW_LOG=undertow_core=debug` shows every render attempt,
/// commit and scheduling decision; `trace` adds per-fiber bail-outs.
pub fn install_tracing() {
    TRACING_INSTALLED.call_once(|| {
        let console = fmt::layer()
            .with_writer(PrefixedWriter)
            .with_ansi(false)
            .with_target(true)
            .with_filter(env_filter());

        if tracing_subscriber::registry().with(console).try_init().is_err() {
            eprintln!("{TRACING_PREFIX}a global tracing subscriber was already installed");
        }
    });
}

/// Routes panics through `tracing` before the previous hook runs
/// (idempotent).
pub fn install_panic_logger() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            log_panic(info);
            previous(info);
        }));
    });
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn log_panic(info: &PanicHookInfo<'_>) {
    let message = panic_message(info.payload());
    let location = info
        .location()
        .map(|location| format!("{}:{}", location.file(), location.line()));
    tracing::error!(
        target: "undertow::panic",
        message = %message,
        location = location.as_deref().unwrap_or("unknown"),
        "panicked"
    );
}

fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[derive(Clone, Copy, Default)]
struct PrefixedWriter;

impl<'a> MakeWriter<'a> for PrefixedWriter {
    type Writer = Prefixed<io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        Prefixed::new(io::stderr())
    }
}

/// Writes [`TRACING_PREFIX`] before the first byte of each event.
struct Prefixed<W> {
    inner: W,
    wrote_prefix: bool,
}

impl<W> Prefixed<W> {
    const fn new(inner: W) -> Self {
        Self {
            inner,
            wrote_prefix: false,
        }
    }
}

impl<W: Write> Write for Prefixed<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.wrote_prefix {
            self.inner.write_all(TRACING_PREFIX.as_bytes())?;
            self.wrote_prefix = true;
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_written_once_per_event() {
        let mut writer = Prefixed::new(Vec::new());
        writer.write_all(b"render ").unwrap();
        writer.write_all(b"started\n").unwrap();
        assert_eq!(writer.inner, b"[undertow] render started\n");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let text: Box<dyn core::any::Any + Send> = Box::new("boom");
        let owned: Box<dyn core::any::Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn core::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*text), "boom");
        assert_eq!(panic_message(&*owned), "bang");
        assert_eq!(panic_message(&*other), "unknown panic");
    }

    #[test]
    fn installing_twice_is_harmless() {
        install_tracing();
        install_tracing();
        install_panic_logger();
        install_panic_logger();
    }
}
