//! Logging setup.
//!
//! Logs go to **stderr** through `tracing`; stdout belongs to whatever
//! engine protocol the provider is embedded in.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `freeipa_provider=debug`)
//!
//! ```bash
//! # Show every JSON-RPC command sent to FreeIPA
//! RUST_LOG=freeipa_provider::client=debug ./my-engine
//! ```

use tracing_subscriber::{fmt, prelude::*, registry::Registry, EnvFilter, Layer};

fn layers(default_level: &str) -> impl Layer<Registry> + Send + Sync {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(filter)
}

/// Initialize the default logging subscriber at `info` unless `RUST_LOG` says otherwise.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Like [`init_logging`], with a custom level used when `RUST_LOG` is not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(layers(default_level))
        .init();
}

/// Try to initialize logging, returning false if a subscriber was already set.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(layers("info"))
        .try_init()
        .is_ok()
}
