//! Logging and tracing setup.
//!
//! All logs go to **stderr**; stdout belongs to the host protocol. Filtering
//! is controlled through `RUST_LOG`, for example:
//!
//! ```bash
//! RUST_LOG=hemmer_provider_singularity=debug ./provider
//! ```
//!
//! Secrets never reach a log line. Values that must stay hidden are wrapped in
//! [`Masked`], which renders as a fixed placeholder in both `Display` and
//! `Debug` output.

use std::fmt;

use serde::{Deserialize, Deserializer};
use tracing_subscriber::{fmt as tfmt, prelude::*, EnvFilter};

/// Placeholder printed in place of masked values.
pub const MASK: &str = "***";

fn install(default_level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tfmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init()
}

/// Initialize the default logging subscriber at `info` level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with a custom default level used when `RUST_LOG` is unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    if let Err(e) = install(default_level) {
        panic!("failed to install tracing subscriber: {e}");
    }
}

/// Try to initialize logging, returning false if a subscriber is already set.
pub fn try_init_logging() -> bool {
    install("info").is_ok()
}

/// Wrapper that hides its contents from formatted output.
#[derive(Clone, PartialEq, Eq)]
pub struct Masked<T>(T);

impl<T> Masked<T> {
    /// Wrap a secret value.
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Access the secret value. Callers must not log the result.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Masked<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Masked)
    }
}
