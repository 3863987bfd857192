//! Logging initialization with tracing
//!
//! All log output goes to stderr so stdout carries only command results.

use anyhow::Result;
use tracing::Level;

/// Log level for a `-v` count: none → WARN, one → INFO, more → DEBUG
#[must_use]
pub const fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence over the verbosity flag when set.
///
/// # Errors
/// Returns an error if a global subscriber is already installed
pub fn init_tracing(verbosity: u8) -> Result<()> {
    let level = level_for(verbosity);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "lockpick={level},lockpick_core={level},zookeeper={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))
}
