//! Interrupt delivery for the cancellation guard

use anyhow::Result;

/// Registered SIGINT/SIGTERM listeners.
///
/// Listeners are installed on construction, so an interrupt arriving before
/// the first poll is not lost.
pub struct Interrupt {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl Interrupt {
    /// Install the signal listeners
    ///
    /// # Errors
    /// Returns an error if the runtime cannot register a handler
    pub fn install() -> Result<Self> {
        #[cfg(unix)]
        {
            use anyhow::Context;
            use tokio::signal::unix::{signal, SignalKind};

            Ok(Self {
                sigint: signal(SignalKind::interrupt()).context("Failed to setup SIGINT")?,
                sigterm: signal(SignalKind::terminate()).context("Failed to setup SIGTERM")?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Resolve on the first interrupt
    #[cfg_attr(not(unix), allow(unused_mut))]
    pub async fn recv(mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.sigint.recv() => tracing::info!("Received signal SIGINT, running handler"),
                _ = self.sigterm.recv() => tracing::info!("Received signal SIGTERM, running handler"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl-C, running handler");
        }
    }
}
