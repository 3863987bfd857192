//! Configuration for lockpick
//!
//! Values are layered, later layers winning:
//! 1. Built-in defaults
//! 2. A TOML file: `--config <file>` if given, otherwise the global
//!    `lockpick/config.toml` in the platform config directory when present
//! 3. `LOCKPICK_*` environment variables
//! 4. Command-line flags

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use lockpick_core::{
    guard::DEFAULT_CLEANUP_TIMEOUT, path::normalize_chroot, RetryPolicy,
};
use serde::Deserialize;

use crate::{Error, Result};

/// Default ensemble address
pub const DEFAULT_SERVERS: &str = "127.0.0.1:2181";

/// Default chroot applied to every lock path
pub const DEFAULT_CHROOT: &str = "/devops";

/// Fully resolved settings for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Comma-separated `host:port` list
    pub servers: String,
    /// Prefix applied to all paths, `None` for the root
    pub chroot: Option<String>,
    /// Identity stored on lock or verified on unlock
    pub identifier: Option<String>,
    /// Poll count while acquiring
    pub retry_count: u32,
    /// Wait between polls
    pub retry_sleep: Duration,
    /// Session timeout negotiated with the ensemble
    pub session_timeout: Duration,
    /// Bound on each network call of interrupt cleanup
    pub cleanup_timeout: Duration,
    /// Create session-bound lock nodes
    pub ephemeral: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: DEFAULT_SERVERS.to_string(),
            chroot: Some(DEFAULT_CHROOT.to_string()),
            identifier: None,
            retry_count: 3,
            retry_sleep: Duration::from_secs(3),
            session_timeout: Duration::from_secs(10),
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
            ephemeral: false,
        }
    }
}

/// One layer of optional settings (file, environment or flags)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub servers: Option<String>,
    pub chroot: Option<String>,
    pub identifier: Option<String>,
    pub retry_count: Option<u32>,
    /// Seconds
    pub retry_sleep: Option<u64>,
    /// Seconds
    pub session_timeout: Option<u64>,
    /// Seconds
    pub cleanup_timeout: Option<u64>,
    pub ephemeral: Option<bool>,
}

impl Config {
    /// Resolve the configuration for one command.
    ///
    /// # Errors
    ///
    /// Returns a config error when a file cannot be read or parsed, an
    /// environment value is malformed, or the result fails validation.
    pub async fn load(config_file: Option<&Path>, flags: ConfigLayer) -> Result<Self> {
        let mut config = Self::default();

        match config_file {
            Some(path) => config.merge(load_toml_file(path).await?),
            None => {
                if let Some(path) = global_config_path().filter(|p| p.exists()) {
                    config.merge(load_toml_file(&path).await?);
                }
            }
        }

        config.merge(ConfigLayer::from_env()?);
        config.merge(flags);
        config.validate()?;

        Ok(config)
    }

    /// Apply every value set in `layer`
    pub fn merge(&mut self, layer: ConfigLayer) {
        if let Some(servers) = layer.servers {
            self.servers = servers;
        }
        if let Some(chroot) = layer.chroot {
            self.chroot = Some(chroot);
        }
        if let Some(identifier) = layer.identifier {
            self.identifier = Some(identifier).filter(|id| !id.is_empty());
        }
        if let Some(count) = layer.retry_count {
            self.retry_count = count;
        }
        if let Some(secs) = layer.retry_sleep {
            self.retry_sleep = Duration::from_secs(secs);
        }
        if let Some(secs) = layer.session_timeout {
            self.session_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = layer.cleanup_timeout {
            self.cleanup_timeout = Duration::from_secs(secs);
        }
        if let Some(ephemeral) = layer.ephemeral {
            self.ephemeral = ephemeral;
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.servers.trim().is_empty() {
            return Err(Error::Config("servers cannot be empty".to_string()));
        }
        if self.session_timeout.is_zero() || self.cleanup_timeout.is_zero() {
            return Err(Error::Config(
                "session and cleanup timeouts must be greater than zero".to_string(),
            ));
        }
        self.retry_policy()?;

        self.chroot = match self.chroot.as_deref() {
            Some(raw) => normalize_chroot(raw).map_err(|e| Error::Config(e.to_string()))?,
            None => None,
        };
        Ok(())
    }

    /// Poll cadence for acquisitions
    ///
    /// # Errors
    ///
    /// Returns a config error when the retry sleep is zero.
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(self.retry_count, self.retry_sleep)
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Connect string with the chroot suffix, e.g. `host:2181/devops`
    #[must_use]
    pub fn connect_string(&self) -> String {
        format!("{}{}", self.servers, self.chroot.as_deref().unwrap_or_default())
    }
}

impl ConfigLayer {
    /// Read the `LOCKPICK_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns a config error when a numeric or boolean value does not parse.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            servers: std::env::var("LOCKPICK_SERVERS").ok(),
            chroot: std::env::var("LOCKPICK_CHROOT").ok(),
            identifier: std::env::var("LOCKPICK_IDENTIFIER").ok(),
            retry_count: env_parse("LOCKPICK_RETRY_COUNT")?,
            retry_sleep: env_parse("LOCKPICK_RETRY_SLEEP")?,
            session_timeout: env_parse("LOCKPICK_SESSION_TIMEOUT")?,
            cleanup_timeout: env_parse("LOCKPICK_CLEANUP_TIMEOUT")?,
            ephemeral: env_parse("LOCKPICK_EPHEMERAL")?,
        })
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(name)
        .ok()
        .map(|value| {
            value
                .parse()
                .map_err(|e| Error::Config(format!("Invalid {name} value: {e}")))
        })
        .transpose()
}

/// Path to the global config file
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "lockpick")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

async fn load_toml_file(path: &Path) -> Result<ConfigLayer> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {e}", path.display()))
    })?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))
}
