//! Store configuration.
//!
//! `retention` and `prune_interval` are advisory: the store never prunes on
//! its own. A scheduler outside the store is expected to call
//! [`crate::Store::prune_expired`] every `prune_interval`.
//!
//! Configuration files are JSON, with durations in humantime form:
//!
//! ```json
//! {
//!   "path": "/var/lib/vigil/metrics.redb",
//!   "retention": "24h",
//!   "prune_interval": "1h",
//!   "open_timeout": "5s"
//! }
//! ```
//!
//! Every field but `path` may be omitted.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default sample retention.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Default interval between scheduled prunes.
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default time to wait for another handle to release the store file.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration consumed by [`crate::Store::open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Location of the store file.
    pub path: PathBuf,
    /// How long samples are kept.
    #[serde(with = "humantime_serde", default = "default_retention")]
    pub retention: Duration,
    /// How often an external scheduler should prune.
    #[serde(with = "humantime_serde", default = "default_prune_interval")]
    pub prune_interval: Duration,
    /// How long `open` waits for a file lock held by another handle.
    #[serde(with = "humantime_serde", default = "default_open_timeout")]
    pub open_timeout: Duration,
}

fn default_retention() -> Duration {
    DEFAULT_RETENTION
}

fn default_prune_interval() -> Duration {
    DEFAULT_PRUNE_INTERVAL
}

fn default_open_timeout() -> Duration {
    DEFAULT_OPEN_TIMEOUT
}

impl StoreConfig {
    /// Creates a configuration for the store at `path` with default durations.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            retention: DEFAULT_RETENTION,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }

    /// Sets the retention.
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Sets the prune interval.
    #[must_use]
    pub fn with_prune_interval(mut self, prune_interval: Duration) -> Self {
        self.prune_interval = prune_interval;
        self
    }

    /// Sets the open timeout. Zero means a single attempt.
    #[must_use]
    pub fn with_open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }

    /// Checks that the configuration can open a store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the path is empty, a duration is
    /// zero, or the prune interval exceeds the retention.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(invalid("path cannot be empty"));
        }
        if self.retention.is_zero() {
            return Err(invalid("retention must be greater than zero"));
        }
        if self.prune_interval.is_zero() {
            return Err(invalid("prune_interval must be greater than zero"));
        }
        if self.prune_interval > self.retention {
            return Err(invalid(format!(
                "prune_interval ({}) cannot exceed retention ({})",
                humantime::format_duration(self.prune_interval),
                humantime::format_duration(self.retention),
            )));
        }
        Ok(())
    }

    /// Reads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] if the file
    /// cannot be loaded, or the error from [`StoreConfig::validate`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(reason: impl Into<String>) -> crate::VigilError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
    .into()
}
