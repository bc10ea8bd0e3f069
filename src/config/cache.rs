use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::BackoffPolicy;
use crate::constants::DEFAULT_KEY_PREFIX;
use crate::Error;
use crate::Result;

/// Target cache and config store settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Key namespace the gateway reads and writes
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Interval between full resyncs on a healthy watch (ms, 0 disables)
    #[serde(default = "default_resync_interval_ms")]
    pub resync_interval_ms: u64,

    /// Reconnect policy for a broken watch stream
    #[serde(default)]
    pub watch_backoff: BackoffPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            resync_interval_ms: default_resync_interval_ms(),
            watch_backoff: BackoffPolicy::default(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.prefix.starts_with('/') || self.prefix.ends_with('/') {
            return Err(Error::InvalidConfig(format!(
                "cache.prefix {:?} must start with '/' and must not end with '/'",
                self.prefix
            )));
        }
        self.watch_backoff.validate()
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_ms > 0).then(|| Duration::from_millis(self.resync_interval_ms))
    }
}

/// Backing store selection
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process store, used for development and tests
    #[default]
    Embedded,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Per-watcher notification buffer; slower watchers lag and resync
    #[serde(default = "default_watch_buffer")]
    pub watch_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            watch_buffer: default_watch_buffer(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.watch_buffer == 0 {
            return Err(Error::InvalidConfig("store.watch_buffer must be greater than 0".into()));
        }
        Ok(())
    }
}

fn default_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}
fn default_resync_interval_ms() -> u64 {
    60_000
}
fn default_watch_buffer() -> usize {
    1024
}
