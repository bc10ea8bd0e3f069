use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Dispatch engine tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RouterConfig {
    /// Number of long-lived async dispatch workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the async job queue; jobs beyond it are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound for a single outbound function call (ms)
    #[serde(default = "default_function_timeout_ms")]
    pub function_timeout_ms: u64,

    /// How long `drain()` waits for queued and in-flight jobs (ms)
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            function_timeout_ms: default_function_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("router.workers must be greater than 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "router.queue_capacity must be greater than 0".into(),
            ));
        }
        if self.function_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "router.function_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn function_timeout(&self) -> Duration {
        Duration::from_millis(self.function_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

fn default_workers() -> usize {
    20
}
fn default_queue_capacity() -> usize {
    100
}
fn default_function_timeout_ms() -> u64 {
    30_000
}
fn default_drain_timeout_ms() -> u64 {
    10_000
}
