use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Controls the event pool shared by scrape schedulers.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EventPoolConfig {
    /// Makes the pool safe for concurrent producers and a maintenance task.
    ///
    /// Defaults to `true`. Disable only when a single task owns the pool.
    pub enable_lock: bool,
    /// Seconds between two garbage collection cycles.
    ///
    /// Defaults to `60`.
    pub gc_interval: u64,
}

impl Default for EventPoolConfig {
    fn default() -> Self {
        Self {
            enable_lock: true,
            gc_interval: 60,
        }
    }
}

impl EventPoolConfig {
    /// Returns the interval between two garbage collection cycles.
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.gc_interval == 0 {
            return Err(ConfigError::invalid(
                "gc_interval",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
