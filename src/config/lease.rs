//! Lease manager configuration
//!
//! ```toml
//! [lease]
//! event_channel_capacity = 1024
//! max_lease_duration_ms = 3600000
//! expire_retry_interval_ms = 1000
//! max_sleep_ms = 3600000
//! ```

use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Tuning for the coordinator loop.
///
/// The conflict-retry policy (one refresh, one re-evaluation) is fixed.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LeaseConfig {
    /// Requests that may queue for the coordinator before callers block on
    /// submission.
    ///
    /// Default: 1024
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Longest lease a single claim or extend may ask for.
    ///
    /// Default: 3600000 (1 hour)
    #[serde(default = "default_max_lease_duration_ms")]
    pub max_lease_duration_ms: u64,

    /// How long to back off when the store keeps refusing to expire a lease
    /// the cache says is due (e.g. clock skew between coordinators).
    ///
    /// Range: 1-60000
    /// Default: 1000
    #[serde(default = "default_expire_retry_interval_ms")]
    pub expire_retry_interval_ms: u64,

    /// Longest the coordinator goes without a store refresh, even with
    /// nothing due. Picks up leases other coordinators wrote and abandoned.
    ///
    /// Default: 3600000 (1 hour)
    #[serde(default = "default_max_sleep_ms")]
    pub max_sleep_ms: u64,
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_max_lease_duration_ms() -> u64 {
    3_600_000
}

fn default_expire_retry_interval_ms() -> u64 {
    1000
}

fn default_max_sleep_ms() -> u64 {
    3_600_000
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            max_lease_duration_ms: default_max_lease_duration_ms(),
            expire_retry_interval_ms: default_expire_retry_interval_ms(),
            max_sleep_ms: default_max_sleep_ms(),
        }
    }
}

impl LeaseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.event_channel_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "event_channel_capacity must be greater than 0".into(),
            )));
        }

        if self.max_lease_duration_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_lease_duration_ms must be greater than 0".into(),
            )));
        }

        if !(1..=60_000).contains(&self.expire_retry_interval_ms) {
            return Err(Error::Config(ConfigError::Message(format!(
                "expire_retry_interval_ms must be between 1 and 60000, got {}",
                self.expire_retry_interval_ms
            ))));
        }

        if self.max_sleep_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_sleep_ms must be greater than 0".into(),
            )));
        }

        Ok(())
    }

    pub fn max_lease_duration(&self) -> Duration {
        Duration::from_millis(self.max_lease_duration_ms)
    }

    pub fn expire_retry_interval(&self) -> Duration {
        Duration::from_millis(self.expire_retry_interval_ms)
    }

    pub fn max_sleep(&self) -> Duration {
        Duration::from_millis(self.max_sleep_ms)
    }
}
