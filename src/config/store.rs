use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Settings for the built-in [`crate::MemoryStore`].
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StoreConfig {
    /// Granted expiries are rounded up to a multiple of this many
    /// milliseconds. 0 grants exactly what was asked.
    ///
    /// Range: 0-60000
    /// Default: 1000
    #[serde(default = "default_grant_quantum_ms")]
    pub grant_quantum_ms: u64,
}

fn default_grant_quantum_ms() -> u64 {
    1000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            grant_quantum_ms: default_grant_quantum_ms(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.grant_quantum_ms > 60_000 {
            return Err(Error::Config(ConfigError::Message(format!(
                "grant_quantum_ms must be at most 60000, got {}",
                self.grant_quantum_ms
            ))));
        }
        Ok(())
    }
}
