use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Everything tunable about the worker, loaded from TOML. Missing keys keep their defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub session: SessionSettings,
    pub work: WorkSettings,
    pub gateway: GatewaySettings,
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    /// Close the session after this long without an accepted move or restart.
    pub inactivity_timeout_secs: u64,
    /// How often the control loop re-checks the inactivity deadline.
    pub check_interval_secs: u64,
    /// How long the registry keeps answering for a closed session before dropping it.
    pub closed_retention_secs: u64,
}

impl SessionSettings {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        // a zero period would make the ticker panic
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn closed_retention(&self) -> Duration {
        Duration::from_secs(self.closed_retention_secs)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 24 * 60 * 60,
            check_interval_secs: 60,
            closed_retention_secs: 5 * 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkSettings {
    pub start_to_close_timeout_secs: u64,
    /// Fixed base seed for board generation; random per board when unset.
    pub seed: Option<u64>,
}

impl WorkSettings {
    pub fn start_to_close_timeout(&self) -> Duration {
        Duration::from_secs(self.start_to_close_timeout_secs)
    }
}

impl Default for WorkSettings {
    fn default() -> Self {
        Self {
            start_to_close_timeout_secs: 60,
            seed: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewaySettings {
    pub query_attempts: u32,
    /// Delay before retry `n` is `n * query_backoff_ms`.
    pub query_backoff_ms: u64,
}

impl GatewaySettings {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.query_backoff_ms.saturating_mul(attempt.into()))
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            query_attempts: 5,
            query_backoff_ms: 100,
        }
    }
}
