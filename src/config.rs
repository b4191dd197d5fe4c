//! Configuration types for fetch-batch

use crate::error::{Error, Result};
use crate::types::DispatchClass;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Randomized pre-execution cancellation settings
///
/// When enabled, every batch that does not bring its own policy withdraws each
/// task after the first `protected_prefix` tasks with probability `probability`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CancellationConfig {
    /// Apply randomized cancellation to batches by default (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Chance that an unprotected task is withdrawn (default: 0.5)
    #[serde(default = "default_cancel_probability")]
    pub probability: f64,

    /// Number of leading tasks that are never withdrawn (default: 3)
    #[serde(default = "default_protected_prefix")]
    pub protected_prefix: usize,
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            probability: default_cancel_probability(),
            protected_prefix: default_protected_prefix(),
        }
    }
}

/// Main configuration for [`BatchCoordinator`](crate::BatchCoordinator)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of fetches running at once (default: 4)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,

    /// Notification channel capacity before slow subscribers start lagging (default: 256)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Per-fetch timeout in seconds (None = wait forever)
    ///
    /// Without a timeout a fetch that never completes keeps its batch open.
    #[serde(default, with = "optional_duration_serde")]
    pub fetch_timeout: Option<Duration>,

    /// How long shutdown waits for running fetches (default: 30 seconds)
    #[serde(default = "default_shutdown_grace", with = "duration_serde")]
    pub shutdown_grace: Duration,

    /// Dispatch class used when a batch does not choose one
    #[serde(default)]
    pub default_class: DispatchClass,

    /// Randomized cancellation settings
    #[serde(default)]
    pub cancellation: CancellationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent(),
            event_buffer: default_event_buffer(),
            fetch_timeout: None,
            shutdown_grace: default_shutdown_grace(),
            default_class: DispatchClass::default(),
            cancellation: CancellationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// Missing fields take their defaults. The result is validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that all settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_fetches == 0 {
            return Err(Error::Config {
                message: "max_concurrent_fetches must be at least 1".to_string(),
                key: Some("max_concurrent_fetches".to_string()),
            });
        }

        if self.event_buffer == 0 {
            return Err(Error::Config {
                message: "event_buffer must be at least 1".to_string(),
                key: Some("event_buffer".to_string()),
            });
        }

        if !(0.0..=1.0).contains(&self.cancellation.probability) {
            return Err(Error::Config {
                message: format!(
                    "cancellation probability must be within 0.0..=1.0, got {}",
                    self.cancellation.probability
                ),
                key: Some("cancellation.probability".to_string()),
            });
        }

        if self.fetch_timeout == Some(Duration::ZERO) {
            return Err(Error::Config {
                message: "fetch_timeout must be greater than zero when set".to_string(),
                key: Some("fetch_timeout".to_string()),
            });
        }

        Ok(())
    }
}

// Default value functions
fn default_max_concurrent() -> usize {
    4
}

fn default_event_buffer() -> usize {
    256
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(30)
}

fn default_cancel_probability() -> f64 {
    0.5
}

fn default_protected_prefix() -> usize {
    3
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
