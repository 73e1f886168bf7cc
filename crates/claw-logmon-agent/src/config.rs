//! Agent configuration.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file (or
//! no file at all) gives a working agent.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use claw_logmon::config::{DEFAULT_QUEUE_CAPACITY, DEFAULT_STATE_PATH};
use claw_logmon::{CollectorConfig, TailStart, TailerConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AgentError, AgentResult};

/// Configuration for the log monitor agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Address the HTTP server listens on.
    pub listen_addr: SocketAddr,
    /// File the job configuration is saved to and restored from.
    pub state_path: PathBuf,
    /// Seconds between aggregation ticks.
    pub aggregation_interval_secs: u64,
    /// Capacity of each rule's record queue.
    pub queue_capacity: usize,
    /// Milliseconds a tailer waits at end of file before polling again.
    pub poll_interval_ms: u64,
    /// Where tailers start in files that already exist.
    pub tail_from: TailStart,
    /// Save the job configuration after every successful push.
    pub persist_on_push: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9100)),
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            aggregation_interval_secs: 10,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval_ms: 250,
            tail_from: TailStart::Beginning,
            persist_on_push: true,
        }
    }
}

impl AgentConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> AgentResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AgentError::AgentConfig(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Loads configuration from `path`, falling back to defaults if the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load(path: impl AsRef<Path>) -> AgentResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            info!(config = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> AgentResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AgentError::AgentConfig(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> AgentResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AgentError::AgentConfig(format!("failed to render TOML: {e}")))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> AgentResult<()> {
        if self.aggregation_interval_secs == 0 {
            return Err(AgentError::AgentConfig(
                "aggregation_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(AgentError::AgentConfig(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(AgentError::AgentConfig(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.state_path.as_os_str().is_empty() {
            return Err(AgentError::AgentConfig(
                "state_path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Aggregation interval as a duration.
    #[must_use]
    pub const fn aggregation_interval(&self) -> Duration {
        Duration::from_secs(self.aggregation_interval_secs)
    }

    /// Collector settings derived from this configuration.
    #[must_use]
    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig::default()
            .with_queue_capacity(self.queue_capacity)
            .with_aggregation_interval(self.aggregation_interval())
            .with_state_path(self.state_path.clone())
            .with_tailer(TailerConfig {
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                start: self.tail_from,
                ..TailerConfig::default()
            })
    }
}
