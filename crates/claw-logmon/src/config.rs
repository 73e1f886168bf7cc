//! Collector configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default capacity of each rule's record queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default aggregation interval.
pub const DEFAULT_AGGREGATION_INTERVAL: Duration = Duration::from_secs(10);

/// Default location of the persisted job configuration.
pub const DEFAULT_STATE_PATH: &str = "data/business_monitor_cache.data";

/// Default limit on a single log line, newline included.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Where a tailer starts reading a file that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TailStart {
    /// Read existing content first, then follow.
    #[default]
    Beginning,
    /// Skip existing content and only follow appended lines.
    End,
}

/// Tailer behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailerConfig {
    /// How long to wait at end of file before checking for growth or rotation.
    pub poll_interval: Duration,
    /// Start position for files that already exist.
    pub start: TailStart,
    /// Lines longer than this are dropped without being matched.
    pub max_line_bytes: usize,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            start: TailStart::Beginning,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// Configuration for a [`Collector`](crate::Collector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Capacity of each rule's bounded record queue.
    pub queue_capacity: usize,
    /// Interval between aggregation ticks.
    pub aggregation_interval: Duration,
    /// File the job configuration is saved to and loaded from.
    pub state_path: PathBuf,
    /// Tailer behavior for every job.
    pub tailer: TailerConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            aggregation_interval: DEFAULT_AGGREGATION_INTERVAL,
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            tailer: TailerConfig::default(),
        }
    }
}

impl CollectorConfig {
    /// Sets the queue capacity (minimum 1).
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Sets the aggregation interval.
    #[must_use]
    pub const fn with_aggregation_interval(mut self, interval: Duration) -> Self {
        self.aggregation_interval = interval;
        self
    }

    /// Sets the state file path.
    #[must_use]
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    /// Sets the tailer configuration.
    #[must_use]
    pub const fn with_tailer(mut self, tailer: TailerConfig) -> Self {
        self.tailer = tailer;
        self
    }
}
