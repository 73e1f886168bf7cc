//! Shared state for the agent's HTTP handlers.

use std::sync::Arc;
use std::time::Instant;

use claw_logmon::Collector;
use tokio::task::JoinHandle;
use tracing::debug;

/// State shared by every request handler.
#[derive(Debug)]
pub struct AgentState {
    collector: Arc<Collector>,
    persist_on_push: bool,
    start_time: Instant,
}

impl AgentState {
    /// Creates handler state around a collector.
    pub fn new(collector: Arc<Collector>, persist_on_push: bool) -> Self {
        Self {
            collector,
            persist_on_push,
            start_time: Instant::now(),
        }
    }

    /// The collector.
    #[must_use]
    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    /// Whether a successful push triggers a save.
    #[must_use]
    pub const fn persist_on_push(&self) -> bool {
        self.persist_on_push
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Saves the job configuration on the blocking pool. Failures are logged
    /// by the collector.
    pub fn save_in_background(&self) -> JoinHandle<claw_logmon::Result<()>> {
        let collector = Arc::clone(&self.collector);
        debug!("scheduling job configuration save");
        tokio::task::spawn_blocking(move || collector.save())
    }
}
