//! The collector: job registry, snapshot store, and their configuration in
//! one explicitly constructed object.
//!
//! The configuration-push handler, the scrape handler, and the aggregation
//! task share one `Arc<Collector>`. Lock order is registry before job.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::aggregator::aggregate_jobs;
use crate::config::CollectorConfig;
use crate::error::Result;
use crate::persist::{self, PersistedState};
use crate::prometheus;
use crate::registry::{JobRegistry, ReconcileSummary};
use crate::snapshot::{MetricPoint, MetricSnapshotStore};
use crate::types::{JobConfig, parse_push};

/// Owns every monitor job and the latest metric snapshot.
#[derive(Debug)]
pub struct Collector {
    config: CollectorConfig,
    registry: RwLock<JobRegistry>,
    snapshot: MetricSnapshotStore,
    save_lock: Mutex<()>,
}

impl Collector {
    /// Creates a collector with no jobs.
    #[must_use]
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(JobRegistry::new()),
            snapshot: MetricSnapshotStore::new(),
            save_lock: Mutex::new(()),
        }
    }

    /// The collector's configuration.
    #[must_use]
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Decodes a push body and reconciles against it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the body is malformed or a rule
    /// template does not compile. The registry is unchanged on error.
    pub fn apply_push(&self, body: &[u8]) -> Result<ReconcileSummary> {
        let desired = parse_push(body).inspect_err(|e| {
            warn!(error = %e, "rejecting configuration push");
        })?;
        self.reconcile(&desired)
    }

    /// Makes the job set match `desired` under the registry write lock.
    ///
    /// # Errors
    ///
    /// Returns [`LogMonError::PatternCompile`](crate::LogMonError::PatternCompile)
    /// if a rule template does not compile.
    pub fn reconcile(&self, desired: &[JobConfig]) -> Result<ReconcileSummary> {
        let summary = self
            .registry
            .write()
            .reconcile(desired, &self.config)
            .inspect_err(|e| warn!(error = %e, "rejecting configuration push"))?;
        info!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            "configuration applied"
        );
        Ok(summary)
    }

    /// Runs one aggregation pass and replaces the snapshot. Returns the
    /// number of points produced.
    pub fn aggregate(&self) -> usize {
        let points = {
            let registry = self.registry.read();
            aggregate_jobs(registry.jobs())
        };
        let produced = points.len();
        self.snapshot.replace(points);
        produced
    }

    /// The current metric snapshot.
    #[must_use]
    pub fn metric_points(&self) -> Arc<Vec<MetricPoint>> {
        self.snapshot.current()
    }

    /// The current snapshot in the Prometheus text format.
    #[must_use]
    pub fn encode_metrics(&self) -> String {
        prometheus::encode(&self.snapshot.current())
    }

    /// When the snapshot was last replaced.
    #[must_use]
    pub fn last_aggregation(&self) -> Option<DateTime<Utc>> {
        self.snapshot.updated_at()
    }

    /// Paths of every job.
    #[must_use]
    pub fn job_paths(&self) -> Vec<String> {
        self.registry.read().paths()
    }

    /// Number of jobs.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Records waiting in rule queues across every job.
    #[must_use]
    pub fn pending_records(&self) -> usize {
        let registry = self.registry.read();
        registry
            .jobs()
            .map(|job| job.rules().read().iter().map(|rule| rule.queue().len()).sum::<usize>())
            .sum()
    }

    /// Configuration of every job, as written by [`Self::save`].
    #[must_use]
    pub fn persisted_state(&self) -> PersistedState {
        self.registry.read().to_persisted()
    }

    /// Writes the job configuration to the configured state path.
    ///
    /// Failures are logged; the in-memory state is never affected.
    ///
    /// # Errors
    ///
    /// Returns [`LogMonError::Persistence`](crate::LogMonError::Persistence)
    /// if the file could not be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&self.config.state_path)
    }

    /// Like [`Self::save`], to an explicit path.
    ///
    /// # Errors
    ///
    /// Returns [`LogMonError::Persistence`](crate::LogMonError::Persistence)
    /// if the file could not be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Snapshot and write under one lock: saves land in snapshot order.
        let _guard = self.save_lock.lock();
        let state = self.persisted_state();
        persist::save(path, &state).inspect_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to save job configuration");
        })?;
        info!(path = %path.display(), jobs = state.jobs.len(), "job configuration saved");
        Ok(())
    }

    /// Restores jobs from the configured state path and starts their tailers.
    ///
    /// A missing or unreadable file leaves the registry as it was. Returns the
    /// number of jobs restored.
    pub fn load(&self) -> usize {
        self.load_from(&self.config.state_path)
    }

    /// Like [`Self::load`], from an explicit path.
    pub fn load_from(&self, path: &Path) -> usize {
        let state = match persist::load(path) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring saved job configuration");
                return 0;
            }
        };
        self.restore(state)
    }

    /// Recreates jobs from an already decoded state.
    pub fn restore(&self, state: PersistedState) -> usize {
        let restored = self.registry.write().restore(state, &self.config);
        if restored > 0 {
            info!(jobs = restored, "job configuration restored");
        } else {
            debug!("no jobs restored");
        }
        restored
    }

    /// Stops every tailer and drops every job.
    pub fn shutdown(&self) {
        let mut registry = self.registry.write();
        let jobs = registry.len();
        registry.clear();
        info!(jobs, "collector shut down");
    }
}
