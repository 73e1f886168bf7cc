//! The live set of monitor jobs and reconciliation against a pushed
//! configuration.
//!
//! A push always carries the entire desired configuration. Reconciliation
//! removes jobs whose path is absent, updates jobs whose path is present, and
//! creates and starts jobs for new paths. Every rule template in the push is
//! compiled before anything is touched, so a bad template rejects the whole
//! push and leaves the registry as it was.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::config::CollectorConfig;
use crate::error::Result;
use crate::job::MonitorJob;
use crate::persist::{PersistedJob, PersistedState};
use crate::rule::{Rule, compile_patterns};
use crate::types::JobConfig;

/// Counts of what a reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Jobs created and started.
    pub added: usize,
    /// Jobs whose rules were updated in place.
    pub updated: usize,
    /// Jobs stopped and dropped.
    pub removed: usize,
}

/// Owns every monitor job, keyed by path.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Vec<MonitorJob>,
}

impl JobRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the registry match `desired`.
    ///
    /// A kept job whose tailer has ended gets a new one.
    ///
    /// Must be called from within a tokio runtime when `desired` names new
    /// paths.
    ///
    /// # Errors
    ///
    /// Returns [`LogMonError::PatternCompile`](crate::LogMonError::PatternCompile)
    /// if any rule template fails to compile; the registry is then unchanged.
    pub fn reconcile(
        &mut self,
        desired: &[JobConfig],
        config: &CollectorConfig,
    ) -> Result<ReconcileSummary> {
        let patterns = compile_patterns(desired.iter().flat_map(|job| job.config.iter()))?;
        let desired_paths: HashSet<&str> = desired.iter().map(|job| job.path.as_str()).collect();
        let mut summary = ReconcileSummary::default();
        let mut seen = HashSet::new();

        let (kept, gone): (Vec<_>, Vec<_>) = std::mem::take(&mut self.jobs)
            .into_iter()
            .partition(|job| desired_paths.contains(job.path()));
        self.jobs = kept;
        for job in gone {
            job.destroy();
            summary.removed += 1;
        }

        for job_config in desired {
            if !seen.insert(job_config.path.as_str()) {
                continue;
            }
            if let Some(job) = self.get_mut(&job_config.path) {
                job.update(&job_config.config, &patterns, config.queue_capacity);
                if !job.is_tailing() {
                    job.start(&config.tailer);
                    info!(path = %job.path(), "monitor job tailer restarted");
                }
                summary.updated += 1;
                continue;
            }

            let job = MonitorJob::new(job_config.path.clone(), Vec::new());
            job.update(&job_config.config, &patterns, config.queue_capacity);
            self.start_job(job, config);
            summary.added += 1;
        }

        Ok(summary)
    }

    /// Recreates jobs from a saved state. Queues start empty.
    ///
    /// Rules whose template no longer compiles and jobs with an empty path
    /// are skipped with a warning. Paths already in the registry are left
    /// alone. Returns the number of jobs started.
    pub fn restore(&mut self, state: PersistedState, config: &CollectorConfig) -> usize {
        let mut restored = 0;
        for PersistedJob { path, rules } in state.jobs {
            if path.is_empty() {
                warn!("skipping saved job with empty path");
                continue;
            }
            if self.get(&path).is_some() {
                continue;
            }

            let rules = rules
                .into_iter()
                .filter_map(|saved| {
                    let regular = saved.regular.clone();
                    Rule::restore(saved, config.queue_capacity)
                        .map_err(|e| {
                            warn!(
                                path = %path,
                                regular = %regular,
                                error = %e,
                                "skipping saved rule"
                            );
                        })
                        .ok()
                })
                .collect();
            self.start_job(MonitorJob::new(path, rules), config);
            restored += 1;
        }
        restored
    }

    /// Stops and drops every job.
    pub fn clear(&mut self) {
        for job in self.jobs.drain(..) {
            job.destroy();
        }
    }

    /// Looks up a job by path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&MonitorJob> {
        self.jobs.iter().find(|job| job.path() == path)
    }

    fn get_mut(&mut self, path: &str) -> Option<&mut MonitorJob> {
        self.jobs.iter_mut().find(|job| job.path() == path)
    }

    /// Jobs in creation order.
    pub fn jobs(&self) -> impl Iterator<Item = &MonitorJob> {
        self.jobs.iter()
    }

    /// Paths of every job.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.jobs.iter().map(|job| job.path().to_string()).collect()
    }

    /// Number of jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if there are no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Configuration snapshot of every job.
    #[must_use]
    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            jobs: self.jobs.iter().map(MonitorJob::to_persisted).collect(),
        }
    }

    fn start_job(&mut self, mut job: MonitorJob, config: &CollectorConfig) {
        job.start(&config.tailer);
        info!(path = %job.path(), rules = job.rule_count(), "monitor job started");
        self.jobs.push(job);
    }
}
