//! Monitor jobs: one watched file, its rules, and its tailer.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::config::TailerConfig;
use crate::persist::PersistedJob;
use crate::rule::{PatternCache, Rule, update_rules};
use crate::tailer::{SharedRules, TailerHandle, spawn_tailer};
use crate::types::RuleConfig;

/// A watched file path with its rules and follower task.
#[derive(Debug)]
pub struct MonitorJob {
    path: String,
    rules: SharedRules,
    tailer: Option<TailerHandle>,
}

impl MonitorJob {
    /// Creates a job that is not yet tailing.
    pub fn new(path: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            path: path.into(),
            rules: Arc::new(RwLock::new(rules)),
            tailer: None,
        }
    }

    /// Starts following the file. A running tailer is replaced.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, config: &TailerConfig) {
        let handle = spawn_tailer(
            PathBuf::from(&self.path),
            Arc::clone(&self.rules),
            config.clone(),
        );
        self.tailer = Some(handle);
    }

    /// Applies pushed rule configs under the job's write lock.
    pub fn update(&self, configs: &[RuleConfig], patterns: &PatternCache, queue_capacity: usize) {
        let mut rules = self.rules.write();
        update_rules(&mut rules, configs, patterns, queue_capacity);
    }

    /// Stops the tailer and clears the rules.
    pub fn destroy(mut self) {
        if let Some(tailer) = self.tailer.take() {
            tailer.stop();
        }
        self.rules.write().clear();
        info!(path = %self.path, "monitor job destroyed");
    }

    /// Watched file path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The job's shared rule list.
    #[must_use]
    pub fn rules(&self) -> &SharedRules {
        &self.rules
    }

    /// Number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Returns true while the tailer task is alive.
    #[must_use]
    pub fn is_tailing(&self) -> bool {
        self.tailer.as_ref().is_some_and(TailerHandle::is_running)
    }

    /// Configuration snapshot for the state file.
    #[must_use]
    pub fn to_persisted(&self) -> PersistedJob {
        PersistedJob {
            path: self.path.clone(),
            rules: self.rules.read().iter().map(Rule::to_persisted).collect(),
        }
    }
}
