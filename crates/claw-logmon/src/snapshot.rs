//! The last computed set of metric points.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::types::AggregationType;

/// One aggregated value produced by a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    /// Configured metric name.
    pub metric_name: String,
    /// Watched file the records came from.
    pub source_path: String,
    /// Aggregation that produced the value.
    pub aggregation_type: AggregationType,
    /// `key=value` pairs of the rule's tags.
    pub tag_string: String,
    /// The value.
    pub value: f64,
}

#[derive(Debug, Default)]
struct Snapshot {
    points: Arc<Vec<MetricPoint>>,
    updated_at: Option<DateTime<Utc>>,
}

/// Holds the current snapshot. Readers get a shared handle to the whole set,
/// never a partially replaced one.
#[derive(Debug, Default)]
pub struct MetricSnapshotStore {
    inner: RwLock<Snapshot>,
}

impl MetricSnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole snapshot.
    pub fn replace(&self, points: Vec<MetricPoint>) {
        let mut inner = self.inner.write();
        inner.points = Arc::new(points);
        inner.updated_at = Some(Utc::now());
    }

    /// The current snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<Vec<MetricPoint>> {
        Arc::clone(&self.inner.read().points)
    }

    /// When the snapshot was last replaced.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().updated_at
    }
}
