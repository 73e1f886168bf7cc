//! Periodic aggregation of queued records into metric points.
//!
//! Each tick visits every rule of every job. A rule with nothing queued at
//! tick start contributes nothing; its siblings are still evaluated. A rule
//! with `N` queued records drains exactly `N`, refreshes its tags from the
//! first drained record, and emits one point per metric config.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::collector::Collector;
use crate::job::MonitorJob;
use crate::rule::Rule;
use crate::snapshot::MetricPoint;
use crate::types::{AggregationType, MetricConfig};

/// Drains one rule's pending records and computes its points.
///
/// `avg` over zero contributing records emits no point. Unknown aggregation
/// types emit zero.
pub fn aggregate_rule(path: &str, rule: &mut Rule) -> Vec<MetricPoint> {
    let pending = rule.queue().len();
    if pending == 0 {
        return Vec::new();
    }

    let records = rule.queue_mut().drain(pending);
    let Some(first) = records.first() else {
        return Vec::new();
    };
    rule.refresh_tags(first);
    let tag_string = rule.tag_string();

    rule.metric_configs()
        .iter()
        .filter_map(|metric| {
            let (sum, count) = records
                .iter()
                .filter_map(|record| record.get(&metric.key))
                .map(|value| rule.resolve(&metric.key, value))
                .fold((0.0_f64, 0_u64), |(sum, count), v| (sum + v, count + 1));
            let value = compute(&metric.agg_type, sum, count)?;
            Some(point(path, metric, &tag_string, value))
        })
        .collect()
}

/// Aggregates every rule of every job, taking each job's write lock in turn.
pub fn aggregate_jobs<'a>(jobs: impl IntoIterator<Item = &'a MonitorJob>) -> Vec<MetricPoint> {
    let mut points = Vec::new();
    for job in jobs {
        let mut rules = job.rules().write();
        for rule in rules.iter_mut() {
            points.extend(aggregate_rule(job.path(), rule));
        }
    }
    points
}

fn compute(agg_type: &AggregationType, sum: f64, count: u64) -> Option<f64> {
    match agg_type {
        AggregationType::Sum => Some(sum),
        AggregationType::Count => Some(count as f64),
        AggregationType::Avg if count == 0 => None,
        AggregationType::Avg => Some(sum / count as f64),
        AggregationType::Unknown(_) => Some(0.0),
    }
}

fn point(path: &str, metric: &MetricConfig, tag_string: &str, value: f64) -> MetricPoint {
    MetricPoint {
        metric_name: metric.metric.clone(),
        source_path: path.to_string(),
        aggregation_type: metric.agg_type.clone(),
        tag_string: tag_string.to_string(),
        value,
    }
}

/// Handle for the periodic aggregation task.
#[derive(Debug)]
pub struct AggregatorHandle {
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl AggregatorHandle {
    /// Returns true until the task is stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Number of completed ticks.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Stops the task. A tick in progress runs to completion first.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

impl Drop for AggregatorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts aggregating `collector` every `interval`.
///
/// Ticks never overlap: a tick that overruns delays the next one. The first
/// tick fires one full interval after start.
pub fn spawn_aggregator(collector: Arc<Collector>, interval: Duration) -> AggregatorHandle {
    let running = Arc::new(AtomicBool::new(true));
    let ticks = Arc::new(AtomicU64::new(0));

    let task_running = Arc::clone(&running);
    let task_ticks = Arc::clone(&ticks);
    let task = tokio::spawn(async move {
        let period = interval.max(Duration::from_millis(1));
        let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = period.as_millis() as u64, "aggregator started");

        loop {
            timer.tick().await;
            if !task_running.load(Ordering::SeqCst) {
                break;
            }
            let points = collector.aggregate();
            let tick = task_ticks.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(tick, points, "aggregation tick complete");
        }
        info!("aggregator stopped");
    });

    AggregatorHandle {
        running,
        ticks,
        task,
    }
}
