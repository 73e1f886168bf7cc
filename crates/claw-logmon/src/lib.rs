//! # claw-logmon
//!
//! Regex-driven log file monitoring for Clawbernetes nodes.
//!
//! Jobs follow log files and match every new line against their rules. A
//! rule template marks where a JSON fragment sits in the line with
//! `${json_content}`; matched fragments become records in the rule's bounded
//! queue. A periodic aggregator drains the queues and turns records into
//! tagged metric points, which are scraped in the Prometheus text format.
//! The whole job set is replaced by configuration pushes and can be saved
//! to and restored from disk.
//!
//! This crate provides:
//!
//! - [`Collector`]: registry, snapshot store, and persistence in one object
//! - [`JobRegistry`]: monitor jobs and reconciliation against a push
//! - [`Rule`]: compiled template, tags, metrics, and record queue
//! - [`spawn_tailer`] / [`spawn_aggregator`]: the background tasks
//! - [`JobConfig`] / [`RuleConfig`]: the push payload
//!
//! ## Example
//!
//! ```rust
//! use claw_logmon::{AggregationType, FieldValue, MetricConfig, Rule, RuleConfig};
//!
//! let config = RuleConfig::new("REQ ${json_content}")
//!     .with_tags("host")
//!     .with_metric(MetricConfig::new("latency", "app_latency", AggregationType::Avg));
//! let rule = Rule::new(&config, 16)?;
//!
//! let record = rule.extract(r#"REQ {"host":"a","latency":10}"#);
//! assert_eq!(
//!     record.and_then(|r| r.get("latency").cloned()),
//!     Some(FieldValue::Number(10.0))
//! );
//! # Ok::<(), claw_logmon::LogMonError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregator;
pub mod collector;
pub mod config;
pub mod error;
pub mod job;
pub mod pattern;
pub mod persist;
pub mod prometheus;
pub mod record;
pub mod registry;
pub mod rule;
pub mod snapshot;
pub mod tailer;
pub mod types;

// Re-export main types
pub use aggregator::{AggregatorHandle, aggregate_jobs, aggregate_rule, spawn_aggregator};
pub use collector::Collector;
pub use config::{CollectorConfig, TailStart, TailerConfig};
pub use error::{LogMonError, Result};
pub use job::MonitorJob;
pub use persist::{PersistedJob, PersistedRule, PersistedState};
pub use record::{ExtractedRecord, FieldValue};
pub use registry::{JobRegistry, ReconcileSummary};
pub use rule::{RecordQueue, Rule};
pub use snapshot::{MetricPoint, MetricSnapshotStore};
pub use tailer::{TailerHandle, spawn_tailer};
pub use types::{
    AggregationType, JobConfig, MetricConfig, RuleConfig, StringMapping, parse_push,
};
