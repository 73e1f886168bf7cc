//! Scrape encoding for metric snapshots.
//!
//! Every point becomes one sample of the `node_business_monitor_value` gauge
//! family, labeled with the metric name, tag string, source path, and
//! aggregation type. A fresh registry is built per scrape so points dropped
//! from the snapshot disappear from the output.
//!
//! Label values are escaped here; the text encoder writes them verbatim.

use std::collections::HashSet;
use std::sync::atomic::AtomicU64;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode as encode_text;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::snapshot::MetricPoint;

/// Gauge family name.
pub const FAMILY_NAME: &str = "node_business_monitor_value";

/// Gauge family help text. The encoder appends the final period.
pub const FAMILY_HELP: &str = "Show business data from log file";

/// Content-Type of [`encode`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Labels of one business metric sample.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BusinessLabels {
    /// Configured metric name.
    pub key: String,
    /// Tag string of the rule.
    pub tags: String,
    /// Watched file path.
    pub path: String,
    /// Aggregation type.
    pub agg: String,
}

impl From<&MetricPoint> for BusinessLabels {
    fn from(point: &MetricPoint) -> Self {
        Self {
            key: escape_label_value(&point.metric_name),
            tags: escape_label_value(&point.tag_string),
            path: escape_label_value(&point.source_path),
            agg: escape_label_value(&point.aggregation_type.to_string()),
        }
    }
}

/// Escapes a label value for the text exposition format.
pub fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders `points` in the Prometheus text format.
///
/// Points sharing every label collapse into one sample holding the last value.
pub fn encode(points: &[MetricPoint]) -> String {
    let family = Family::<BusinessLabels, Gauge<f64, AtomicU64>>::default();
    let mut seen = HashSet::with_capacity(points.len());
    for point in points {
        let labels = BusinessLabels::from(point);
        if !seen.insert(labels.clone()) {
            tracing::warn!(
                metric = %point.metric_name,
                tags = %point.tag_string,
                path = %point.source_path,
                agg = %point.aggregation_type,
                "duplicate metric labels, earlier value replaced"
            );
        }
        family.get_or_create(&labels).set(point.value);
    }

    let mut registry = Registry::default();
    registry.register(FAMILY_NAME, FAMILY_HELP, family);

    let mut buffer = String::new();
    if encode_text(&mut buffer, &registry).is_err() {
        tracing::error!("failed to encode business metrics");
        return String::new();
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AggregationType;

    fn point(name: &str, tags: &str, agg: AggregationType, value: f64) -> MetricPoint {
        MetricPoint {
            metric_name: name.to_string(),
            source_path: "/var/log/app.log".to_string(),
            aggregation_type: agg,
            tag_string: tags.to_string(),
            value,
        }
    }

    #[test]
    fn encodes_labeled_gauge() {
        let output = encode(&[point(
            "app_latency",
            "host=a,status=200",
            AggregationType::Avg,
            12.5,
        )]);

        assert!(
            output.contains("# HELP node_business_monitor_value Show business data from log file")
        );
        assert!(output.contains("# TYPE node_business_monitor_value gauge"));
        assert!(output.contains("key=\"app_latency\""));
        assert!(output.contains("tags=\"host=a,status=200\""));
        assert!(output.contains("path=\"/var/log/app.log\""));
        assert!(output.contains("agg=\"avg\""));
        assert!(output.contains(" 12.5"));
    }

    #[test]
    fn one_sample_per_point() {
        let output = encode(&[
            point("a", "", AggregationType::Sum, 1.0),
            point("b", "", AggregationType::Count, 2.0),
        ]);
        let samples = output
            .lines()
            .filter(|l| l.starts_with("node_business_monitor_value{"))
            .count();
        assert_eq!(samples, 2);
    }

    #[test]
    fn escapes_label_values() {
        assert_eq!(escape_label_value(r"C:\logs"), r"C:\\logs");
        assert_eq!(escape_label_value("say \"hi\""), r#"say \"hi\""#);
        assert_eq!(escape_label_value("a\nb"), r"a\nb");
        assert_eq!(escape_label_value("host=a,status=200"), "host=a,status=200");
    }

    #[test]
    fn quoted_tags_keep_sample_on_one_line() {
        let mut p = point("m", "msg=say \"hi\"\nnext", AggregationType::Sum, 1.0);
        p.source_path = r"C:\logs\app.log".to_string();

        let output = encode(&[p]);
        let samples: Vec<_> = output
            .lines()
            .filter(|l| l.starts_with("node_business_monitor_value{"))
            .collect();

        assert_eq!(samples.len(), 1);
        assert!(samples[0].contains(r#"tags="msg=say \"hi\"\nnext""#));
        assert!(samples[0].contains(r#"path="C:\\logs\\app.log""#));
        assert!(samples[0].ends_with(" 1.0"));
        assert!(!output.lines().any(|l| l.starts_with("next")));
    }

    #[test]
    fn duplicate_labels_keep_last_value() {
        let output = encode(&[
            point("m", "host=a", AggregationType::Sum, 1.0),
            point("m", "host=a", AggregationType::Sum, 4.0),
        ]);
        let samples: Vec<_> = output
            .lines()
            .filter(|l| l.starts_with("node_business_monitor_value{"))
            .collect();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].ends_with(" 4.0"));
    }

    #[test]
    fn empty_snapshot_has_no_samples() {
        let output = encode(&[]);
        assert!(!output.contains("node_business_monitor_value{"));
    }
}
