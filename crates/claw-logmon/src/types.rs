//! Configuration types shared by the push payload, rules, and persistence.
//!
//! This module provides:
//! - [`JobConfig`] / [`RuleConfig`]: one entry of the configuration push
//! - [`MetricConfig`] and [`AggregationType`]: what to compute per rule
//! - [`StringMapping`]: fallback numbers for non-numeric captured values
//! - [`parse_push`]: decodes and validates a whole push body

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::{LogMonError, Result};

/// How a metric is aggregated over one tick's records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AggregationType {
    /// Sum of resolved values.
    Sum,
    /// Mean of resolved values.
    Avg,
    /// Number of records carrying the key.
    Count,
    /// An aggregation this agent does not know; always reports zero.
    Unknown(String),
}

impl AggregationType {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Count => "count",
            Self::Unknown(name) => name,
        }
    }
}

impl From<&str> for AggregationType {
    fn from(name: &str) -> Self {
        match name {
            "sum" => Self::Sum,
            "avg" => Self::Avg,
            "count" => Self::Count,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for AggregationType {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<AggregationType> for String {
    fn from(agg: AggregationType) -> Self {
        agg.as_str().to_string()
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One metric computed from a rule's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Record field the values are read from.
    pub key: String,
    /// Name reported on scrape.
    pub metric: String,
    /// Aggregation applied over the tick.
    pub agg_type: AggregationType,
}

impl MetricConfig {
    /// Creates a metric config.
    pub fn new(
        key: impl Into<String>,
        metric: impl Into<String>,
        agg_type: AggregationType,
    ) -> Self {
        Self {
            key: key.into(),
            metric: metric.into(),
            agg_type,
        }
    }
}

/// Maps an exact non-numeric value of a field to a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringMapping {
    /// Record field this mapping applies to.
    pub key: String,
    /// Exact captured text to match.
    pub string_value: String,
    /// Number used in place of the text.
    pub int_value: f64,
}

impl StringMapping {
    /// Creates a mapping.
    pub fn new(key: impl Into<String>, string_value: impl Into<String>, int_value: f64) -> Self {
        Self {
            key: key.into(),
            string_value: string_value.into(),
            int_value,
        }
    }
}

/// One rule of a pushed job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Rule template; also the rule's identity.
    pub regular: String,
    /// Comma-separated tag keys.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: String,
    /// Fallback numbers for non-numeric values.
    #[serde(default, deserialize_with = "null_as_default")]
    pub string_map: Vec<StringMapping>,
    /// Metrics computed from matched records.
    #[serde(default, deserialize_with = "null_as_default")]
    pub metric_config: Vec<MetricConfig>,
}

impl RuleConfig {
    /// Creates a rule config with no tags, mappings, or metrics.
    pub fn new(regular: impl Into<String>) -> Self {
        Self {
            regular: regular.into(),
            ..Self::default()
        }
    }

    /// Sets the comma-separated tag keys.
    #[must_use]
    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    /// Adds a metric.
    #[must_use]
    pub fn with_metric(mut self, metric: MetricConfig) -> Self {
        self.metric_config.push(metric);
        self
    }

    /// Adds a string fallback.
    #[must_use]
    pub fn with_mapping(mut self, mapping: StringMapping) -> Self {
        self.string_map.push(mapping);
        self
    }

    /// Tag keys parsed from [`Self::tags`].
    #[must_use]
    pub fn tag_keys(&self) -> Vec<String> {
        parse_tag_keys(&self.tags)
    }
}

/// Desired configuration for one watched file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobConfig {
    /// Watched file path; unique across the registry.
    pub path: String,
    /// Rules applied to every new line.
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: Vec<RuleConfig>,
}

impl JobConfig {
    /// Creates a job config with no rules.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            config: Vec::new(),
        }
    }

    /// Adds a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: RuleConfig) -> Self {
        self.config.push(rule);
        self
    }
}

/// Splits a comma-separated tag list, dropping blank entries.
#[must_use]
pub fn parse_tag_keys(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Decodes a configuration push body.
///
/// The body must be a JSON array of [`JobConfig`]. Paths and rule templates
/// must be non-empty. When a path appears more than once the first entry is
/// kept.
///
/// # Errors
///
/// Returns [`LogMonError::ConfigParse`] on malformed JSON or failed validation.
pub fn parse_push(body: &[u8]) -> Result<Vec<JobConfig>> {
    let jobs: Vec<JobConfig> = serde_json::from_slice(body)?;
    validate_push(jobs)
}

/// Validates already-decoded job configs; see [`parse_push`].
///
/// # Errors
///
/// Returns [`LogMonError::ConfigParse`] if a path or rule template is empty.
pub fn validate_push(jobs: Vec<JobConfig>) -> Result<Vec<JobConfig>> {
    let mut seen = HashSet::new();
    let mut accepted = Vec::with_capacity(jobs.len());

    for job in jobs {
        if job.path.trim().is_empty() {
            return Err(LogMonError::ConfigParse("job path cannot be empty".to_string()));
        }
        if let Some(rule) = job.config.iter().find(|r| r.regular.is_empty()) {
            return Err(LogMonError::ConfigParse(format!(
                "rule in job {:?} has an empty regular (tags {:?})",
                job.path, rule.tags
            )));
        }
        if seen.insert(job.path.clone()) {
            accepted.push(job);
        } else {
            debug!(path = %job.path, "ignoring duplicate job path in push");
        }
    }

    Ok(accepted)
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const PUSH: &str = r#"[
        {
            "path": "/var/log/app.log",
            "config": [
                {
                    "regular": "REQ ${json_content}",
                    "tags": "host,status",
                    "string_map": [{"key": "status_text", "string_value": "ok", "int_value": 1}],
                    "metric_config": [{"key": "latency", "metric": "app_latency", "agg_type": "avg"}]
                }
            ]
        }
    ]"#;

    #[test]
    fn parses_full_push() {
        let jobs = parse_push(PUSH.as_bytes()).unwrap();

        assert_eq!(jobs.len(), 1);
        let rule = &jobs[0].config[0];
        assert_eq!(rule.regular, "REQ ${json_content}");
        assert_eq!(rule.tag_keys(), vec!["host", "status"]);
        assert_eq!(rule.string_map[0], StringMapping::new("status_text", "ok", 1.0));
        assert_eq!(
            rule.metric_config[0],
            MetricConfig::new("latency", "app_latency", AggregationType::Avg)
        );
    }

    #[test]
    fn accepts_null_arrays() {
        let body = r#"[{"path":"/a","config":[{"regular":"x","tags":"","string_map":null,"metric_config":null}]}]"#;
        let jobs = parse_push(body.as_bytes()).unwrap();
        assert!(jobs[0].config[0].string_map.is_empty());
        assert!(jobs[0].config[0].metric_config.is_empty());

        let body = r#"[{"path":"/a","config":null}]"#;
        assert!(parse_push(body.as_bytes()).unwrap()[0].config.is_empty());
    }

    #[test]
    fn empty_array_is_valid() {
        assert!(parse_push(b"[]").unwrap().is_empty());
    }

    #[test_case(b"{" ; "truncated")]
    #[test_case(b"{}" ; "object instead of array")]
    #[test_case(br#"[{"config":[]}]"# ; "missing path")]
    #[test_case(br#"[{"path":""}]"# ; "empty path")]
    #[test_case(br#"[{"path":"/a","config":[{"regular":""}]}]"# ; "empty regular")]
    fn rejects_malformed(body: &[u8]) {
        let err = parse_push(body).unwrap_err();
        assert!(matches!(err, LogMonError::ConfigParse(_)));
    }

    #[test]
    fn duplicate_paths_keep_first() {
        let body = r#"[{"path":"/a","config":[{"regular":"one"}]},{"path":"/a","config":[{"regular":"two"}]}]"#;
        let jobs = parse_push(body.as_bytes()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].config[0].regular, "one");
    }

    #[test_case("host,status", &["host", "status"] ; "plain")]
    #[test_case(" host , status ", &["host", "status"] ; "whitespace")]
    #[test_case("", &[] ; "empty")]
    #[test_case("a,,b,", &["a", "b"] ; "blank entries")]
    fn tag_key_parsing(tags: &str, expected: &[&str]) {
        assert_eq!(parse_tag_keys(tags), expected);
    }

    #[test_case("sum", AggregationType::Sum)]
    #[test_case("avg", AggregationType::Avg)]
    #[test_case("count", AggregationType::Count)]
    #[test_case("p99", AggregationType::Unknown("p99".to_string()))]
    fn aggregation_names_round_trip(name: &str, expected: AggregationType) {
        let parsed = AggregationType::from(name);
        assert_eq!(parsed, expected);
        assert_eq!(parsed.as_str(), name);
        let json = serde_json::to_string(&parsed).unwrap();
        assert_eq!(json, format!("\"{name}\""));
    }
}
