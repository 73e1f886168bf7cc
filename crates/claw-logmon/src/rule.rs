//! Extraction rules and their record queues.
//!
//! A [`Rule`] owns a compiled pattern, its tag and metric configuration, and a
//! bounded [`RecordQueue`]. The queue has exactly one producer (the job's
//! tailer, through a cloned sender) and one consumer (the aggregator).

use std::collections::HashMap;

use regex::Regex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::pattern;
use crate::persist::PersistedRule;
use crate::record::{ExtractedRecord, FieldValue};
use crate::types::{MetricConfig, RuleConfig, StringMapping};

/// Compiled patterns keyed by rule template.
pub type PatternCache = HashMap<String, Regex>;

/// Bounded FIFO of extracted records.
#[derive(Debug)]
pub struct RecordQueue {
    tx: mpsc::Sender<ExtractedRecord>,
    rx: mpsc::Receiver<ExtractedRecord>,
}

impl RecordQueue {
    /// Creates an empty queue holding at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self { tx, rx }
    }

    /// Returns a sender; pushes through it wait while the queue is full and
    /// fail once the queue has been dropped.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<ExtractedRecord> {
        self.tx.clone()
    }

    /// Number of queued records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of queued records.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Removes up to `n` records without waiting.
    pub fn drain(&mut self, n: usize) -> Vec<ExtractedRecord> {
        let mut records = Vec::with_capacity(n);
        while records.len() < n {
            match self.rx.try_recv() {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
        }
        records
    }
}

/// One configured extraction pattern with its tags, metrics, and queue.
#[derive(Debug)]
pub struct Rule {
    regular: String,
    pattern: Regex,
    tag_keys: Vec<String>,
    tag_values: Vec<String>,
    metric_configs: Vec<MetricConfig>,
    string_map: Vec<StringMapping>,
    queue: RecordQueue,
}

impl Rule {
    /// Builds a rule from its pushed configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LogMonError::PatternCompile`](crate::LogMonError::PatternCompile)
    /// if the template does not compile.
    pub fn new(config: &RuleConfig, queue_capacity: usize) -> Result<Self> {
        let pattern = pattern::compile(&config.regular)?;
        Ok(Self::with_pattern(config, pattern, queue_capacity))
    }

    /// Builds a rule around an already compiled pattern. Tag values start empty.
    #[must_use]
    pub fn with_pattern(config: &RuleConfig, pattern: Regex, queue_capacity: usize) -> Self {
        let tag_keys = config.tag_keys();
        let tag_values = vec![String::new(); tag_keys.len()];
        Self {
            regular: config.regular.clone(),
            pattern,
            tag_keys,
            tag_values,
            metric_configs: config.metric_config.clone(),
            string_map: config.string_map.clone(),
            queue: RecordQueue::new(queue_capacity),
        }
    }

    pub(crate) fn restore(saved: PersistedRule, queue_capacity: usize) -> Result<Self> {
        let pattern = pattern::compile(&saved.regular)?;
        let mut tag_values = saved.tags_value;
        if tag_values.len() != saved.tags_key.len() {
            warn!(
                regular = %saved.regular,
                keys = saved.tags_key.len(),
                values = tag_values.len(),
                "repairing saved tag values"
            );
            tag_values.resize(saved.tags_key.len(), String::new());
        }
        Ok(Self {
            regular: saved.regular,
            pattern,
            tag_keys: saved.tags_key,
            tag_values,
            metric_configs: saved.metric_config,
            string_map: saved.string_map,
            queue: RecordQueue::new(queue_capacity),
        })
    }

    pub(crate) fn to_persisted(&self) -> PersistedRule {
        PersistedRule {
            regular: self.regular.clone(),
            tags_key: self.tag_keys.clone(),
            tags_value: self.tag_values.clone(),
            metric_config: self.metric_configs.clone(),
            string_map: self.string_map.clone(),
        }
    }

    /// Applies a new configuration with the same template.
    ///
    /// Metric and fallback configuration are replaced. Tag values are carried
    /// over by key for keys present before and after; new keys start empty.
    /// The queue and pattern are untouched.
    pub fn reconfigure(&mut self, config: &RuleConfig) {
        let tag_keys = config.tag_keys();
        let tag_values = tag_keys
            .iter()
            .map(|key| self.tag_value(key).unwrap_or_default().to_string())
            .collect();

        self.tag_keys = tag_keys;
        self.tag_values = tag_values;
        self.metric_configs = config.metric_config.clone();
        self.string_map = config.string_map.clone();
    }

    /// Matches a line and merges every captured fragment into one record.
    ///
    /// Returns `None` if the line does not match, the pattern has no capture
    /// groups, or no fragment yielded a field. Malformed fragments are logged
    /// and skipped.
    #[must_use]
    pub fn extract(&self, line: &str) -> Option<ExtractedRecord> {
        let captures = self.pattern.captures(line)?;
        if captures.len() < 2 {
            return None;
        }

        let mut record = ExtractedRecord::new();
        for fragment in captures.iter().skip(1).flatten() {
            match ExtractedRecord::parse_fragment(fragment.as_str()) {
                Ok(parsed) => record.merge(parsed),
                Err(e) => warn!(
                    regular = %self.regular,
                    fragment = fragment.as_str(),
                    error = %e,
                    "skipping malformed fragment"
                ),
            }
        }

        (!record.is_empty()).then_some(record)
    }

    /// Overwrites tag values for keys present in `record`; others are kept.
    pub fn refresh_tags(&mut self, record: &ExtractedRecord) {
        for (key, value) in self.tag_keys.iter().zip(self.tag_values.iter_mut()) {
            if let Some(observed) = record.get(key) {
                *value = observed.to_string();
            }
        }
    }

    /// Renders `key=value` pairs in tag key order, comma-separated.
    #[must_use]
    pub fn tag_string(&self) -> String {
        self.tag_keys
            .iter()
            .zip(&self.tag_values)
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Resolves a field value to a number, falling back to the string map.
    ///
    /// Values that are neither numeric nor mapped resolve to zero.
    #[must_use]
    pub fn resolve(&self, key: &str, value: &FieldValue) -> f64 {
        value
            .as_number()
            .or_else(|| match value {
                FieldValue::Text(text) => self
                    .string_map
                    .iter()
                    .find(|m| m.key == key && m.string_value == *text)
                    .map(|m| m.int_value),
                FieldValue::Number(_) => None,
            })
            .unwrap_or(0.0)
    }

    /// Last observed value of a tag key.
    #[must_use]
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tag_keys
            .iter()
            .zip(&self.tag_values)
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The rule template; identity for reconciliation.
    #[must_use]
    pub fn regular(&self) -> &str {
        &self.regular
    }

    /// Tag keys in order.
    #[must_use]
    pub fn tag_keys(&self) -> &[String] {
        &self.tag_keys
    }

    /// Tag values, parallel to [`Self::tag_keys`].
    #[must_use]
    pub fn tag_values(&self) -> &[String] {
        &self.tag_values
    }

    /// Metric definitions.
    #[must_use]
    pub fn metric_configs(&self) -> &[MetricConfig] {
        &self.metric_configs
    }

    /// String fallback table.
    #[must_use]
    pub fn string_map(&self) -> &[StringMapping] {
        &self.string_map
    }

    /// The record queue.
    #[must_use]
    pub fn queue(&self) -> &RecordQueue {
        &self.queue
    }

    /// The record queue, mutably.
    pub fn queue_mut(&mut self) -> &mut RecordQueue {
        &mut self.queue
    }
}

/// Brings a job's rules in line with its pushed rule configs.
///
/// Rules are matched by template. Matched rules are reconfigured in place and
/// keep their queue; unmatched old rules are dropped; unmatched configs become
/// new rules appended in push order. `patterns` must hold a compiled pattern
/// for every template in `configs`.
pub fn update_rules(
    rules: &mut Vec<Rule>,
    configs: &[RuleConfig],
    patterns: &PatternCache,
    queue_capacity: usize,
) {
    let mut kept: Vec<Rule> = Vec::with_capacity(configs.len());

    for mut rule in rules.drain(..) {
        if let Some(config) = configs.iter().find(|c| c.regular == rule.regular) {
            rule.reconfigure(config);
            kept.push(rule);
        } else {
            debug!(regular = %rule.regular, "discarding rule");
        }
    }

    for config in configs {
        if kept.iter().any(|r| r.regular == config.regular) {
            continue;
        }
        match patterns.get(&config.regular) {
            Some(pattern) => {
                kept.push(Rule::with_pattern(config, pattern.clone(), queue_capacity));
            }
            None => warn!(regular = %config.regular, "no compiled pattern for rule, skipping"),
        }
    }

    *rules = kept;
}

/// Compiles every template referenced by `configs`.
///
/// # Errors
///
/// Returns the first [`LogMonError::PatternCompile`](crate::LogMonError::PatternCompile).
pub fn compile_patterns<'a>(
    configs: impl IntoIterator<Item = &'a RuleConfig>,
) -> Result<PatternCache> {
    let mut cache = PatternCache::new();
    for config in configs {
        if !cache.contains_key(&config.regular) {
            cache.insert(config.regular.clone(), pattern::compile(&config.regular)?);
        }
    }
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AggregationType;
    use proptest::prelude::*;

    fn req_rule(tags: &str) -> RuleConfig {
        RuleConfig::new("REQ ${json_content}")
            .with_tags(tags)
            .with_metric(MetricConfig::new("latency", "app_latency", AggregationType::Avg))
    }

    fn record(json: &str) -> ExtractedRecord {
        ExtractedRecord::parse_fragment(json).unwrap()
    }

    mod queue_tests {
        use super::*;

        #[test]
        fn drain_is_bounded() {
            let mut queue = RecordQueue::new(8);
            let tx = queue.sender();
            for i in 0..5 {
                tx.try_send(record(&format!(r#"{{"i":{i}}}"#))).unwrap();
            }

            let drained = queue.drain(3);
            assert_eq!(drained.len(), 3);
            assert_eq!(queue.len(), 2);
            assert_eq!(drained[0].get("i"), Some(&FieldValue::Number(0.0)));
        }

        #[test]
        fn drain_more_than_available() {
            let mut queue = RecordQueue::new(4);
            queue.sender().try_send(record(r#"{"a":1}"#)).unwrap();
            assert_eq!(queue.drain(10).len(), 1);
            assert!(queue.is_empty());
        }

        #[test]
        fn full_queue_rejects_try_send() {
            let queue = RecordQueue::new(1);
            let tx = queue.sender();
            tx.try_send(record(r#"{"a":1}"#)).unwrap();
            assert!(tx.try_send(record(r#"{"a":2}"#)).is_err());
            assert_eq!(queue.capacity(), 1);
        }

        #[tokio::test]
        async fn blocked_push_resumes_after_drain() {
            let mut queue = RecordQueue::new(1);
            let tx = queue.sender();
            tx.send(record(r#"{"a":1}"#)).await.unwrap();

            let pending = tokio::spawn(async move { tx.send(record(r#"{"a":2}"#)).await });
            tokio::task::yield_now().await;
            assert!(!pending.is_finished());

            assert_eq!(queue.drain(1).len(), 1);
            pending.await.unwrap().unwrap();
            assert_eq!(queue.len(), 1);
        }

        #[tokio::test]
        async fn push_fails_after_queue_dropped() {
            let queue = RecordQueue::new(1);
            let tx = queue.sender();
            drop(queue);
            assert!(tx.send(record(r#"{"a":1}"#)).await.is_err());
        }
    }

    mod extract_tests {
        use super::*;

        #[test]
        fn extracts_json_fragment() {
            let rule = Rule::new(&req_rule("host"), 16).unwrap();
            let rec = rule.extract(r#"REQ {"host":"a","latency":10}"#).unwrap();
            assert_eq!(rec.get("latency"), Some(&FieldValue::Number(10.0)));
        }

        #[test]
        fn non_matching_line_yields_nothing() {
            let rule = Rule::new(&req_rule("host"), 16).unwrap();
            assert!(rule.extract("RESP {}").is_none());
        }

        #[test]
        fn pattern_without_groups_yields_nothing() {
            let rule = Rule::new(&RuleConfig::new("REQ"), 16).unwrap();
            assert!(rule.extract(r#"REQ {"a":1}"#).is_none());
        }

        #[test]
        fn malformed_fragment_is_skipped_not_fatal() {
            let config = RuleConfig::new("a=${json_content} b=${json_content}");
            let rule = Rule::new(&config, 16).unwrap();

            let rec = rule.extract(r#"a=oops b={"x":1}"#).unwrap();
            assert_eq!(rec.len(), 1);
            assert_eq!(rec.get("x"), Some(&FieldValue::Number(1.0)));
        }

        #[test]
        fn all_fragments_malformed_yields_nothing() {
            let rule = Rule::new(&req_rule(""), 16).unwrap();
            assert!(rule.extract("REQ not-json").is_none());
        }

        #[test]
        fn invalid_template_is_an_error() {
            assert!(Rule::new(&RuleConfig::new("REQ ("), 16).is_err());
        }
    }

    mod tag_tests {
        use super::*;

        #[test]
        fn tags_start_empty() {
            let rule = Rule::new(&req_rule("host,status"), 16).unwrap();
            assert_eq!(rule.tag_values(), &["", ""]);
            assert_eq!(rule.tag_string(), "host=,status=");
        }

        #[test]
        fn refresh_is_sticky() {
            let mut rule = Rule::new(&req_rule("host,status"), 16).unwrap();
            rule.refresh_tags(&record(r#"{"host":"a","status":200}"#));
            assert_eq!(rule.tag_string(), "host=a,status=200");

            rule.refresh_tags(&record(r#"{"status":"500"}"#));
            assert_eq!(rule.tag_string(), "host=a,status=500");
        }

        #[test]
        fn no_tags_renders_empty() {
            let rule = Rule::new(&req_rule(""), 16).unwrap();
            assert_eq!(rule.tag_string(), "");
        }

        #[test]
        fn reconfigure_carries_tags_by_key() {
            let mut rule = Rule::new(&req_rule("host,status"), 16).unwrap();
            rule.refresh_tags(&record(r#"{"host":"a","status":"200"}"#));

            rule.reconfigure(&req_rule("region,status,host"));

            assert_eq!(rule.tag_keys(), &["region", "status", "host"]);
            assert_eq!(rule.tag_values(), &["", "200", "a"]);
        }

        #[test]
        fn reconfigure_replaces_metrics_and_keeps_queue() {
            let mut rule = Rule::new(&req_rule("host"), 16).unwrap();
            rule.queue().sender().try_send(record(r#"{"latency":1}"#)).unwrap();

            let updated = RuleConfig::new("REQ ${json_content}")
                .with_tags("host")
                .with_metric(MetricConfig::new("size", "app_size", AggregationType::Sum))
                .with_mapping(StringMapping::new("size", "big", 100.0));
            rule.reconfigure(&updated);

            assert_eq!(rule.metric_configs().len(), 1);
            assert_eq!(rule.metric_configs()[0].metric, "app_size");
            assert_eq!(rule.string_map().len(), 1);
            assert_eq!(rule.queue().len(), 1);
        }

        proptest! {
            #[test]
            fn reconfigure_preserves_common_keys(
                old in prop::collection::btree_set("[a-e]", 0..4),
                new in prop::collection::btree_set("[a-e]", 0..4),
            ) {
                let old_tags = old.iter().cloned().collect::<Vec<_>>().join(",");
                let new_tags = new.iter().cloned().collect::<Vec<_>>().join(",");

                let mut rule = Rule::new(&req_rule(&old_tags), 4).unwrap();
                let mut observed = ExtractedRecord::new();
                for key in &old {
                    observed.insert(key.clone(), format!("v-{key}").as_str());
                }
                rule.refresh_tags(&observed);

                rule.reconfigure(&req_rule(&new_tags));

                prop_assert_eq!(rule.tag_keys().len(), rule.tag_values().len());
                for key in &new {
                    let expected = if old.contains(key) {
                        format!("v-{key}")
                    } else {
                        String::new()
                    };
                    prop_assert_eq!(rule.tag_value(key), Some(expected.as_str()));
                }
            }
        }
    }

    mod resolve_tests {
        use super::*;

        #[test]
        fn numbers_and_numeric_text() {
            let rule = Rule::new(&req_rule(""), 4).unwrap();
            let resolved = rule.resolve("latency", &FieldValue::Number(10.0));
            assert!((resolved - 10.0).abs() < f64::EPSILON);
            assert!((rule.resolve("latency", &FieldValue::from("2.5")) - 2.5).abs() < f64::EPSILON);
        }

        #[test]
        fn string_map_fallback() {
            let config = req_rule("").with_mapping(StringMapping::new("status_text", "ok", 1.0));
            let rule = Rule::new(&config, 4).unwrap();

            let resolved = rule.resolve("status_text", &FieldValue::from("ok"));
            assert!((resolved - 1.0).abs() < f64::EPSILON);
            // Mapping is scoped to its key.
            assert!(rule.resolve("other", &FieldValue::from("ok")).abs() < f64::EPSILON);
            assert!(rule.resolve("status_text", &FieldValue::from("bad")).abs() < f64::EPSILON);
        }
    }

    mod update_tests {
        use super::*;

        fn rules_for(configs: &[RuleConfig]) -> Vec<Rule> {
            configs.iter().map(|c| Rule::new(c, 8).unwrap()).collect()
        }

        #[test]
        fn matched_kept_unmatched_dropped_new_appended() {
            let mut rules = rules_for(&[
                RuleConfig::new("A ${json_content}"),
                RuleConfig::new("B ${json_content}"),
            ]);
            rules[0].queue().sender().try_send(record(r#"{"x":1}"#)).unwrap();

            let incoming = vec![
                RuleConfig::new("C ${json_content}"),
                RuleConfig::new("A ${json_content}").with_tags("x"),
            ];
            let patterns = compile_patterns(&incoming).unwrap();
            update_rules(&mut rules, &incoming, &patterns, 8);

            let regulars: Vec<_> = rules.iter().map(Rule::regular).collect();
            assert_eq!(regulars, vec!["A ${json_content}", "C ${json_content}"]);
            assert_eq!(rules[0].queue().len(), 1);
            assert_eq!(rules[0].tag_keys(), &["x"]);
            assert!(rules[1].queue().is_empty());
        }

        #[test]
        fn duplicate_templates_create_one_rule() {
            let mut rules = Vec::new();
            let incoming = vec![
                RuleConfig::new("A").with_tags("first"),
                RuleConfig::new("A").with_tags("second"),
            ];
            let patterns = compile_patterns(&incoming).unwrap();
            update_rules(&mut rules, &incoming, &patterns, 8);

            assert_eq!(rules.len(), 1);
            assert_eq!(rules[0].tag_keys(), &["first"]);
        }

        #[test]
        fn empty_configs_clear_rules() {
            let mut rules = rules_for(&[RuleConfig::new("A")]);
            update_rules(&mut rules, &[], &PatternCache::new(), 8);
            assert!(rules.is_empty());
        }

        #[test]
        fn compile_patterns_reports_first_failure() {
            let incoming = vec![RuleConfig::new("ok"), RuleConfig::new("bad (")];
            assert!(compile_patterns(&incoming).is_err());
        }
    }
}
