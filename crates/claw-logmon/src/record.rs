//! Records extracted from matched log lines.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::{LogMonError, Result};

/// A single extracted field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A numeric JSON value.
    Number(f64),
    /// Any other value, as text.
    Text(String),
}

impl FieldValue {
    /// Resolves this value as a number, if it is one or parses as one.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
        }
    }

    fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s)),
            Value::Bool(b) => Some(Self::Text(b.to_string())),
            nested @ (Value::Array(_) | Value::Object(_)) => Some(Self::Text(nested.to_string())),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Flat key/value record built from one matched line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl ExtractedRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one captured fragment as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`LogMonError::FragmentParse`] if the text is not a JSON object.
    pub fn parse_fragment(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| LogMonError::FragmentParse(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(LogMonError::FragmentParse(
                "fragment is not a JSON object".to_string(),
            ));
        };

        let fields = map
            .into_iter()
            .filter_map(|(key, value)| FieldValue::from_json(value).map(|v| (key, v)))
            .collect();
        Ok(Self { fields })
    }

    /// Merges another fragment into this record; keys in `other` win.
    pub fn merge(&mut self, other: Self) {
        self.fields.extend(other.fields);
    }

    /// Sets a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Looks up a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn parses_strings_and_numbers() {
        let record =
            ExtractedRecord::parse_fragment(r#"{"host":"a","status":"200","latency":10}"#).unwrap();

        assert_eq!(record.len(), 3);
        assert_eq!(record.get("host"), Some(&FieldValue::Text("a".to_string())));
        assert_eq!(record.get("latency"), Some(&FieldValue::Number(10.0)));
    }

    #[test]
    fn null_fields_are_omitted() {
        let record = ExtractedRecord::parse_fragment(r#"{"a":null,"b":true}"#).unwrap();
        assert!(record.get("a").is_none());
        assert_eq!(record.get("b"), Some(&FieldValue::Text("true".to_string())));
    }

    #[test]
    fn nested_values_keep_json_text() {
        let record = ExtractedRecord::parse_fragment(r#"{"tags":[1,2]}"#).unwrap();
        assert_eq!(record.get("tags"), Some(&FieldValue::Text("[1,2]".to_string())));
    }

    #[test_case("not json" ; "garbage")]
    #[test_case("[1,2,3]" ; "array")]
    #[test_case("42" ; "scalar")]
    #[test_case("" ; "empty")]
    fn rejects_non_objects(text: &str) {
        let err = ExtractedRecord::parse_fragment(text).unwrap_err();
        assert!(matches!(err, LogMonError::FragmentParse(_)));
    }

    #[test]
    fn merge_last_writer_wins() {
        let mut record = ExtractedRecord::parse_fragment(r#"{"a":1,"b":"x"}"#).unwrap();
        record.merge(ExtractedRecord::parse_fragment(r#"{"b":"y","c":3}"#).unwrap());

        assert_eq!(record.len(), 3);
        assert_eq!(record.get("b"), Some(&FieldValue::Text("y".to_string())));
    }

    #[test_case(FieldValue::Number(200.0), "200" ; "integral number")]
    #[test_case(FieldValue::Number(1.5), "1.5" ; "fractional number")]
    #[test_case(FieldValue::Text("ok".to_string()), "ok" ; "text")]
    fn display_renders_tag_form(value: FieldValue, expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[test]
    fn numeric_text_resolves_as_number() {
        assert_eq!(FieldValue::from("12.5").as_number(), Some(12.5));
        assert_eq!(FieldValue::from("ok").as_number(), None);
        assert_eq!(FieldValue::from(3.0).as_number(), Some(3.0));
    }
}
