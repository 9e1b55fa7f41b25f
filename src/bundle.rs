//! Bundle documents and raw-layer records.
//!
//! Source objects are JSON files produced upstream, one FHIR bundle per
//! file. The loader treats bodies as opaque documents: they must parse as
//! JSON and the top-level value must be an object, nothing more. Entry
//! counting is informational only.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::prelude::*;

use crate::error::{BundleError, JsonSnafu, ShapeSnafu};
use crate::metrics::events::FailureStage;

/// One warehouse row per successfully loaded object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Source object key; the natural unique identifier for the row.
    pub key: String,
    /// The document exactly as parsed from the object body.
    pub body: Value,
    /// Last-modified time the store reported for the source object.
    pub source_modified_at: DateTime<Utc>,
    /// When the loader staged this record.
    pub loaded_at: DateTime<Utc>,
    /// Number of bundle entries, when the body carries an `entry` array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<usize>,
}

impl RawRecord {
    /// Stage a record from a parsed bundle, stamped now.
    pub fn new(key: impl Into<String>, bundle: ParsedBundle, source_modified_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            body: bundle.body,
            source_modified_at,
            loaded_at: Utc::now(),
            record_count: bundle.record_count,
        }
    }
}

/// A successfully parsed object body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBundle {
    pub body: Value,
    pub record_count: Option<usize>,
}

/// Parse an object body into a bundle document.
///
/// The body must be valid JSON with an object at the top level; anything
/// else is a per-object failure the caller records and skips. A document
/// with an `entry` array (the bundle shape) also yields its entry count.
pub fn parse_bundle(key: &str, body: &Bytes) -> Result<ParsedBundle, BundleError> {
    let value: Value = serde_json::from_slice(body).context(JsonSnafu { key })?;

    match &value {
        Value::Object(fields) => {
            let record_count = fields.get("entry").and_then(Value::as_array).map(Vec::len);
            Ok(ParsedBundle {
                body: value,
                record_count,
            })
        }
        other => ShapeSnafu {
            key,
            found: json_kind(other),
        }
        .fail(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl BundleError {
    /// The stage label recorded for this failure in metrics and the DLQ.
    pub fn stage(&self) -> FailureStage {
        match self {
            BundleError::Json { .. } => FailureStage::Parse,
            BundleError::Shape { .. } => FailureStage::Shape,
        }
    }

    /// The object key the failure refers to.
    pub fn key(&self) -> &str {
        match self {
            BundleError::Json { key, .. } | BundleError::Shape { key, .. } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(text: &str) -> Bytes {
        Bytes::from(text.to_string())
    }

    #[test]
    fn test_parse_bundle_with_entries() {
        let parsed = parse_bundle(
            "p1.json",
            &body(r#"{"resourceType": "Bundle", "entry": [{"a": 1}, {"b": 2}]}"#),
        )
        .unwrap();
        assert_eq!(parsed.record_count, Some(2));
        assert_eq!(parsed.body["resourceType"], "Bundle");
    }

    #[test]
    fn test_parse_object_without_entries() {
        let parsed = parse_bundle("p1.json", &body(r#"{"resourceType": "Patient"}"#)).unwrap();
        assert_eq!(parsed.record_count, None);
    }

    #[test]
    fn test_parse_entry_not_an_array() {
        // "entry" holding a non-array is unusual but not malformed
        let parsed = parse_bundle("p1.json", &body(r#"{"entry": 3}"#)).unwrap();
        assert_eq!(parsed.record_count, None);
    }

    #[test]
    fn test_invalid_json_is_parse_failure() {
        let err = parse_bundle("bad.json", &body("{not json")).unwrap_err();
        assert!(matches!(err, BundleError::Json { .. }));
        assert_eq!(err.stage(), FailureStage::Parse);
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_non_object_document_is_shape_failure() {
        let err = parse_bundle("list.json", &body("[1, 2, 3]")).unwrap_err();
        assert!(matches!(err, BundleError::Shape { found: "array", .. }));
        assert_eq!(err.stage(), FailureStage::Shape);
    }

    #[test]
    fn test_raw_record_from_parsed_bundle() {
        let bundle = parse_bundle("p1.json", &body(r#"{"entry": []}"#)).unwrap();
        let modified_at = Utc::now();
        let record = RawRecord::new("raw/patients/p1.json", bundle, modified_at);
        assert_eq!(record.key, "raw/patients/p1.json");
        assert_eq!(record.source_modified_at, modified_at);
        assert_eq!(record.record_count, Some(0));
    }
}
