//! Document and value model.
//!
//! A document is an ordered mapping from field name to a comparable value.
//! Field order is significant: the on-disk doc-map preserves the order in
//! which fields were supplied.
//!
//! Field name sigils:
//!
//! - `__` (double underscore) marks engine-managed fields (`__docid`,
//!   `__score`). They are never indexed.
//! - `_` (single underscore) marks a field whose value is indexed as a
//!   single token (e.g. `_id`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ArborError, Result};

/// Engine-managed field holding the internal document id.
pub const FIELD_DOC_ID: &str = "__docid";

/// Engine-managed field holding the search score.
pub const FIELD_SCORE: &str = "__score";

/// Single-token field preserving an upstream `__docid`.
pub const FIELD_ORIGINAL: &str = "_original";

/// Single-token field stamped with the ingest timestamp.
pub const FIELD_CREATED: &str = "_created";

/// A comparable primitive value.
///
/// This is the only value shape the engine stores: integers, floats,
/// strings and timestamps, each with a deterministic binary encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Int64(i64),
    Float64(f64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl DataValue {
    /// Returns the string value if this is a String variant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value if this is an Int64 variant.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            DataValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float value if this is a Float64 variant.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DataValue::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the datetime value if this is a DateTime variant.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            DataValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// The text rendering used by the analyzer when indexing this value.
    pub fn render(&self) -> String {
        match self {
            DataValue::Int64(i) => i.to_string(),
            DataValue::Float64(f) => f.to_string(),
            DataValue::String(s) => s.clone(),
            DataValue::DateTime(dt) => dt.to_rfc3339(),
        }
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        DataValue::Int64(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        DataValue::Int64(v as i64)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        DataValue::Float64(v)
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        DataValue::String(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for DataValue {
    fn from(v: DateTime<Utc>) -> Self {
        DataValue::DateTime(v)
    }
}

/// A record with ordered user fields.
///
/// The internal `__docid` is assigned by the engine at ingest; documents
/// supplied by callers usually carry user fields only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Field data in input order.
    pub fields: Vec<(String, DataValue)>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Add a field, replacing any existing field with the same name.
    pub fn add_field(mut self, name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.set(name.into(), value.into());
        self
    }

    /// Add a text field.
    pub fn add_text(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.add_field(name, DataValue::String(text.into()))
    }

    /// Add an integer field.
    pub fn add_integer(self, name: impl Into<String>, value: i64) -> Self {
        self.add_field(name, DataValue::Int64(value))
    }

    /// Add a float field.
    pub fn add_float(self, name: impl Into<String>, value: f64) -> Self {
        self.add_field(name, DataValue::Float64(value))
    }

    /// Add a datetime field.
    pub fn add_datetime(self, name: impl Into<String>, value: DateTime<Utc>) -> Self {
        self.add_field(name, DataValue::DateTime(value))
    }

    /// Set a field in place, preserving its position when it already exists.
    pub fn set(&mut self, name: String, value: DataValue) {
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    /// Get a reference to a field's value.
    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<DataValue> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    /// Check if the document has a field.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a document from a JSON object.
    ///
    /// This is the seam the JSON payload decoder uses: numbers map to
    /// `Int64`/`Float64`, strings parseable as RFC 3339 map to `DateTime`,
    /// everything else string-like stays `String`. Nested objects and
    /// arrays are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| ArborError::invalid_argument("document payload must be a JSON object"))?;

        let mut doc = Document::new();
        for (name, v) in obj {
            let value = match v {
                serde_json::Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        DataValue::Int64(i)
                    } else {
                        DataValue::Float64(n.as_f64().unwrap_or(0.0))
                    }
                }
                serde_json::Value::String(s) => match DateTime::parse_from_rfc3339(s) {
                    Ok(dt) => DataValue::DateTime(dt.with_timezone(&Utc)),
                    Err(_) => DataValue::String(s.clone()),
                },
                serde_json::Value::Bool(b) => DataValue::Int64(*b as i64),
                other => {
                    return Err(ArborError::invalid_argument(format!(
                        "field '{name}' has unsupported JSON shape: {other}"
                    )));
                }
            };
            doc.set(name.clone(), value);
        }
        Ok(doc)
    }
}

/// Whether a field is engine-managed (`__` prefix) and must never be indexed.
pub fn is_engine_field(name: &str) -> bool {
    name.starts_with("__")
}

/// Whether a field's value is indexed as a single token (`_` prefix, not `__`).
pub fn is_single_token_field(name: &str) -> bool {
    name.starts_with('_') && !name.starts_with("__")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_order_preserved() {
        let doc = Document::new()
            .add_text("title", "rambo")
            .add_integer("year", 1982)
            .add_text("genre", "action");

        let names: Vec<&str> = doc.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["title", "year", "genre"]);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut doc = Document::new().add_text("a", "1").add_text("b", "2");
        doc.set("a".to_string(), DataValue::String("3".to_string()));
        assert_eq!(doc.get("a").and_then(|v| v.as_str()), Some("3"));
        assert_eq!(doc.fields[0].0, "a");
    }

    #[test]
    fn test_sigils() {
        assert!(is_engine_field("__docid"));
        assert!(is_engine_field("__score"));
        assert!(!is_engine_field("_id"));
        assert!(is_single_token_field("_id"));
        assert!(is_single_token_field("_created"));
        assert!(!is_single_token_field("__docid"));
        assert!(!is_single_token_field("title"));
    }

    #[test]
    fn test_from_json() {
        let payload = serde_json::json!({
            "title": "rambo",
            "year": 1982,
            "rating": 4.5,
        });
        let doc = Document::from_json(&payload).unwrap();
        assert_eq!(doc.get("title").and_then(|v| v.as_str()), Some("rambo"));
        assert_eq!(doc.get("year").and_then(|v| v.as_integer()), Some(1982));
        assert_eq!(doc.get("rating").and_then(|v| v.as_float()), Some(4.5));
    }

    #[test]
    fn test_from_json_rejects_nested() {
        let payload = serde_json::json!({ "nested": { "a": 1 } });
        assert!(Document::from_json(&payload).is_err());
    }
}
