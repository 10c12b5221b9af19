//! Media-type registry.
//!
//! The HTTP front end selects a payload codec by content type. The
//! registry is that seam: a map from media-type string to a codec trait
//! object. Unknown media types surface `NotSupported`, which the front
//! end maps to a 415.

use std::fmt::Debug;
use std::sync::Arc;

use ahash::AHashMap;

use crate::data::Document;
use crate::error::{ArborError, Result};

/// Decodes and encodes document payloads of one media type.
pub trait DocumentCodec: Debug + Send + Sync {
    fn media_type(&self) -> &str;

    /// Decode a payload into documents; a JSON array of objects, for the
    /// JSON codec.
    fn decode(&self, payload: &[u8]) -> Result<Vec<Document>>;

    /// Encode documents back into a payload.
    fn encode(&self, documents: &[Document]) -> Result<Vec<u8>>;
}

/// JSON payload codec: an array of flat objects.
#[derive(Debug, Default)]
pub struct JsonCodec;

impl DocumentCodec for JsonCodec {
    fn media_type(&self) -> &str {
        "application/json"
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<Document>> {
        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|err| ArborError::parse(format!("invalid json payload: {err}")))?;
        let items = value
            .as_array()
            .ok_or_else(|| ArborError::parse("json payload must be an array of objects"))?;
        items.iter().map(Document::from_json).collect()
    }

    fn encode(&self, documents: &[Document]) -> Result<Vec<u8>> {
        let items: Vec<serde_json::Value> = documents
            .iter()
            .map(|doc| {
                let mut obj = serde_json::Map::new();
                for (name, value) in &doc.fields {
                    let rendered = match value {
                        crate::data::DataValue::Int64(i) => serde_json::json!(i),
                        crate::data::DataValue::Float64(f) => serde_json::json!(f),
                        crate::data::DataValue::String(s) => serde_json::json!(s),
                        crate::data::DataValue::DateTime(dt) => {
                            serde_json::json!(dt.to_rfc3339())
                        }
                    };
                    obj.insert(name.clone(), rendered);
                }
                serde_json::Value::Object(obj)
            })
            .collect();
        Ok(serde_json::to_vec(&items)?)
    }
}

/// Registry of payload codecs keyed by media type.
#[derive(Debug)]
pub struct MediaRegistry {
    codecs: AHashMap<String, Arc<dyn DocumentCodec>>,
}

impl MediaRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            codecs: AHashMap::new(),
        }
    }

    /// The default registry: JSON only.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonCodec));
        registry
    }

    pub fn register(&mut self, codec: Arc<dyn DocumentCodec>) {
        self.codecs.insert(codec.media_type().to_string(), codec);
    }

    /// Resolve a codec or fail with `NotSupported`.
    pub fn resolve(&self, media_type: &str) -> Result<Arc<dyn DocumentCodec>> {
        self.codecs.get(media_type).cloned().ok_or_else(|| {
            ArborError::not_supported(format!("no codec for media type '{media_type}'"))
        })
    }
}

impl Default for MediaRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let codec = JsonCodec;
        let payload = br#"[{"_id": "1", "title": "rambo"}, {"_id": "2", "title": "rocky"}]"#;
        let docs = codec.decode(payload).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].get("title").and_then(|v| v.as_str()), Some("rambo"));

        let encoded = codec.encode(&docs).unwrap();
        let again = codec.decode(&encoded).unwrap();
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn test_non_array_rejected() {
        assert!(matches!(
            JsonCodec.decode(br#"{"title": "rambo"}"#),
            Err(ArborError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_media_type() {
        let registry = MediaRegistry::with_defaults();
        assert!(registry.resolve("application/json").is_ok());
        assert!(matches!(
            registry.resolve("text/csv"),
            Err(ArborError::NotSupported(_))
        ));
    }
}
