//! Stored documents and their identifiers
//!
//! A [`Document`] is the JSON object exactly as the store holds it. Typed
//! entity models are layered on top by validation; the engine itself reads
//! and writes documents.

use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};
use ulid::Ulid;

/// Persisted field names shared by every entity kind
pub mod fields {
    pub const ID: &str = "id";
    pub const KIND: &str = "kind";
    pub const PARENT_ID: &str = "parentId";
    pub const STATE: &str = "state";
    pub const STATE_METADATA: &str = "stateMetadata";
    pub const VERSION: &str = "version";
    pub const IS_ACTIVE: &str = "isActive";
    pub const ROOT_ID: &str = "rootId";
    pub const PREVIOUS_VERSION_ID: &str = "previousVersionId";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
}

/// Store key of a document
///
/// Assigned once on creation and never changed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wrap an existing identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, sortable identifier
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Errors converting raw values into documents
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Top-level value was not a JSON object
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// JSON object as stored
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Empty document
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap an object map
    #[inline]
    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Convert a JSON value, rejecting anything but objects
    ///
    /// # Errors
    /// Returns [`DocumentError::NotAnObject`] for arrays, scalars and null
    pub fn try_from_value(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(DocumentError::NotAnObject(json_type_name(&other))),
        }
    }

    #[inline]
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[inline]
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    #[inline]
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Builder-style insert
    #[inline]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Document id, if the `id` field holds a string
    #[must_use]
    pub fn id(&self) -> Option<DocumentId> {
        self.str_field(fields::ID).map(DocumentId::from)
    }

    /// String field, ignoring values of other types
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Id-valued field such as `parentId` or `rootId`
    #[must_use]
    pub fn id_field(&self, key: &str) -> Option<DocumentId> {
        self.str_field(key).map(DocumentId::from)
    }

    /// Timestamp-valued field, parsed with the same rules as normalization
    #[must_use]
    pub fn timestamp_field(&self, key: &str) -> Option<DateTime<Utc>> {
        self.0.get(key).and_then(timestamp::parse_timestamp)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Document> for Value {
    fn from(document: Document) -> Self {
        document.into_value()
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_rejects_non_objects() {
        let err = Document::try_from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, DocumentError::NotAnObject("array")));
    }

    #[test]
    fn document_typed_accessors() {
        let doc = Document::try_from_value(json!({
            "id": "c-1",
            "isActive": true,
            "version": 3,
            "rootId": "c-0",
            "startDate": "2024-06-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(doc.id(), Some(DocumentId::new("c-1")));
        assert_eq!(doc.bool_field(fields::IS_ACTIVE), Some(true));
        assert_eq!(doc.u64_field(fields::VERSION), Some(3));
        assert_eq!(doc.id_field(fields::ROOT_ID), Some(DocumentId::new("c-0")));
        assert!(doc.timestamp_field("startDate").is_some());
        assert_eq!(doc.str_field(fields::VERSION), None);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = DocumentId::generate();
        let b = DocumentId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 26);
    }

    #[test]
    fn document_serializes_transparently() {
        let doc = Document::new().with("name", json!("Spring"));
        assert_eq!(serde_json::to_value(&doc).unwrap(), json!({"name": "Spring"}));
    }
}
