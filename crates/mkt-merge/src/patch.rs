//! Partial updates with explicit per-field intent
//!
//! Provides [`Patch`]. A loosely-typed partial cannot tell "leave alone"
//! from "clear", so each field carries a [`FieldPatch`] tag instead.

use indexmap::IndexMap;
use mkt_document::is_clear_sentinel;
use serde_json::{Map, Value};

/// Intent for one field of a partial update
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPatch {
    /// Leave the existing value untouched
    Keep,

    /// Replace the value (keyed arrays merge element-wise instead)
    Set(Value),

    /// Remove the field
    Clear,

    /// Merge into the existing object field by field
    Merge(Patch),
}

impl FieldPatch {
    /// Convert a JSON value following the legacy partial-update rules
    ///
    /// - `null` → [`Keep`](Self::Keep)
    /// - `{"$clear": true}` → [`Clear`](Self::Clear)
    /// - object → [`Merge`](Self::Merge)
    /// - anything else → [`Set`](Self::Set)
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Keep,
            v if is_clear_sentinel(&v) => Self::Clear,
            Value::Object(map) => Self::Merge(Patch::from_map(map)),
            other => Self::Set(other),
        }
    }

    /// Whether applying this field changes nothing
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        match self {
            Self::Keep => true,
            Self::Merge(patch) => patch.is_empty(),
            Self::Set(_) | Self::Clear => false,
        }
    }
}

/// Partial update of a document
///
/// Field order is preserved so that newly added keys land deterministically.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Patch {
    fields: IndexMap<String, FieldPatch>,
}

impl Patch {
    /// Empty patch (merging it is the identity)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON partial
    ///
    /// # Errors
    /// Returns [`PatchError::NotAnObject`] if the partial is not an object
    pub fn from_json(value: Value) -> Result<Self, PatchError> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(PatchError::NotAnObject(other.to_string())),
        }
    }

    /// Build from a JSON object
    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        let fields = map
            .into_iter()
            .map(|(key, value)| (key, FieldPatch::from_json(value)))
            .collect();
        Self { fields }
    }

    /// Replace a field
    #[inline]
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), FieldPatch::Set(value));
        self
    }

    /// Remove a field
    #[inline]
    #[must_use]
    pub fn clear(mut self, key: impl Into<String>) -> Self {
        self.fields.insert(key.into(), FieldPatch::Clear);
        self
    }

    /// Merge a nested patch into an object field
    #[inline]
    #[must_use]
    pub fn merge(mut self, key: impl Into<String>, patch: Patch) -> Self {
        self.fields.insert(key.into(), FieldPatch::Merge(patch));
        self
    }

    /// Insert an arbitrary field intent
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, field: FieldPatch) {
        self.fields.insert(key.into(), field);
    }

    /// Remove a field intent, returning it
    #[inline]
    pub fn take(&mut self, key: &str) -> Option<FieldPatch> {
        self.fields.shift_remove(key)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldPatch> {
        self.fields.get(key)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Iterate fields in insertion order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldPatch)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the patch carries no effective change
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(FieldPatch::is_noop)
    }

    /// Concrete object this patch would produce on an empty base
    ///
    /// `Keep` and `Clear` fields are dropped; nested merges materialize
    /// recursively.
    #[must_use]
    pub fn materialize(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, field) in &self.fields {
            match field {
                FieldPatch::Keep | FieldPatch::Clear => {}
                FieldPatch::Set(value) => {
                    out.insert(key.clone(), value.clone());
                }
                FieldPatch::Merge(nested) => {
                    out.insert(key.clone(), Value::Object(nested.materialize()));
                }
            }
        }
        out
    }
}

/// Errors building patches
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Top-level partial was not a JSON object
    #[error("partial update must be a JSON object, got {0}")]
    NotAnObject(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_maps_legacy_intents() {
        let patch = Patch::from_json(json!({
            "name": "Summer",
            "budget": null,
            "endDate": {"$clear": true},
            "guidelines": {"tone": "warm"}
        }))
        .unwrap();

        assert_eq!(patch.get("name"), Some(&FieldPatch::Set(json!("Summer"))));
        assert_eq!(patch.get("budget"), Some(&FieldPatch::Keep));
        assert_eq!(patch.get("endDate"), Some(&FieldPatch::Clear));
        assert!(matches!(patch.get("guidelines"), Some(FieldPatch::Merge(_))));
    }

    #[test]
    fn from_json_rejects_non_objects() {
        assert!(matches!(
            Patch::from_json(json!("oops")),
            Err(PatchError::NotAnObject(_))
        ));
    }

    #[test]
    fn keep_only_patch_is_empty() {
        let patch = Patch::from_json(json!({"a": null, "b": {"c": null}})).unwrap();
        assert!(patch.is_empty());
        assert_eq!(patch.len(), 2);
    }

    #[test]
    fn materialize_drops_keep_and_clear() {
        let patch = Patch::new()
            .set("a", json!(1))
            .clear("b")
            .merge("c", Patch::new().set("d", json!(true)));
        assert_eq!(
            Value::Object(patch.materialize()),
            json!({"a": 1, "c": {"d": true}})
        );
    }

    #[test]
    fn take_removes_field() {
        let mut patch = Patch::new().set("state", json!("ready"));
        assert_eq!(patch.take("state"), Some(FieldPatch::Set(json!("ready"))));
        assert!(!patch.contains("state"));
    }
}
