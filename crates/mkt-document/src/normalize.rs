//! Read-time document normalization
//!
//! Stored documents predate schema changes and carry dates in every shape
//! the store ever produced. [`Normalizer::coerce`] is total: it rewrites
//! known date fields to canonical timestamps and patches placeholder labels
//! into dated arrays. [`Normalizer::normalize`] then tries strict validation
//! three times:
//!
//! 1. as coerced
//! 2. with null-valued fields stripped, so schema defaults fill them
//! 3. with missing required fields defaulted (dates to the epoch)
//!
//! Only when all three attempts fail is [`NormalizeError::CorruptDocument`]
//! returned.

use crate::document::{fields, Document};
use crate::path::FieldPath;
use crate::timestamp::{self, coerce_timestamp, parse_timestamp, timestamp_value};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Patch sentinel that marks a field for removal: `{"$clear": true}`
pub const CLEAR_SENTINEL: &str = "$clear";

/// Whether a value is the explicit clear sentinel
#[must_use]
pub fn is_clear_sentinel(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.len() == 1 && map.get(CLEAR_SENTINEL) == Some(&Value::Bool(true)),
        _ => false,
    }
}

/// Array of objects whose elements carry a date and a required label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedArray {
    /// Field name holding the array, matched at any depth
    pub key: String,
    /// Required text field of each element
    pub label_field: String,
    /// Value written when the label is absent
    pub placeholder: String,
}

impl DatedArray {
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        label_field: impl Into<String>,
        placeholder: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            label_field: label_field.into(),
            placeholder: placeholder.into(),
        }
    }
}

/// Field names the normalizer treats as dates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Keys whose values are coerced to timestamps wherever they appear
    pub date_keys: BTreeSet<String>,
    /// Dated array shapes
    pub dated_arrays: Vec<DatedArray>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        let date_keys = [
            "startDate",
            "endDate",
            "scheduledFor",
            "publishedAt",
            "date",
            "dueDate",
            "deadline",
            fields::CREATED_AT,
            fields::UPDATED_AT,
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        Self {
            date_keys,
            dated_arrays: vec![
                DatedArray::new("majorMilestones", "description", "Untitled milestone"),
                DatedArray::new("milestones", "description", "Untitled milestone"),
                DatedArray::new("timeline", "description", "Untitled event"),
            ],
        }
    }
}

impl NormalizerConfig {
    /// Add a date key
    #[inline]
    #[must_use]
    pub fn with_date_key(mut self, key: impl Into<String>) -> Self {
        self.date_keys.insert(key.into());
        self
    }

    /// Add a dated array shape
    #[inline]
    #[must_use]
    pub fn with_dated_array(mut self, array: DatedArray) -> Self {
        self.dated_arrays.push(array);
        self
    }
}

/// Strict schema an entity kind validates against
///
/// Implemented by the entity models; the normalizer only drives it.
pub trait DocumentSchema: Send + Sync {
    /// Schema name used in diagnostics
    fn name(&self) -> &str;

    /// Validate and return the canonical form, with schema defaults applied
    ///
    /// # Errors
    /// Returns [`SchemaError`] if the document does not satisfy the schema
    fn canonicalize(&self, document: Map<String, Value>) -> Result<Map<String, Value>, SchemaError>;

    /// Required date fields, as paths; array elements do not add a segment
    fn required_dates(&self) -> &[&'static str];

    /// Fill required non-date fields that are missing
    ///
    /// Runs only in the last repair pass. The default does nothing.
    fn apply_required_defaults(&self, _document: &mut Map<String, Value>) {}
}

/// Strict validation failure
#[derive(Debug, Clone, thiserror::Error)]
#[error("schema `{schema}` rejected document: {message}")]
pub struct SchemaError {
    pub schema: String,
    pub message: String,
}

impl SchemaError {
    #[must_use]
    pub fn new(schema: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            message: message.into(),
        }
    }
}

/// Normalization failures
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// All three repair passes failed validation
    #[error("corrupt {schema} document `{id}` after 3 repair passes: {last_error}")]
    CorruptDocument {
        schema: String,
        id: String,
        last_error: SchemaError,
    },
}

/// Date on a write that does not parse
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("`{field}` is not a valid date: {value}")]
pub struct InvalidDate {
    /// Dotted path of the offending field
    pub field: String,
    pub value: Value,
}

/// Which attempt produced a valid document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RepairPass {
    AsIs,
    NullsStripped,
    DefaultsApplied,
}

/// Successful normalization
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub document: Document,
    pub pass: RepairPass,
}

/// Coerces and repairs stored documents
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    #[inline]
    #[must_use]
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Total coercion of a stored document
    ///
    /// Date fields become canonical timestamps (epoch when unparsable),
    /// null dates stay null, dated array elements gain placeholder labels.
    #[must_use]
    pub fn coerce(&self, raw: Map<String, Value>) -> Map<String, Value> {
        self.coerce_map(raw)
    }

    /// Strict coercion for incoming writes
    ///
    /// Parseable dates are rewritten to canonical timestamps. Null and the
    /// clear sentinel pass through. Anything else is rejected instead of
    /// becoming the epoch, and labels are never invented.
    ///
    /// # Errors
    /// Returns [`InvalidDate`] for the first date field that does not parse
    pub fn coerce_write(&self, value: Value) -> Result<Value, InvalidDate> {
        self.strict_any(value, "")
    }

    /// Coerce, then validate with up to three repair passes
    ///
    /// # Errors
    /// Returns [`NormalizeError::CorruptDocument`] when no pass validates
    pub fn normalize(
        &self,
        raw: Map<String, Value>,
        schema: &dyn DocumentSchema,
    ) -> Result<Normalized, NormalizeError> {
        let id = raw
            .get(fields::ID)
            .and_then(Value::as_str)
            .unwrap_or("<unknown>")
            .to_string();
        let coerced = self.coerce(raw);

        let first = match schema.canonicalize(coerced.clone()) {
            Ok(document) => return Ok(normalized(document, RepairPass::AsIs)),
            Err(err) => err,
        };
        tracing::debug!(%id, schema = schema.name(), error = %first, "strict validation failed, stripping nulls");

        let stripped = strip_nulls(coerced);
        let second = match schema.canonicalize(stripped.clone()) {
            Ok(document) => return Ok(normalized(document, RepairPass::NullsStripped)),
            Err(err) => err,
        };
        tracing::debug!(%id, schema = schema.name(), error = %second, "validation failed, applying required defaults");

        let mut repaired = stripped;
        self.apply_required_defaults(&mut repaired, schema);
        match schema.canonicalize(repaired) {
            Ok(document) => {
                tracing::warn!(%id, schema = schema.name(), "document repaired with placeholder defaults");
                Ok(normalized(document, RepairPass::DefaultsApplied))
            }
            Err(last_error) => {
                tracing::warn!(%id, schema = schema.name(), error = %last_error, "document is corrupt");
                Err(NormalizeError::CorruptDocument {
                    schema: schema.name().to_string(),
                    id,
                    last_error,
                })
            }
        }
    }

    fn apply_required_defaults(&self, document: &mut Map<String, Value>, schema: &dyn DocumentSchema) {
        schema.apply_required_defaults(document);
        let epoch = timestamp::timestamp_value(timestamp::epoch());
        for raw_path in schema.required_dates() {
            let Ok(path) = FieldPath::from_str(raw_path) else {
                tracing::warn!(path = raw_path, "ignoring malformed required date path");
                continue;
            };
            path.visit_parents_mut(document, &mut |parent, key| {
                let missing = parent.get(key).map_or(true, Value::is_null);
                if missing {
                    parent.insert(key.to_string(), epoch.clone());
                }
            });
        }
    }

    fn coerce_map(&self, map: Map<String, Value>) -> Map<String, Value> {
        map.into_iter()
            .map(|(key, value)| {
                let value = if self.config.date_keys.contains(&key) {
                    coerce_date(value)
                } else if let Some(shape) = self.dated_array(&key) {
                    self.coerce_dated_array(value, shape)
                } else {
                    self.coerce_any(value)
                };
                (key, value)
            })
            .collect()
    }

    fn coerce_any(&self, value: Value) -> Value {
        match value {
            Value::Object(map) if is_clear_sentinel_map(&map) => Value::Object(map),
            Value::Object(map) => Value::Object(self.coerce_map(map)),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.coerce_any(item))
                    .collect(),
            ),
            other => other,
        }
    }

    fn coerce_dated_array(&self, value: Value, shape: &DatedArray) -> Value {
        let Value::Array(items) = value else {
            return self.coerce_any(value);
        };
        let items = items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => {
                    let mut map = self.coerce_map(map);
                    if label_missing(&map, &shape.label_field) {
                        map.insert(
                            shape.label_field.clone(),
                            Value::String(shape.placeholder.clone()),
                        );
                    }
                    Value::Object(map)
                }
                other => self.coerce_any(other),
            })
            .collect();
        Value::Array(items)
    }

    fn strict_any(&self, value: Value, path: &str) -> Result<Value, InvalidDate> {
        match value {
            Value::Object(map) if is_clear_sentinel_map(&map) => Ok(Value::Object(map)),
            Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| {
                    let field = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                    let value = if self.config.date_keys.contains(&key) {
                        strict_date(value, field)?
                    } else {
                        self.strict_any(value, &field)?
                    };
                    Ok((key, value))
                })
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.strict_any(item, path))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other),
        }
    }

    fn dated_array(&self, key: &str) -> Option<&DatedArray> {
        self.config.dated_arrays.iter().find(|shape| shape.key == key)
    }
}

fn normalized(document: Map<String, Value>, pass: RepairPass) -> Normalized {
    Normalized {
        document: Document::from_map(document),
        pass,
    }
}

fn coerce_date(value: Value) -> Value {
    match value {
        Value::Null => Value::Null,
        v if is_clear_sentinel(&v) => v,
        other => coerce_timestamp(&other),
    }
}

fn strict_date(value: Value, field: String) -> Result<Value, InvalidDate> {
    if value.is_null() || is_clear_sentinel(&value) {
        return Ok(value);
    }
    match parse_timestamp(&value) {
        Some(ts) => Ok(timestamp_value(ts)),
        None => Err(InvalidDate { field, value }),
    }
}

fn is_clear_sentinel_map(map: &Map<String, Value>) -> bool {
    map.len() == 1 && map.get(CLEAR_SENTINEL) == Some(&Value::Bool(true))
}

fn label_missing(map: &Map<String, Value>, label: &str) -> bool {
    match map.get(label) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Remove null-valued fields at every depth
///
/// Null array elements are kept; only object fields are stripped.
#[must_use]
pub fn strip_nulls(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key, strip_value(value)))
        .collect()
}

fn strip_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(strip_nulls(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_value).collect()),
        other => other,
    }
}
