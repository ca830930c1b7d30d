//! Three-pass repair behaviour against a small strict schema

use chrono::{DateTime, Utc};
use mkt_document::{DocumentSchema, NormalizeError, Normalizer, RepairPass, SchemaError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Milestone {
    description: String,
    date: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    id: String,
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    start_date: DateTime<Utc>,
    #[serde(default)]
    milestones: Vec<Milestone>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

struct EventSchema;

impl DocumentSchema for EventSchema {
    fn name(&self) -> &str {
        "event"
    }

    fn canonicalize(&self, document: Map<String, Value>) -> Result<Map<String, Value>, SchemaError> {
        let typed: Event = serde_json::from_value(Value::Object(document))
            .map_err(|e| SchemaError::new("event", e.to_string()))?;
        match serde_json::to_value(typed) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(SchemaError::new("event", "serialized to a non-object")),
            Err(e) => Err(SchemaError::new("event", e.to_string())),
        }
    }

    fn required_dates(&self) -> &[&'static str] {
        &["startDate", "milestones.date"]
    }
}

fn raw(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[test]
fn valid_document_passes_as_is() {
    let normalizer = Normalizer::default();
    let out = normalizer
        .normalize(
            raw(json!({"id": "e1", "name": "Kickoff", "startDate": "2024-06-01"})),
            &EventSchema,
        )
        .unwrap();
    assert_eq!(out.pass, RepairPass::AsIs);
    assert_eq!(out.document.get("startDate"), Some(&json!("2024-06-01T00:00:00Z")));
}

#[test]
fn null_fields_fall_back_to_schema_defaults() {
    let normalizer = Normalizer::default();
    let out = normalizer
        .normalize(
            raw(json!({
                "id": "e1",
                "name": "Kickoff",
                "tags": null,
                "startDate": "2024-06-01T00:00:00Z"
            })),
            &EventSchema,
        )
        .unwrap();
    assert_eq!(out.pass, RepairPass::NullsStripped);
    assert_eq!(out.document.get("tags"), Some(&json!([])));
}

#[test]
fn missing_required_dates_become_epoch() {
    let normalizer = Normalizer::default();
    let out = normalizer
        .normalize(
            raw(json!({
                "id": "e1",
                "name": "Kickoff",
                "milestones": [{"description": "Brief"}]
            })),
            &EventSchema,
        )
        .unwrap();
    assert_eq!(out.pass, RepairPass::DefaultsApplied);
    assert_eq!(out.document.get("startDate"), Some(&json!("1970-01-01T00:00:00Z")));
    assert_eq!(
        out.document.get("milestones"),
        Some(&json!([{"description": "Brief", "date": "1970-01-01T00:00:00Z"}]))
    );
}

#[test]
fn absent_dated_array_stays_absent_during_repair() {
    let normalizer = Normalizer::default();
    let out = normalizer
        .normalize(raw(json!({"id": "e1", "name": "Kickoff"})), &EventSchema)
        .unwrap();
    assert_eq!(out.pass, RepairPass::DefaultsApplied);
    assert_eq!(out.document.get("startDate"), Some(&json!("1970-01-01T00:00:00Z")));
    assert_eq!(out.document.get("milestones"), Some(&json!([])));
}

#[test]
fn empty_object_date_is_readable() {
    let normalizer = Normalizer::default();
    let out = normalizer
        .normalize(
            raw(json!({"id": "e1", "name": "Kickoff", "startDate": {}})),
            &EventSchema,
        )
        .unwrap();
    assert_eq!(out.document.get("startDate"), Some(&json!("1970-01-01T00:00:00Z")));
}

#[test]
fn unrecoverable_document_is_corrupt() {
    let normalizer = Normalizer::default();
    let err = normalizer
        .normalize(raw(json!({"id": "e9", "startDate": "2024-06-01"})), &EventSchema)
        .unwrap_err();
    match err {
        NormalizeError::CorruptDocument { schema, id, last_error } => {
            assert_eq!(schema, "event");
            assert_eq!(id, "e9");
            assert!(last_error.message.contains("name"));
        }
    }
}
