use chrono::{DateTime, Utc};
use mkt_document::timestamp::timestamp_value;
use mkt_document::{fields, Document};
use mkt_merge::Patch;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Actor recorded when read-time repair has to invent metadata
pub const REPAIR_ACTOR: &str = "system";

/// Audit record carried by every entity
///
/// `version` counts writes to this document and is unrelated to the
/// version-chain `version` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMetadata {
    pub version: u64,
    pub updated_by: String,
    #[serde(default)]
    pub comments: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StateMetadata {
    /// Metadata for a freshly created entity
    #[must_use]
    pub fn initial(actor: &str, now: DateTime<Utc>) -> Self {
        Self {
            version: 1,
            updated_by: actor.to_string(),
            comments: None,
            updated_at: now,
            extra: Map::new(),
        }
    }
}

pub(super) fn first_version() -> u64 {
    1
}

pub(super) fn active_by_default() -> bool {
    true
}

/// Patch that stamps a write into `stateMetadata`
///
/// Bumps the write counter and records the actor and time. `comments` is
/// only touched when one is supplied, so older comments survive.
#[must_use]
pub fn metadata_patch(existing: &Document, actor: &str, comment: Option<&str>, now: DateTime<Utc>) -> Patch {
    let previous = existing
        .get(fields::STATE_METADATA)
        .and_then(|m| m.get("version"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let patch = Patch::new()
        .set("version", Value::from(previous + 1))
        .set("updatedBy", Value::from(actor))
        .set("updatedAt", timestamp_value(now));
    match comment {
        Some(comment) => patch.set("comments", Value::from(comment)),
        None => patch,
    }
}
