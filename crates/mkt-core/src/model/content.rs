use chrono::{DateTime, Utc};
use mkt_document::DocumentId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{EntityKind, StateMetadata};
use crate::lifecycle::ContentState;

/// Versioned content piece under a micro plan, or directly under a brand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: DocumentId,
    pub kind: EntityKind,
    pub parent_id: DocumentId,
    pub title: String,
    /// Checked against the brand's avoided terms before `ready`
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    pub state: ContentState,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub media_requirements: MediaRequirements,

    #[serde(default = "super::common::first_version")]
    pub version: u64,
    #[serde(default = "super::common::active_by_default")]
    pub is_active: bool,
    #[serde(default)]
    pub previous_version_id: Option<DocumentId>,
    #[serde(default)]
    pub root_id: Option<DocumentId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state_metadata: StateMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRequirements {
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub dimensions: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
