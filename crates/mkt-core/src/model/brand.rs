use chrono::{DateTime, Utc};
use mkt_document::DocumentId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{EntityKind, StateMetadata};

/// Root of the hierarchy; owns the guidelines content is checked against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub id: DocumentId,
    pub kind: EntityKind,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub guidelines: BrandGuidelines,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state_metadata: StateMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandGuidelines {
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    /// Matched case-insensitively against content bodies
    #[serde(default)]
    pub avoided_terms: Vec<String>,
    #[serde(default)]
    pub preferred_terms: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
