use chrono::{DateTime, Utc};
use mkt_document::DocumentId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::{EntityKind, StateMetadata};
use crate::lifecycle::CampaignState;

/// Versioned campaign under a brand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: DocumentId,
    pub kind: EntityKind,
    pub parent_id: DocumentId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub state: CampaignState,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub audience: Vec<AudienceSegment>,
    #[serde(default)]
    pub content_mix: Vec<ContentMixEntry>,
    #[serde(default)]
    pub major_milestones: Vec<Milestone>,
    #[serde(default)]
    pub budget: Option<Number>,

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

/// Keyed by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    #[serde(rename = "type")]
    pub goal_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub kpis: Vec<Kpi>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Keyed by `metricName`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    pub metric_name: String,
    #[serde(default)]
    pub target: Option<Number>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Keyed by `segment`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudienceSegment {
    pub segment: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Keyed by `category`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMixEntry {
    pub category: String,
    #[serde(default)]
    pub percentage: Option<Number>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Keyed by `description`
// Descriptions are not guaranteed unique; two milestones sharing one merge
// as a single element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub description: String,
    pub date: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
