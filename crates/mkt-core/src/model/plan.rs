use chrono::{DateTime, Utc};
use mkt_document::DocumentId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{EntityKind, StateMetadata};
use crate::lifecycle::PlanState;

/// Which level of planning a [`Plan`] is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanKind {
    /// Child of a campaign
    MasterPlan,
    /// Child of a master plan
    MicroPlan,
}

impl From<PlanKind> for EntityKind {
    fn from(value: PlanKind) -> Self {
        match value {
            PlanKind::MasterPlan => EntityKind::MasterPlan,
            PlanKind::MicroPlan => EntityKind::MicroPlan,
        }
    }
}

/// Master or micro plan; both share one shape tagged by `kind`
///
/// Plans are not versioned. `isActive` marks the one plan per parent that
/// is in effect and is only changed by transitions and activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: DocumentId,
    pub kind: PlanKind,
    pub parent_id: DocumentId,
    pub title: String,
    pub state: PlanState,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content_strategy: ContentStrategy,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state_metadata: StateMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStrategy {
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Keyed by `date`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub date: DateTime<Utc>,
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
