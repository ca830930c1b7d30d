//! Entity models
//!
//! Typed shapes for the five entity kinds. Documents stay untyped inside
//! the engine; these types are the strict write-time schema and a
//! convenient way for callers to read results.

mod brand;
mod campaign;
mod common;
mod content;
mod plan;

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use mkt_document::{fields, Document, DocumentSchema, SchemaError};
use mkt_merge::KeyedArrays;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EngineError;
use crate::lifecycle::initial_state;

pub use brand::{Brand, BrandGuidelines};
pub use campaign::{AudienceSegment, Campaign, ContentMixEntry, Goal, Kpi, Milestone};
pub use common::{metadata_patch, StateMetadata, REPAIR_ACTOR};
pub use content::{Content, MediaRequirements};
pub use plan::{ContentStrategy, Plan, PlanKind, TimelineEvent};

/// Entity discriminator stored in every document's `kind` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Brand,
    Campaign,
    MasterPlan,
    MicroPlan,
    Content,
}

impl EntityKind {
    pub const ALL: [Self; 5] = [
        Self::Brand,
        Self::Campaign,
        Self::MasterPlan,
        Self::MicroPlan,
        Self::Content,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Campaign => "campaign",
            Self::MasterPlan => "masterPlan",
            Self::MicroPlan => "microPlan",
            Self::Content => "content",
        }
    }

    /// Kind read from a document's `kind` field
    ///
    /// # Errors
    /// Returns [`EngineError::Validation`] if the field is missing or unknown
    pub fn of(document: &Document) -> Result<Self, EngineError> {
        let raw = document
            .str_field(fields::KIND)
            .ok_or_else(|| EngineError::Validation("document has no `kind`".to_string()))?;
        raw.parse().map_err(EngineError::Validation)
    }

    /// Campaign and Content keep version chains
    #[inline]
    #[must_use]
    pub const fn is_versioned(self) -> bool {
        matches!(self, Self::Campaign | Self::Content)
    }

    #[inline]
    #[must_use]
    pub const fn has_lifecycle(self) -> bool {
        !matches!(self, Self::Brand)
    }

    #[inline]
    #[must_use]
    pub const fn is_plan(self) -> bool {
        matches!(self, Self::MasterPlan | Self::MicroPlan)
    }

    /// Kinds a document of this kind may name as `parentId`
    #[must_use]
    pub const fn parent_kinds(self) -> &'static [Self] {
        match self {
            Self::Brand => &[],
            Self::Campaign => &[Self::Brand],
            Self::MasterPlan => &[Self::Campaign],
            Self::MicroPlan => &[Self::MasterPlan],
            Self::Content => &[Self::MicroPlan, Self::Brand],
        }
    }

    /// Kinds that may name a document of this kind as `parentId`
    #[must_use]
    pub const fn child_kinds(self) -> &'static [Self] {
        match self {
            Self::Brand => &[Self::Campaign, Self::Content],
            Self::Campaign => &[Self::MasterPlan],
            Self::MasterPlan => &[Self::MicroPlan],
            Self::MicroPlan => &[Self::Content],
            Self::Content => &[],
        }
    }

    /// Identity fields for the kind's mergeable arrays
    #[must_use]
    pub fn keyed_arrays(self) -> KeyedArrays {
        match self {
            Self::Campaign => KeyedArrays::new()
                .with("goals", "type")
                .with("goals.kpis", "metricName")
                .with("audience", "segment")
                .with("contentMix", "category")
                .with("majorMilestones", "description"),
            Self::MasterPlan | Self::MicroPlan => KeyedArrays::new().with("timeline", "date"),
            Self::Brand | Self::Content => KeyedArrays::new(),
        }
    }

    /// Strict schema the kind validates against
    #[must_use]
    pub fn schema(self) -> &'static dyn DocumentSchema {
        match self {
            Self::Brand => &BRAND_SCHEMA,
            Self::Campaign => &CAMPAIGN_SCHEMA,
            Self::MasterPlan => &MASTER_PLAN_SCHEMA,
            Self::MicroPlan => &MICRO_PLAN_SCHEMA,
            Self::Content => &CONTENT_SCHEMA,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown entity kind `{s}`"))
    }
}

/// Read a document as one of the typed models
///
/// # Errors
/// Returns [`EngineError::Validation`] if the document does not fit `T`
pub fn decode<T: DeserializeOwned>(document: &Document) -> Result<T, EngineError> {
    serde_json::from_value(Value::Object(document.as_map().clone()))
        .map_err(|e| EngineError::Validation(e.to_string()))
}

const COMMON_DATES: [&str; 3] = ["createdAt", "updatedAt", "stateMetadata.updatedAt"];

static BRAND_SCHEMA: TypedSchema<Brand> = TypedSchema::new(EntityKind::Brand, &COMMON_DATES);
static CAMPAIGN_SCHEMA: TypedSchema<Campaign> = TypedSchema::new(
    EntityKind::Campaign,
    &[
        "createdAt",
        "updatedAt",
        "stateMetadata.updatedAt",
        "startDate",
        "endDate",
        "majorMilestones.date",
    ],
);
static MASTER_PLAN_SCHEMA: TypedSchema<Plan> = TypedSchema::new(
    EntityKind::MasterPlan,
    &["createdAt", "updatedAt", "stateMetadata.updatedAt", "timeline.date"],
);
static MICRO_PLAN_SCHEMA: TypedSchema<Plan> = TypedSchema::new(
    EntityKind::MicroPlan,
    &["createdAt", "updatedAt", "stateMetadata.updatedAt", "timeline.date"],
);
static CONTENT_SCHEMA: TypedSchema<Content> = TypedSchema::new(EntityKind::Content, &COMMON_DATES);

/// Schema backed by a serde model: valid means it deserializes
///
/// The canonical form is the model serialized back, so defaults declared
/// on the model land in the stored document.
struct TypedSchema<T> {
    kind: EntityKind,
    required_dates: &'static [&'static str],
    _model: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    const fn new(kind: EntityKind, required_dates: &'static [&'static str]) -> Self {
        Self {
            kind,
            required_dates,
            _model: PhantomData,
        }
    }

    fn error(&self, message: impl Into<String>) -> SchemaError {
        SchemaError::new(self.kind.as_str(), message)
    }
}

impl<T> DocumentSchema for TypedSchema<T>
where
    T: Serialize + DeserializeOwned,
{
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn canonicalize(&self, document: Map<String, Value>) -> Result<Map<String, Value>, SchemaError> {
        match document.get(fields::KIND).and_then(Value::as_str) {
            Some(kind) if kind == self.kind.as_str() => {}
            Some(other) => return Err(self.error(format!("kind `{other}` does not match"))),
            None => return Err(self.error("missing `kind`")),
        }
        let typed: T = serde_json::from_value(Value::Object(document)).map_err(|e| self.error(e.to_string()))?;
        match serde_json::to_value(typed) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(self.error("model serialized to a non-object")),
            Err(e) => Err(self.error(e.to_string())),
        }
    }

    fn required_dates(&self) -> &[&'static str] {
        self.required_dates
    }

    fn apply_required_defaults(&self, document: &mut Map<String, Value>) {
        if !document.get(fields::STATE_METADATA).is_some_and(Value::is_object) {
            document.insert(
                fields::STATE_METADATA.to_string(),
                serde_json::json!({"version": 1, "updatedBy": REPAIR_ACTOR}),
            );
        }
        if let Some(metadata) = document.get_mut(fields::STATE_METADATA).and_then(Value::as_object_mut) {
            metadata.entry("version").or_insert_with(|| Value::from(1));
            metadata
                .entry("updatedBy")
                .or_insert_with(|| Value::from(REPAIR_ACTOR));
        }
        if let Some(state) = initial_state(self.kind) {
            document
                .entry(fields::STATE.to_string())
                .or_insert_with(|| Value::from(state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_names_match_serde() {
        for kind in EntityKind::ALL {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
            assert_eq!(kind.as_str().parse::<EntityKind>(), Ok(kind));
        }
    }

    #[test]
    fn only_campaign_and_content_are_versioned() {
        let versioned: Vec<_> = EntityKind::ALL.into_iter().filter(|k| k.is_versioned()).collect();
        assert_eq!(versioned, vec![EntityKind::Campaign, EntityKind::Content]);
    }

    #[test]
    fn parent_and_child_tables_agree() {
        for kind in EntityKind::ALL {
            for parent in kind.parent_kinds() {
                assert!(parent.child_kinds().contains(&kind), "{parent} should list {kind}");
            }
        }
    }

    #[test]
    fn plans_key_timeline_by_date() {
        let arrays = EntityKind::MicroPlan.keyed_arrays();
        assert_eq!(arrays.identity_for_str("timeline"), Some("date"));
    }

    #[test]
    fn schema_rejects_wrong_kind() {
        let doc = json!({"kind": "campaign"}).as_object().cloned().unwrap();
        let err = EntityKind::Brand.schema().canonicalize(doc).unwrap_err();
        assert!(err.message.contains("does not match"));
    }

    #[test]
    fn required_defaults_fill_metadata_and_state() {
        let mut doc = json!({"kind": "content"}).as_object().cloned().unwrap();
        EntityKind::Content.schema().apply_required_defaults(&mut doc);
        assert_eq!(doc["state"], json!("draft"));
        assert_eq!(doc["stateMetadata"]["updatedBy"], json!(REPAIR_ACTOR));
    }
}
