//! Testing utilities for the MKT workspace
//!
//! Shared payload builders, a seeded hierarchy, and a store wrapper that
//! injects faults between the writes of multi-document operations.

#![allow(missing_docs)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use mkt_core::{
    DocumentStore, Engine, EngineConfig, EntityKind, FieldUpdate, InMemoryStore, ManualClock, Query,
    StoreError,
};
use mkt_document::{fields, Document, DocumentId};
use parking_lot::Mutex;
use serde_json::{json, Value};

pub const ACTOR: &str = "tester";

pub fn brand_payload(name: &str, avoided_terms: &[&str]) -> Value {
    json!({
        "name": name,
        "guidelines": {"tone": "friendly", "avoidedTerms": avoided_terms}
    })
}

pub fn campaign_payload(brand_id: &DocumentId) -> Value {
    json!({
        "parentId": brand_id.as_str(),
        "name": "Summer Launch",
        "startDate": "2024-06-01",
        "endDate": "2024-08-31T00:00:00Z",
        "goals": [
            {"type": "awareness", "priority": 1, "kpis": [{"metricName": "reach", "target": 10000}]},
            {"type": "leads", "priority": 2}
        ],
        "audience": [{"segment": "students"}],
        "majorMilestones": [{"description": "Kickoff", "date": "2024-06-01"}]
    })
}

pub fn plan_payload(parent_id: &DocumentId, title: &str) -> Value {
    json!({
        "parentId": parent_id.as_str(),
        "title": title,
        "contentStrategy": {"objective": "reach", "themes": ["sun"]},
        "timeline": [{"date": "2024-06-10", "description": "Teaser"}]
    })
}

pub fn content_payload(parent_id: &DocumentId, body: &str) -> Value {
    json!({
        "parentId": parent_id.as_str(),
        "title": "Launch post",
        "body": body,
        "platform": "instagram",
        "scheduledFor": "2024-06-15T10:00:00Z"
    })
}

/// Engine over a fresh in-memory store with a deterministic clock
pub fn setup_engine() -> (Engine, Arc<InMemoryStore>) {
    setup_engine_with(EngineConfig::default())
}

pub fn setup_engine_with(config: EngineConfig) -> (Engine, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let engine = Engine::new(store.clone(), config).with_clock(Arc::new(test_clock()));
    (engine, store)
}

pub fn test_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
}

/// Ids of one full Brand → Content path
#[derive(Debug, Clone)]
pub struct SeededHierarchy {
    pub brand: DocumentId,
    pub campaign: DocumentId,
    pub master_plan: DocumentId,
    pub micro_plan: DocumentId,
    pub content: DocumentId,
}

pub async fn seed_hierarchy(engine: &Engine, avoided_terms: &[&str], body: &str) -> SeededHierarchy {
    let brand = create(engine, EntityKind::Brand, brand_payload("Acme", avoided_terms)).await;
    let campaign = create(engine, EntityKind::Campaign, campaign_payload(&brand)).await;
    let master_plan = create(engine, EntityKind::MasterPlan, plan_payload(&campaign, "Master")).await;
    let micro_plan = create(engine, EntityKind::MicroPlan, plan_payload(&master_plan, "Week 1")).await;
    let content = create(engine, EntityKind::Content, content_payload(&micro_plan, body)).await;
    SeededHierarchy {
        brand,
        campaign,
        master_plan,
        micro_plan,
        content,
    }
}

pub async fn create(engine: &Engine, kind: EntityKind, payload: Value) -> DocumentId {
    engine.create(kind, payload, ACTOR).await.unwrap().id().unwrap()
}

/// Members of a chain with `isActive == true`, read raw from the store
pub async fn active_members(store: &dyn DocumentStore, root: &DocumentId) -> Vec<Document> {
    let mut all = store
        .find(&Query::new().eq(fields::ROOT_ID, root.to_value()))
        .await
        .unwrap();
    if let Some(root_doc) = store.get(root).await.unwrap() {
        all.push(root_doc);
    }
    all.into_iter()
        .filter(|d| d.bool_field(fields::IS_ACTIVE) == Some(true))
        .collect()
}

/// Store call a fault can target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Insert,
    UpdateInPlace,
    UpdateWhere,
    DeleteHard,
}

#[derive(Debug)]
struct Fault {
    point: FailPoint,
    /// Calls to let through before failing
    skip: usize,
}

/// Wraps a store and fails chosen writes once
///
/// Each armed fault fires on the `skip + 1`-th matching call, then disarms.
/// Reads always pass through.
pub struct FlakyStore {
    inner: Arc<dyn DocumentStore>,
    faults: Mutex<Vec<Fault>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next call at `point`
    pub fn fail_next(&self, point: FailPoint) {
        self.fail_after(point, 0);
    }

    /// Let `skip` calls at `point` through, then fail one
    pub fn fail_after(&self, point: FailPoint, skip: usize) {
        self.faults.lock().push(Fault { point, skip });
    }

    pub fn armed(&self) -> usize {
        self.faults.lock().len()
    }

    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        let mut faults = self.faults.lock();
        let Some(idx) = faults.iter().position(|f| f.point == point) else {
            return Ok(());
        };
        if faults[idx].skip > 0 {
            faults[idx].skip -= 1;
            return Ok(());
        }
        faults.remove(idx);
        Err(StoreError::Unavailable(format!("injected fault at {point:?}")))
    }
}

#[async_trait::async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        self.inner.get(id).await
    }

    async fn find(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.inner.find(query).await
    }

    async fn insert(&self, document: Document) -> Result<(), StoreError> {
        self.check(FailPoint::Insert)?;
        self.inner.insert(document).await
    }

    async fn update_in_place(&self, id: &DocumentId, update: &FieldUpdate) -> Result<Document, StoreError> {
        self.check(FailPoint::UpdateInPlace)?;
        self.inner.update_in_place(id, update).await
    }

    async fn update_where(
        &self,
        id: &DocumentId,
        guard: &Query,
        update: &FieldUpdate,
    ) -> Result<Option<Document>, StoreError> {
        self.check(FailPoint::UpdateWhere)?;
        self.inner.update_where(id, guard, update).await
    }

    async fn delete_hard(&self, id: &DocumentId) -> Result<bool, StoreError> {
        self.check(FailPoint::DeleteHard)?;
        self.inner.delete_hard(id).await
    }
}
