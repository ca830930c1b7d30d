//! Fork, activation and read repair of version chains

use std::sync::{Arc, Mutex};

use chrono::Utc;
use mkt_core::{
    DocumentStore, Engine, EngineConfig, EngineError, FieldUpdate, InMemoryStore, Query, StoreError, UpdateOptions,
};
use mkt_document::{fields, Document, DocumentId};
use mkt_test_utils::{
    active_members, seed_hierarchy, setup_engine, test_clock, FailPoint, FlakyStore, ACTOR,
};
use serde_json::json;

async fn fork_title(engine: &Engine, id: &DocumentId, title: &str) -> Document {
    engine
        .update(id, json!({"title": title}), UpdateOptions::fork(ACTOR))
        .await
        .unwrap()
}

#[tokio::test]
async fn any_member_resolves_to_the_active_version() {
    let (engine, store) = setup_engine();
    let ids = seed_hierarchy(&engine, &[], "Hello").await;

    let v2 = fork_title(&engine, &ids.content, "Second").await;
    let v2_id = v2.id().unwrap();
    assert_eq!(v2.u64_field(fields::VERSION), Some(2));
    assert_eq!(v2.id_field(fields::ROOT_ID), Some(ids.content.clone()));
    assert_eq!(v2.id_field(fields::PREVIOUS_VERSION_ID), Some(ids.content.clone()));

    let v3 = fork_title(&engine, &v2_id, "Third").await;
    let v3_id = v3.id().unwrap();
    assert_eq!(v3.id_field(fields::ROOT_ID), Some(ids.content.clone()));
    assert_eq!(v3.id_field(fields::PREVIOUS_VERSION_ID), Some(v2_id.clone()));

    for member in [&ids.content, &v2_id, &v3_id] {
        assert_eq!(engine.get(member).await.unwrap().id(), Some(v3_id.clone()));
    }
    assert_eq!(
        engine.get_exact(&ids.content).await.unwrap().str_field("title"),
        Some("Launch post")
    );

    let versions: Vec<_> = engine
        .list_versions(&v2_id)
        .await
        .unwrap()
        .iter()
        .filter_map(|d| d.u64_field(fields::VERSION))
        .collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert_eq!(
        engine.get_version(&v3_id, 2).await.unwrap().id(),
        Some(v2_id.clone())
    );
    assert!(matches!(
        engine.get_version(&v3_id, 9).await,
        Err(EngineError::NotFound(_))
    ));

    assert_eq!(active_members(store.as_ref(), &ids.content).await.len(), 1);
}

#[tokio::test]
async fn fork_starts_fresh_write_metadata_from_the_previous_version() {
    let (engine, _store) = setup_engine();
    let ids = seed_hierarchy(&engine, &[], "Hello").await;

    let v2 = engine
        .update(
            &ids.content,
            json!({"title": "Second"}),
            UpdateOptions::fork("editor").with_comment("rewrite"),
        )
        .await
        .unwrap();
    let metadata = v2.get(fields::STATE_METADATA).unwrap();
    assert_eq!(metadata.get("version"), Some(&json!(2)));
    assert_eq!(metadata.get("updatedBy"), Some(&json!("editor")));
    assert_eq!(metadata.get("comments"), Some(&json!("rewrite")));
    assert_ne!(v2.get(fields::CREATED_AT), engine.get_exact(&ids.content).await.unwrap().get(fields::CREATED_AT));
}

#[tokio::test]
async fn duplicate_version_numbers_resolve_to_the_newest() {
    let (engine, _store) = setup_engine();
    let ids = seed_hierarchy(&engine, &[], "Hello").await;

    let first_v2 = fork_title(&engine, &ids.content, "Second").await;
    engine.activate_version(&ids.content, ACTOR).await.unwrap();
    let branch_v2 = fork_title(&engine, &ids.content, "Branch").await;
    assert_eq!(branch_v2.u64_field(fields::VERSION), Some(2));
    assert_ne!(branch_v2.id(), first_v2.id());

    let found = engine.get_version(&ids.content, 2).await.unwrap();
    assert_eq!(found.id(), branch_v2.id());
    assert_eq!(found.str_field("title"), Some("Branch"));
}

#[tokio::test]
async fn activate_version_moves_the_active_flag() {
    let (engine, store) = setup_engine();
    let ids = seed_hierarchy(&engine, &[], "Hello").await;
    let v2_id = fork_title(&engine, &ids.content, "Second").await.id().unwrap();

    let restored = engine.activate_version(&ids.content, ACTOR).await.unwrap();
    assert_eq!(restored.id(), Some(ids.content.clone()));
    assert_eq!(restored.bool_field(fields::IS_ACTIVE), Some(true));

    let active = active_members(store.as_ref(), &ids.content).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id(), Some(ids.content.clone()));
    assert_eq!(engine.get(&v2_id).await.unwrap().id(), Some(ids.content.clone()));

    let err = engine.activate_version(&ids.master_plan, ACTOR).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)));
}

#[tokio::test]
async fn second_fork_from_a_stale_read_loses() {
    let (engine, store) = setup_engine();
    let ids = seed_hierarchy(&engine, &[], "Hello").await;
    let v1 = engine.get(&ids.content).await.unwrap();

    let chain = engine.chain();
    let winner = chain.fork(&v1, v1.clone(), Utc::now()).await.unwrap();
    let err = chain.fork(&v1, v1.clone(), Utc::now()).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict { ref root_id } if root_id == &ids.content));
    assert!(err.is_retryable());

    let active = active_members(store.as_ref(), &ids.content).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id(), winner.id());
    // The loser was removed again.
    assert_eq!(engine.list_versions(&ids.content).await.unwrap().len(), 2);
}

#[tokio::test]
async fn crash_between_insert_and_retire_is_repaired_on_read() {
    let inner = Arc::new(InMemoryStore::new());
    let flaky = Arc::new(FlakyStore::new(inner.clone()));
    let engine = Engine::new(flaky.clone(), EngineConfig::default()).with_clock(Arc::new(test_clock()));
    let ids = seed_hierarchy(&engine, &[], "Hello").await;

    flaky.fail_next(FailPoint::UpdateWhere);
    let err = engine
        .update(&ids.content, json!({"title": "Second"}), UpdateOptions::fork(ACTOR))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(_)));
    assert_eq!(active_members(inner.as_ref(), &ids.content).await.len(), 2);

    let current = engine.get(&ids.content).await.unwrap();
    assert_eq!(current.u64_field(fields::VERSION), Some(2));
    assert_eq!(current.str_field("title"), Some("Second"));

    let active = active_members(inner.as_ref(), &ids.content).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id(), current.id());
}

#[tokio::test]
async fn repair_can_be_left_to_the_caller() {
    let inner = Arc::new(InMemoryStore::new());
    let flaky = Arc::new(FlakyStore::new(inner.clone()));
    let config = EngineConfig::default().with_repair_on_read(false);
    let engine = Engine::new(flaky.clone(), config).with_clock(Arc::new(test_clock()));
    let ids = seed_hierarchy(&engine, &[], "Hello").await;

    flaky.fail_next(FailPoint::UpdateWhere);
    let _ = engine
        .update(&ids.content, json!({"title": "Second"}), UpdateOptions::fork(ACTOR))
        .await;

    assert_eq!(engine.get(&ids.content).await.unwrap().u64_field(fields::VERSION), Some(2));
    assert_eq!(active_members(inner.as_ref(), &ids.content).await.len(), 2);
}

#[tokio::test]
async fn chain_without_active_member_is_read_only() {
    let (engine, store) = setup_engine();
    let ids = seed_hierarchy(&engine, &[], "Hello").await;
    let v2_id = fork_title(&engine, &ids.content, "Second").await.id().unwrap();
    store
        .update_in_place(&v2_id, &FieldUpdate::new().set(fields::IS_ACTIVE, false))
        .await
        .unwrap();

    let current = engine.get(&ids.content).await.unwrap();
    assert_eq!(current.id(), Some(v2_id.clone()));
    assert!(active_members(store.as_ref(), &ids.content).await.is_empty());

    let err = engine
        .update(&ids.content, json!({"title": "Third"}), UpdateOptions::mutate(ACTOR))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)));

    engine.activate_version(&v2_id, ACTOR).await.unwrap();
    let updated = engine
        .update(&ids.content, json!({"title": "Third"}), UpdateOptions::mutate(ACTOR))
        .await
        .unwrap();
    assert_eq!(updated.id(), Some(v2_id));
}

#[tokio::test]
async fn unversioned_kinds_cannot_fork() {
    let (engine, store) = setup_engine();
    let ids = seed_hierarchy(&engine, &[], "Hello").await;
    let before = store.len();

    for id in [&ids.brand, &ids.master_plan, &ids.micro_plan] {
        let err = engine
            .update(id, json!({"title": "x"}), UpdateOptions::fork(ACTOR))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }
    assert_eq!(store.len(), before);
}

#[tokio::test]
async fn configured_default_mode_applies() {
    let store = Arc::new(InMemoryStore::new());
    let config = EngineConfig::default().with_default_update_mode(mkt_core::UpdateMode::Fork);
    let engine = Engine::new(store.clone(), config).with_clock(Arc::new(test_clock()));
    let ids = seed_hierarchy(&engine, &[], "Hello").await;

    let next = engine
        .update(&ids.campaign, json!({"name": "Renamed"}), UpdateOptions::new(ACTOR))
        .await
        .unwrap();
    assert_eq!(next.u64_field(fields::VERSION), Some(2));
    assert_eq!(store.find(&mkt_core::Query::new()).await.unwrap().len(), 6);
}

/// Lets a competing fork land between an update's read and its write
struct ForkBeforeWrite {
    inner: Arc<InMemoryStore>,
    racer: Mutex<Option<(Engine, DocumentId)>>,
}

impl ForkBeforeWrite {
    fn new(inner: Arc<InMemoryStore>) -> Self {
        Self { inner, racer: Mutex::new(None) }
    }

    fn arm(&self, id: DocumentId) {
        let racer = Engine::new(self.inner.clone(), EngineConfig::default()).with_clock(Arc::new(test_clock()));
        *self.racer.lock().unwrap() = Some((racer, id));
    }

    async fn race(&self) {
        let armed = self.racer.lock().unwrap().take();
        if let Some((racer, id)) = armed {
            fork_title(&racer, &id, "Forked meanwhile").await;
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for ForkBeforeWrite {
    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        self.inner.get(id).await
    }

    async fn find(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.inner.find(query).await
    }

    async fn insert(&self, document: Document) -> Result<(), StoreError> {
        self.inner.insert(document).await
    }

    async fn update_in_place(&self, id: &DocumentId, update: &FieldUpdate) -> Result<Document, StoreError> {
        self.race().await;
        self.inner.update_in_place(id, update).await
    }

    async fn update_where(
        &self,
        id: &DocumentId,
        guard: &Query,
        update: &FieldUpdate,
    ) -> Result<Option<Document>, StoreError> {
        self.race().await;
        self.inner.update_where(id, guard, update).await
    }

    async fn delete_hard(&self, id: &DocumentId) -> Result<bool, StoreError> {
        self.inner.delete_hard(id).await
    }
}

#[tokio::test]
async fn in_place_update_loses_to_a_concurrent_fork() {
    let inner = Arc::new(InMemoryStore::new());
    let racing = Arc::new(ForkBeforeWrite::new(inner.clone()));
    let engine = Engine::new(racing.clone(), EngineConfig::default()).with_clock(Arc::new(test_clock()));
    let ids = seed_hierarchy(&engine, &[], "Hello").await;

    racing.arm(ids.content.clone());
    let err = engine
        .update(&ids.content, json!({"title": "Edited in place"}), UpdateOptions::mutate(ACTOR))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict { ref root_id } if root_id == &ids.content), "{err}");

    let active = active_members(inner.as_ref(), &ids.content).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].u64_field(fields::VERSION), Some(2));
    assert_eq!(active[0].str_field("title"), Some("Forked meanwhile"));

    // The retired version was neither edited nor reactivated.
    let v1 = inner.get(&ids.content).await.unwrap().unwrap();
    assert_eq!(v1.bool_field(fields::IS_ACTIVE), Some(false));
    assert_eq!(v1.str_field("title"), Some("Launch post"));
}
