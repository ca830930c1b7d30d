//! Engine facade
//!
//! Inbound surface of the entity engine. Every write follows one pipeline:
//! resolve the active version → strip engine-owned fields → merge → apply
//! any requested state change → enforce the strict schema → persist in
//! place or as a new version.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mkt_document::timestamp::timestamp_value;
use mkt_document::{fields, Document, DocumentId, Normalizer};
use mkt_merge::{merge, FieldPatch, KeyedArrays, Patch};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, UpdateMode};
use crate::error::EngineError;
use crate::guidelines;
use crate::hierarchy::{ContentFilter, Hierarchy};
use crate::lifecycle::{check_transition, initial_state, ContentState, LifecycleState, PlanState};
use crate::model::{metadata_patch, EntityKind, StateMetadata};
use crate::repository::Repository;
use crate::store::{DocumentStore, FieldUpdate, StoreError};
use crate::versioning::{is_active, not_retired, VersionChain};

/// Fields callers can never write directly
const PROTECTED: [&str; 7] = [
    fields::ID,
    fields::KIND,
    fields::CREATED_AT,
    fields::VERSION,
    fields::IS_ACTIVE,
    fields::ROOT_ID,
    fields::PREVIOUS_VERSION_ID,
];

/// Per-call update settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOptions {
    /// `None` uses the configured default
    pub mode: Option<UpdateMode>,
    pub actor: String,
    pub comment: Option<String>,
}

impl UpdateOptions {
    #[must_use]
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            mode: None,
            actor: actor.into(),
            comment: None,
        }
    }

    #[must_use]
    pub fn mutate(actor: impl Into<String>) -> Self {
        Self::new(actor).with_mode(UpdateMode::Mutate)
    }

    #[must_use]
    pub fn fork(actor: impl Into<String>) -> Self {
        Self::new(actor).with_mode(UpdateMode::Fork)
    }

    #[must_use]
    pub fn with_mode(mut self, mode: UpdateMode) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Entry point for creating, updating and querying marketing entities
///
/// Holds no entity state between calls; every operation reads what it
/// needs from the store.
#[derive(Clone)]
pub struct Engine {
    repo: Repository,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Engine {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, config: EngineConfig) -> Self {
        let normalizer = Normalizer::new(config.normalizer.clone());
        Self {
            repo: Repository::new(store, normalizer),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replace the time source
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    #[inline]
    #[must_use]
    pub fn chain(&self) -> VersionChain<'_> {
        VersionChain::new(&self.repo, self.config.repair_on_read)
    }

    #[inline]
    #[must_use]
    pub fn hierarchy(&self) -> Hierarchy<'_> {
        Hierarchy::new(&self.repo, self.chain(), self.config.max_hierarchy_depth)
    }

    /// Create a new entity from a payload
    ///
    /// Assigns `id`, timestamps, the initial state and `stateMetadata`.
    /// Versioned kinds start as active version 1; plans start inactive.
    ///
    /// # Errors
    /// - [`EngineError::InvalidRequest`] if the payload is not an object
    /// - [`EngineError::ReferentialIntegrity`] for a missing or wrong parent
    /// - [`EngineError::Validation`] if the result violates the schema
    pub async fn create(&self, kind: EntityKind, payload: Value, actor: &str) -> Result<Document, EngineError> {
        let Value::Object(payload) = self.repo.normalizer().coerce_write(payload)? else {
            return Err(EngineError::InvalidRequest(format!("{kind} payload must be an object")));
        };
        let mut patch = Patch::from_map(payload);
        strip_protected(&mut patch);
        for owned in [fields::STATE, fields::STATE_METADATA, fields::UPDATED_AT] {
            if patch.take(owned).is_some() {
                debug!(field = owned, "ignoring engine-owned field in create payload");
            }
        }

        let mut document = merge(&Document::new(), &patch, &kind.keyed_arrays());
        let now = self.clock.now();
        let id = DocumentId::generate();
        let metadata = serde_json::to_value(StateMetadata::initial(actor, now))
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        document.insert(fields::ID, id.to_value());
        document.insert(fields::KIND, Value::from(kind.as_str()));
        document.insert(fields::CREATED_AT, timestamp_value(now));
        document.insert(fields::UPDATED_AT, timestamp_value(now));
        document.insert(fields::STATE_METADATA, metadata);
        if let Some(state) = initial_state(kind) {
            document.insert(fields::STATE, Value::from(state));
        }
        if kind.is_versioned() {
            document.insert(fields::VERSION, Value::from(1));
            document.insert(fields::IS_ACTIVE, Value::Bool(true));
            document.insert(fields::PREVIOUS_VERSION_ID, Value::Null);
            document.insert(fields::ROOT_ID, Value::Null);
        } else if kind.is_plan() {
            document.insert(fields::IS_ACTIVE, Value::Bool(false));
        }

        if !kind.parent_kinds().is_empty() {
            let parent_id = document
                .id_field(fields::PARENT_ID)
                .ok_or_else(|| EngineError::ReferentialIntegrity(format!("{kind} requires a parentId")))?;
            self.hierarchy().check_parent(kind, &parent_id).await?;
        }

        let document = canonicalize(kind, document)?;
        self.repo.store().insert(document.clone()).await?;
        info!(kind = %kind, id = %id, actor, "created entity");
        Ok(document)
    }

    /// Apply a JSON partial update
    ///
    /// `null` leaves a field alone, `{"$clear": true}` removes it, objects
    /// merge and keyed arrays merge by identity. A `state` field is routed
    /// through the lifecycle table.
    ///
    /// # Errors
    /// See [`update_with`](Self::update_with)
    pub async fn update(&self, id: &DocumentId, partial: Value, options: UpdateOptions) -> Result<Document, EngineError> {
        let patch = Patch::from_json(partial)?;
        self.update_with(id, patch, options).await
    }

    /// Apply a typed patch to the entity `id` (any chain member) belongs to
    ///
    /// # Errors
    /// - [`EngineError::NotFound`] if `id` does not exist
    /// - [`EngineError::InvalidRequest`] when forking an unversioned kind or
    ///   writing to a chain with no active version
    /// - [`EngineError::InvalidTransition`] / [`EngineError::GuidelineViolation`]
    ///   for a rejected state change
    /// - [`EngineError::ReferentialIntegrity`] for a bad new `parentId`
    /// - [`EngineError::Validation`] if the merge result violates the schema
    /// - [`EngineError::Conflict`] if a concurrent fork won
    pub async fn update_with(&self, id: &DocumentId, mut patch: Patch, options: UpdateOptions) -> Result<Document, EngineError> {
        let mode = options.mode.unwrap_or(self.config.default_update_mode);
        let existing = self.chain().get_active(id).await?;
        let kind = EntityKind::of(&existing)?;
        let existing_id = existing.id().unwrap_or_else(|| id.clone());

        if mode == UpdateMode::Fork && !kind.is_versioned() {
            return Err(EngineError::InvalidRequest(format!("{kind} does not support versioned updates")));
        }
        if kind.is_versioned() && !is_active(&existing) {
            return Err(EngineError::InvalidRequest(format!(
                "{kind} {existing_id} has no active version; activate one before writing"
            )));
        }

        strip_protected(&mut patch);
        let requested_state = take_state(&mut patch)?;
        let mut patch = coerce_patch(self.repo.normalizer(), &patch)?;

        let now = self.clock.now();
        let stamp = metadata_patch(&existing, &options.actor, options.comment.as_deref(), now);
        let metadata = match patch.take(fields::STATE_METADATA) {
            Some(FieldPatch::Merge(mut caller)) => {
                for (key, field) in stamp.iter() {
                    caller.insert(key, field.clone());
                }
                caller
            }
            Some(FieldPatch::Keep) | None => stamp,
            Some(_) => {
                debug!(id = %existing_id, "stateMetadata can only be merged, ignoring replacement");
                stamp
            }
        };
        patch.insert(fields::STATE_METADATA, FieldPatch::Merge(metadata));
        patch.insert(fields::UPDATED_AT, FieldPatch::Set(timestamp_value(now)));

        let mut merged = merge(&existing, &patch, &kind.keyed_arrays());

        if merged.get(fields::PARENT_ID) != existing.get(fields::PARENT_ID) {
            let parent_id = merged
                .id_field(fields::PARENT_ID)
                .ok_or_else(|| EngineError::ReferentialIntegrity(format!("{kind} requires a parentId")))?;
            self.hierarchy().check_parent(kind, &parent_id).await?;
        }

        if let Some(target) = requested_state {
            self.apply_state_change(kind, &existing, &mut merged, &target, now).await?;
        }

        let merged = canonicalize(kind, merged)?;
        match mode {
            UpdateMode::Mutate => {
                // Diff against the raw stored form so read-time repairs persist.
                let store = self.repo.store();
                let raw = store
                    .get(&existing_id)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(existing_id.clone()))?;
                let update = FieldUpdate::diff(&raw, &merged);
                let stored = if kind.is_versioned() {
                    // A concurrent fork may retire this version after it was read.
                    let update = update.without(fields::IS_ACTIVE);
                    debug!(kind = %kind, id = %existing_id, changed = update.fields_set().len(), "updating version in place");
                    store
                        .update_where(&existing_id, &not_retired(), &update)
                        .await?
                        .ok_or_else(|| {
                            let root_id = VersionChain::root_of(&existing).unwrap_or_else(|| existing_id.clone());
                            warn!(root = %root_id, id = %existing_id, "in-place update lost to a fork");
                            EngineError::Conflict { root_id }
                        })?
                } else {
                    debug!(kind = %kind, id = %existing_id, changed = update.fields_set().len(), "updating in place");
                    store
                        .update_in_place(&existing_id, &update)
                        .await
                        .map_err(|e| not_found_or(e, &existing_id))?
                };
                self.repo.normalize(stored)
            }
            UpdateMode::Fork => self.chain().fork(&existing, merged, now).await,
        }
    }

    /// Move an entity to `target` state
    ///
    /// # Errors
    /// [`EngineError::InvalidTransition`] if the table forbids it;
    /// [`EngineError::GuidelineViolation`] when content entering `ready`
    /// uses avoided terms
    pub async fn transition(
        &self,
        id: &DocumentId,
        target: &str,
        actor: &str,
        comment: Option<&str>,
    ) -> Result<Document, EngineError> {
        let mut options = UpdateOptions::mutate(actor);
        options.comment = comment.map(ToString::to_string);
        self.update_with(id, Patch::new().set(fields::STATE, Value::from(target)), options)
            .await
    }

    /// Make a specific version of a chain the active one
    ///
    /// # Errors
    /// [`EngineError::InvalidRequest`] for unversioned kinds;
    /// [`EngineError::NotFound`]
    pub async fn activate_version(&self, id: &DocumentId, actor: &str) -> Result<Document, EngineError> {
        let target = self.repo.require(id).await?;
        let now = self.clock.now();
        let activation = FieldUpdate::new()
            .set(fields::STATE_METADATA, stamped_metadata(&target, actor, now))
            .set(fields::UPDATED_AT, timestamp_value(now));
        self.chain().activate(id, activation).await
    }

    /// Make a plan the active one among its same-kind siblings
    ///
    /// Deactivates every other active sibling under the same parent, then
    /// activates the target. The writes are not atomic.
    ///
    /// # Errors
    /// [`EngineError::InvalidRequest`] if `id` is not a plan
    pub async fn activate_plan(&self, id: &DocumentId, actor: &str) -> Result<Document, EngineError> {
        let plan = self.repo.require(id).await?;
        let kind = EntityKind::of(&plan)?;
        if !kind.is_plan() {
            return Err(EngineError::InvalidRequest(format!("{kind} is not a plan")));
        }
        let parent_id = plan
            .id_field(fields::PARENT_ID)
            .ok_or_else(|| EngineError::ReferentialIntegrity(format!("{kind} {id} has no parentId")))?;

        let store = self.repo.store();
        let siblings = self.hierarchy().children(&parent_id, kind).await?;
        for sibling in siblings.iter().filter(|s| is_active(s)) {
            let Some(sibling_id) = sibling.id() else { continue };
            if &sibling_id == id {
                continue;
            }
            let now = self.clock.now();
            let update = FieldUpdate::new()
                .set(fields::IS_ACTIVE, false)
                .set(fields::STATE_METADATA, stamped_metadata(sibling, actor, now))
                .set(fields::UPDATED_AT, timestamp_value(now));
            store.update_in_place(&sibling_id, &update).await?;
            debug!(id = %sibling_id, "deactivated sibling plan");
        }

        let now = self.clock.now();
        let update = FieldUpdate::new()
            .set(fields::IS_ACTIVE, true)
            .set(fields::STATE_METADATA, stamped_metadata(&plan, actor, now))
            .set(fields::UPDATED_AT, timestamp_value(now));
        let activated = store
            .update_in_place(id, &update)
            .await
            .map_err(|e| not_found_or(e, id))?;
        info!(kind = %kind, id = %id, parent = %parent_id, "activated plan");
        self.repo.normalize(activated)
    }

    /// Current version of the entity `id` belongs to
    ///
    /// # Errors
    /// [`EngineError::NotFound`]
    pub async fn get(&self, id: &DocumentId) -> Result<Document, EngineError> {
        self.chain().get_active(id).await
    }

    /// Exactly the document stored under `id`, without redirecting
    ///
    /// # Errors
    /// [`EngineError::NotFound`]
    pub async fn get_exact(&self, id: &DocumentId) -> Result<Document, EngineError> {
        self.repo.require(id).await
    }

    /// # Errors
    /// [`EngineError::NotFound`] if the chain has no version `n`
    pub async fn get_version(&self, id: &DocumentId, n: u64) -> Result<Document, EngineError> {
        self.chain().get_version(id, n).await
    }

    /// # Errors
    /// [`EngineError::NotFound`]
    pub async fn list_versions(&self, id: &DocumentId) -> Result<Vec<Document>, EngineError> {
        self.chain().list_versions(id).await
    }

    /// Physically remove exactly one document, bypassing versioning
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if nothing was stored under `id`
    pub async fn delete(&self, id: &DocumentId) -> Result<(), EngineError> {
        if self.repo.store().delete_hard(id).await? {
            info!(id = %id, "hard deleted document");
            Ok(())
        } else {
            Err(EngineError::NotFound(id.clone()))
        }
    }

    /// # Errors
    /// See [`Hierarchy::children`]
    pub async fn children(&self, parent: &DocumentId, kind: EntityKind) -> Result<Vec<Document>, EngineError> {
        self.hierarchy().children(parent, kind).await
    }

    /// # Errors
    /// See [`Hierarchy::content_under`]
    pub async fn content_under(&self, id: &DocumentId, filter: &ContentFilter) -> Result<Vec<Document>, EngineError> {
        self.hierarchy().content_under(id, filter).await
    }

    /// # Errors
    /// See [`Hierarchy::ancestors`]
    pub async fn ancestors(&self, id: &DocumentId) -> Result<Vec<Document>, EngineError> {
        self.hierarchy().ancestors(id).await
    }

    /// # Errors
    /// See [`Hierarchy::brand_for`]
    pub async fn brand_for(&self, id: &DocumentId) -> Result<Document, EngineError> {
        self.hierarchy().brand_for(id).await
    }

    async fn apply_state_change(
        &self,
        kind: EntityKind,
        existing: &Document,
        merged: &mut Document,
        target: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let from = existing
            .str_field(fields::STATE)
            .or_else(|| initial_state(kind))
            .unwrap_or_default()
            .to_string();
        check_transition(kind, &from, target)?;

        if kind == EntityKind::Content && target == ContentState::Ready.as_str() {
            let brand = self.owning_brand(merged).await?;
            guidelines::check_content(merged, &brand)?;
        }
        if kind.is_plan() && target == PlanState::Active.as_str() {
            merged.insert(fields::IS_ACTIVE, Value::Bool(true));
        }
        if kind == EntityKind::Content
            && target == ContentState::Published.as_str()
            && merged.get("publishedAt").map_or(true, Value::is_null)
        {
            merged.insert("publishedAt", timestamp_value(now));
        }

        merged.insert(fields::STATE, Value::from(target));
        info!(kind = %kind, id = ?merged.id(), from = %from, to = target, "state transition");
        Ok(())
    }

    async fn owning_brand(&self, content: &Document) -> Result<Document, EngineError> {
        let hierarchy = self.hierarchy();
        let parent = hierarchy
            .parent_of(content)
            .await?
            .ok_or_else(|| EngineError::ReferentialIntegrity("content has no parent".to_string()))?;
        if EntityKind::of(&parent)? == EntityKind::Brand {
            return Ok(parent);
        }
        let parent_id = parent
            .id()
            .ok_or_else(|| EngineError::ReferentialIntegrity("parent has no id".to_string()))?;
        hierarchy.brand_for(&parent_id).await
    }
}

fn strip_protected(patch: &mut Patch) {
    for field in PROTECTED {
        if patch.take(field).is_some() {
            debug!(field, "dropping protected field from patch");
        }
    }
}

fn take_state(patch: &mut Patch) -> Result<Option<String>, EngineError> {
    match patch.take(fields::STATE) {
        None | Some(FieldPatch::Keep) => Ok(None),
        Some(FieldPatch::Set(Value::String(state))) => Ok(Some(state)),
        Some(_) => Err(EngineError::InvalidRequest("state must be a string".to_string())),
    }
}

/// Date coercion for values a patch sets, keyed the same way as reads
fn coerce_patch(normalizer: &Normalizer, patch: &Patch) -> Result<Patch, EngineError> {
    let mut out = Patch::new();
    for (key, field) in patch.iter() {
        let coerced = match field {
            FieldPatch::Set(value) => {
                let mut single = Map::new();
                single.insert(key.to_string(), value.clone());
                match normalizer.coerce_write(Value::Object(single))? {
                    Value::Object(mut map) => map.remove(key).map_or(FieldPatch::Keep, FieldPatch::Set),
                    _ => FieldPatch::Set(value.clone()),
                }
            }
            FieldPatch::Merge(nested) => FieldPatch::Merge(coerce_patch(normalizer, nested)?),
            FieldPatch::Keep | FieldPatch::Clear => field.clone(),
        };
        out.insert(key, coerced);
    }
    Ok(out)
}

/// `stateMetadata` after stamping a write into it
fn stamped_metadata(document: &Document, actor: &str, now: DateTime<Utc>) -> Value {
    let stamp = Patch::new().merge(fields::STATE_METADATA, metadata_patch(document, actor, None, now));
    merge(document, &stamp, &KeyedArrays::new())
        .remove(fields::STATE_METADATA)
        .unwrap_or(Value::Null)
}

fn canonicalize(kind: EntityKind, document: Document) -> Result<Document, EngineError> {
    kind.schema()
        .canonicalize(document.into_map())
        .map(Document::from_map)
        .map_err(|e| EngineError::Validation(e.to_string()))
}

fn not_found_or(error: StoreError, id: &DocumentId) -> EngineError {
    match error {
        StoreError::Missing(_) => EngineError::NotFound(id.clone()),
        other => EngineError::Store(other),
    }
}
