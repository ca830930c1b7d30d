//! Version chains
//!
//! Campaign and Content documents form chains: the first version is the
//! root (`rootId` null), every fork records `rootId`, `previousVersionId`
//! and the next `version`. Exactly one member is meant to be active.
//!
//! Forks and activations are sequences of single-document writes. Reads
//! tolerate the windows between them:
//! - several active members: the most recently updated wins (then higher
//!   version, then higher id), and the losers are deactivated when
//!   `repair_on_read` is set
//! - no active member: the highest version is returned without writing

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mkt_document::timestamp::timestamp_value;
use mkt_document::{fields, Document, DocumentId};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::model::EntityKind;
use crate::repository::Repository;
use crate::store::{FieldUpdate, Query};

/// Version-chain operations over a repository
#[derive(Clone, Copy)]
pub struct VersionChain<'a> {
    repo: &'a Repository,
    repair_on_read: bool,
}

impl<'a> VersionChain<'a> {
    #[must_use]
    pub fn new(repo: &'a Repository, repair_on_read: bool) -> Self {
        Self { repo, repair_on_read }
    }

    /// Chain a document belongs to: its `rootId`, or its own id for a root
    #[must_use]
    pub fn root_of(document: &Document) -> Option<DocumentId> {
        document
            .id_field(fields::ROOT_ID)
            .or_else(|| document.id())
    }

    /// Every member of the chain rooted at `root`, ordered by version
    ///
    /// # Errors
    /// Store failures and corrupt members
    pub async fn members(&self, root: &DocumentId) -> Result<Vec<Document>, EngineError> {
        let mut by_id: BTreeMap<DocumentId, Document> = BTreeMap::new();
        if let Some(root_doc) = self.repo.load(root).await? {
            if let Some(id) = root_doc.id() {
                by_id.insert(id, root_doc);
            }
        }
        for member in self.repo.find(&Query::new().eq(fields::ROOT_ID, root.to_value())).await? {
            if let Some(id) = member.id() {
                by_id.insert(id, member);
            }
        }

        let mut members: Vec<Document> = by_id.into_values().collect();
        members.sort_by(|a, b| version_of(a).cmp(&version_of(b)).then_with(|| a.id().cmp(&b.id())));
        Ok(members)
    }

    /// Current version of the entity any chain member belongs to
    ///
    /// Non-versioned kinds are returned as stored.
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if `id` does not exist
    pub async fn get_active(&self, id: &DocumentId) -> Result<Document, EngineError> {
        let document = self.repo.require(id).await?;
        if !EntityKind::of(&document)?.is_versioned() {
            return Ok(document);
        }
        let root = Self::root_of(&document).unwrap_or_else(|| id.clone());
        let members = self.members(&root).await?;
        self.resolve(&root, members).await
    }

    /// Member with version `n` of the chain `id` belongs to
    ///
    /// Forking from a reactivated older version can give two members the
    /// same number; the most recently created one is returned.
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if the chain has no such version
    pub async fn get_version(&self, id: &DocumentId, n: u64) -> Result<Document, EngineError> {
        self.list_versions(id)
            .await?
            .into_iter()
            .filter(|member| version_of(member) == n)
            .max_by(|a, b| {
                a.timestamp_field(fields::CREATED_AT)
                    .cmp(&b.timestamp_field(fields::CREATED_AT))
                    .then_with(|| a.id().cmp(&b.id()))
            })
            .ok_or_else(|| EngineError::NotFound(id.clone()))
    }

    /// Every member of the chain `id` belongs to, oldest first
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if `id` does not exist
    pub async fn list_versions(&self, id: &DocumentId) -> Result<Vec<Document>, EngineError> {
        let document = self.repo.require(id).await?;
        if !EntityKind::of(&document)?.is_versioned() {
            return Ok(vec![document]);
        }
        let root = Self::root_of(&document).unwrap_or_else(|| id.clone());
        self.members(&root).await
    }

    /// Persist `next` as a new version after `existing`, then retire `existing`
    ///
    /// `next` is the merged content; chain fields, `id` and `createdAt` are
    /// assigned here. The retirement is guarded on `existing` still being
    /// active: if another fork got there first, the new document is removed
    /// again and [`EngineError::Conflict`] is returned.
    ///
    /// # Errors
    /// [`EngineError::Conflict`] on a lost race; store failures
    pub async fn fork(&self, existing: &Document, mut next: Document, now: DateTime<Utc>) -> Result<Document, EngineError> {
        let previous_id = existing
            .id()
            .ok_or_else(|| EngineError::Validation("document has no id".to_string()))?;
        let root = Self::root_of(existing).unwrap_or_else(|| previous_id.clone());
        let version = version_of(existing) + 1;
        let id = DocumentId::generate();

        next.insert(fields::ID, id.to_value());
        next.insert(fields::VERSION, version.into());
        next.insert(fields::IS_ACTIVE, true.into());
        next.insert(fields::PREVIOUS_VERSION_ID, previous_id.to_value());
        next.insert(fields::ROOT_ID, root.to_value());
        next.insert(fields::CREATED_AT, timestamp_value(now));
        next.insert(fields::UPDATED_AT, timestamp_value(now));

        let store = self.repo.store();
        store.insert(next.clone()).await?;

        let retired = store
            .update_where(
                &previous_id,
                &not_retired(),
                &FieldUpdate::new().set(fields::IS_ACTIVE, false),
            )
            .await?;
        if retired.is_none() {
            warn!(root = %root, previous = %previous_id, discarded = %id, "fork lost race, rolling back");
            if let Err(e) = store.delete_hard(&id).await {
                warn!(id = %id, error = %e, "rollback of losing fork failed; read repair will resolve it");
            }
            return Err(EngineError::Conflict { root_id: root });
        }

        info!(root = %root, previous = %previous_id, id = %id, version, "forked new version");
        Ok(next)
    }

    /// Make `target` the active member of its chain
    ///
    /// Deactivates every other active member, then applies `activation`
    /// plus `isActive: true` to the target.
    ///
    /// # Errors
    /// [`EngineError::InvalidRequest`] for non-versioned kinds;
    /// [`EngineError::NotFound`]; store failures
    pub async fn activate(&self, target: &DocumentId, activation: FieldUpdate) -> Result<Document, EngineError> {
        let document = self.repo.require(target).await?;
        let kind = EntityKind::of(&document)?;
        if !kind.is_versioned() {
            return Err(EngineError::InvalidRequest(format!("{kind} has no version chain")));
        }
        let root = Self::root_of(&document).unwrap_or_else(|| target.clone());

        let store = self.repo.store();
        for member in self.members(&root).await? {
            let Some(member_id) = member.id() else { continue };
            if &member_id != target && is_active(&member) {
                store
                    .update_in_place(&member_id, &FieldUpdate::new().set(fields::IS_ACTIVE, false))
                    .await?;
            }
        }

        let activated = store
            .update_in_place(target, &activation.set(fields::IS_ACTIVE, true))
            .await?;
        info!(root = %root, id = %target, version = version_of(&activated), "activated version");
        self.repo.normalize(activated)
    }

    async fn resolve(&self, root: &DocumentId, members: Vec<Document>) -> Result<Document, EngineError> {
        let active: Vec<&Document> = members.iter().filter(|m| is_active(m)).collect();

        match active.len() {
            1 => Ok(active[0].clone()),
            0 => {
                let latest = members
                    .iter()
                    .max_by(|a, b| version_of(a).cmp(&version_of(b)).then_with(|| a.id().cmp(&b.id())))
                    .ok_or_else(|| EngineError::NotFound(root.clone()))?;
                warn!(root = %root, version = version_of(latest), "chain has no active version, serving latest read-only");
                Ok(latest.clone())
            }
            n => {
                let canonical = canonical_active(&active).ok_or_else(|| EngineError::NotFound(root.clone()))?;
                let keep = canonical.id();
                warn!(root = %root, active = n, keep = ?keep, "chain has several active versions");
                if self.repair_on_read {
                    self.retire_all_but(&active, keep.as_ref()).await;
                }
                Ok(canonical.clone())
            }
        }
    }

    async fn retire_all_but(&self, active: &[&Document], keep: Option<&DocumentId>) {
        let guard = not_retired();
        let retire = FieldUpdate::new().set(fields::IS_ACTIVE, false);
        for member in active {
            let Some(id) = member.id() else { continue };
            if Some(&id) == keep {
                continue;
            }
            match self.repo.store().update_where(&id, &guard, &retire).await {
                Ok(_) => info!(id = %id, "read repair deactivated stale version"),
                Err(e) => warn!(id = %id, error = %e, "read repair failed"),
            }
        }
    }
}

/// Chain-level `version`, 1 when absent
#[must_use]
pub fn version_of(document: &Document) -> u64 {
    document.u64_field(fields::VERSION).unwrap_or(1)
}

#[must_use]
pub fn is_active(document: &Document) -> bool {
    document.bool_field(fields::IS_ACTIVE).unwrap_or(false)
}

/// Guard for writes to a version that must still be in effect
///
/// Stored documents written before `isActive` existed lack the field and
/// read as active, so a missing value passes too.
#[must_use]
pub fn not_retired() -> Query {
    Query::new().is_in(fields::IS_ACTIVE, vec![Value::Bool(true), Value::Null])
}

/// Winner among several active members
///
/// Most recent `updatedAt`, then higher `version`, then higher id.
#[must_use]
pub fn canonical_active<'d>(active: &[&'d Document]) -> Option<&'d Document> {
    active.iter().copied().max_by(|a, b| compare_recency(a, b))
}

fn compare_recency(a: &Document, b: &Document) -> Ordering {
    a.timestamp_field(fields::UPDATED_AT)
        .cmp(&b.timestamp_field(fields::UPDATED_AT))
        .then_with(|| version_of(a).cmp(&version_of(b)))
        .then_with(|| a.id().cmp(&b.id()))
}

/// One document per chain: the active one, or the latest when none is
///
/// Used when listing children so every logical entity appears once.
#[must_use]
pub fn current_per_chain(documents: Vec<Document>) -> Vec<Document> {
    let mut chains: BTreeMap<DocumentId, Vec<Document>> = BTreeMap::new();
    for document in documents {
        if let Some(root) = VersionChain::root_of(&document) {
            chains.entry(root).or_default().push(document);
        }
    }

    chains
        .into_values()
        .filter_map(|members| {
            let active: Vec<&Document> = members.iter().filter(|m| is_active(m)).collect();
            let chosen = if active.is_empty() {
                members.iter().max_by(|a, b| version_of(a).cmp(&version_of(b)))
            } else {
                canonical_active(&active)
            };
            chosen.cloned()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::try_from_value(value).unwrap()
    }

    #[test]
    fn root_of_prefers_root_id() {
        assert_eq!(
            VersionChain::root_of(&doc(json!({"id": "v2", "rootId": "v1"}))),
            Some(DocumentId::new("v1"))
        );
        assert_eq!(
            VersionChain::root_of(&doc(json!({"id": "v1", "rootId": null}))),
            Some(DocumentId::new("v1"))
        );
    }

    #[test]
    fn canonical_prefers_recent_then_version() {
        let older = doc(json!({"id": "a", "version": 3, "updatedAt": "2024-01-01T00:00:00Z"}));
        let newer = doc(json!({"id": "b", "version": 2, "updatedAt": "2024-02-01T00:00:00Z"}));
        assert_eq!(canonical_active(&[&older, &newer]).and_then(Document::id), newer.id());

        let tie = doc(json!({"id": "c", "version": 4, "updatedAt": "2024-02-01T00:00:00Z"}));
        assert_eq!(canonical_active(&[&newer, &tie]).and_then(Document::id), tie.id());
    }

    #[test]
    fn current_per_chain_keeps_one_per_root() {
        let docs = vec![
            doc(json!({"id": "a1", "version": 1, "isActive": false})),
            doc(json!({"id": "a2", "rootId": "a1", "version": 2, "isActive": true})),
            doc(json!({"id": "b1", "version": 1, "isActive": false})),
            doc(json!({"id": "b2", "rootId": "b1", "version": 2, "isActive": false})),
        ];
        let ids: Vec<_> = current_per_chain(docs).iter().filter_map(Document::id).collect();
        assert_eq!(ids, vec![DocumentId::new("a2"), DocumentId::new("b2")]);
    }
}
