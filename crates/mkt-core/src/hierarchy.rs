//! Hierarchy resolver
//!
//! Walks `parentId` references. Children may point at any member of a
//! versioned parent's chain, so downward queries match on every member id
//! and collapse versioned children to one document per chain. Upward walks
//! always move to the parent's active version.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use mkt_document::timestamp::timestamp_value;
use mkt_document::{fields, Document, DocumentId};
use serde_json::Value;
use tracing::debug;

use crate::error::EngineError;
use crate::model::EntityKind;
use crate::repository::Repository;
use crate::store::Query;
use crate::versioning::{current_per_chain, VersionChain};

/// Optional narrowing for [`Hierarchy::content_under`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFilter {
    /// Exact lifecycle state
    pub state: Option<String>,
    /// `scheduledFor` at or after
    pub scheduled_from: Option<DateTime<Utc>>,
    /// `scheduledFor` strictly before
    pub scheduled_until: Option<DateTime<Utc>>,
}

impl ContentFilter {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    #[must_use]
    pub fn scheduled_between(mut self, from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.scheduled_from = from;
        self.scheduled_until = until;
        self
    }

    fn apply(&self, mut query: Query) -> Query {
        if let Some(state) = &self.state {
            query = query.eq(fields::STATE, state.as_str());
        }
        if self.scheduled_from.is_some() || self.scheduled_until.is_some() {
            query = query.range(
                "scheduledFor",
                self.scheduled_from.map(timestamp_value),
                self.scheduled_until.map(timestamp_value),
            );
        }
        query
    }
}

/// Read-only traversal of the entity tree
#[derive(Clone, Copy)]
pub struct Hierarchy<'a> {
    repo: &'a Repository,
    chain: VersionChain<'a>,
    max_depth: usize,
}

impl<'a> Hierarchy<'a> {
    #[must_use]
    pub fn new(repo: &'a Repository, chain: VersionChain<'a>, max_depth: usize) -> Self {
        Self { repo, chain, max_depth }
    }

    /// Current children of `parent` with the given kind
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if `parent` does not exist;
    /// [`EngineError::InvalidRequest`] if `kind` cannot be a child of it
    pub async fn children(&self, parent: &DocumentId, kind: EntityKind) -> Result<Vec<Document>, EngineError> {
        let parent_doc = self.repo.require(parent).await?;
        let parent_kind = EntityKind::of(&parent_doc)?;
        if !parent_kind.child_kinds().contains(&kind) {
            return Err(EngineError::InvalidRequest(format!("{kind} cannot be a child of {parent_kind}")));
        }
        self.children_matching(&parent_doc, kind).await
    }

    /// Every current content piece under `id`, at any depth
    ///
    /// For a content id, the content itself is returned if it matches.
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if `id` does not exist
    pub async fn content_under(&self, id: &DocumentId, filter: &ContentFilter) -> Result<Vec<Document>, EngineError> {
        let start = self.chain.get_active(id).await?;
        if EntityKind::of(&start)? == EntityKind::Content {
            let matches = filter.apply(Query::new()).matches(&start);
            return Ok(if matches { vec![start] } else { Vec::new() });
        }

        // Filters apply after collapsing chains so a stale version never
        // stands in for its active successor.
        let wanted = filter.apply(Query::new());
        let mut found = Vec::new();
        let mut frontier = vec![start];
        for depth in 0..=self.max_depth {
            if frontier.is_empty() {
                break;
            }
            debug!(depth, frontier = frontier.len(), "descending hierarchy");
            let mut lookups = Vec::new();
            for node in &frontier {
                for child_kind in EntityKind::of(node)?.child_kinds() {
                    lookups.push((node, *child_kind));
                }
            }
            let batches = try_join_all(
                lookups
                    .iter()
                    .map(|(node, child_kind)| self.children_matching(node, *child_kind)),
            )
            .await?;

            let mut next = Vec::new();
            for ((_, child_kind), children) in lookups.iter().zip(batches) {
                if *child_kind == EntityKind::Content {
                    found.extend(children.into_iter().filter(|c| wanted.matches(c)));
                } else {
                    next.extend(children);
                }
            }
            frontier = next;
        }
        if !frontier.is_empty() {
            return Err(EngineError::ReferentialIntegrity(format!(
                "hierarchy under {id} is deeper than {}",
                self.max_depth
            )));
        }
        Ok(found)
    }

    /// Active parent of a document, `None` for a brand
    ///
    /// # Errors
    /// [`EngineError::ReferentialIntegrity`] if the parent is missing or of
    /// the wrong kind
    pub async fn parent_of(&self, document: &Document) -> Result<Option<Document>, EngineError> {
        let kind = EntityKind::of(document)?;
        if kind.parent_kinds().is_empty() {
            return Ok(None);
        }
        let parent_id = document.id_field(fields::PARENT_ID).ok_or_else(|| {
            EngineError::ReferentialIntegrity(format!("{kind} {} has no parentId", describe(document)))
        })?;
        self.check_parent(kind, &parent_id).await.map(Some)
    }

    /// Validate that `parent_id` can parent a `kind`, returning its active version
    ///
    /// # Errors
    /// [`EngineError::ReferentialIntegrity`] if the parent is missing or of
    /// the wrong kind
    pub async fn check_parent(&self, kind: EntityKind, parent_id: &DocumentId) -> Result<Document, EngineError> {
        let parent = match self.chain.get_active(parent_id).await {
            Ok(parent) => parent,
            Err(EngineError::NotFound(_)) => {
                return Err(EngineError::ReferentialIntegrity(format!(
                    "{kind} references missing parent {parent_id}"
                )))
            }
            Err(e) => return Err(e),
        };
        let parent_kind = EntityKind::of(&parent)?;
        if !kind.parent_kinds().contains(&parent_kind) {
            return Err(EngineError::ReferentialIntegrity(format!(
                "{kind} cannot have parent {parent_id} of kind {parent_kind}"
            )));
        }
        Ok(parent)
    }

    /// Parents of `id` from nearest to the brand
    ///
    /// # Errors
    /// [`EngineError::ReferentialIntegrity`] on a dangling reference, a
    /// cycle, or a chain longer than the configured depth
    pub async fn ancestors(&self, id: &DocumentId) -> Result<Vec<Document>, EngineError> {
        let mut current = self.chain.get_active(id).await?;
        let mut seen: HashSet<DocumentId> = HashSet::new();
        if let Some(root) = VersionChain::root_of(&current) {
            seen.insert(root);
        }

        let mut ancestors = Vec::new();
        while let Some(parent) = self.parent_of(&current).await? {
            if ancestors.len() >= self.max_depth {
                return Err(EngineError::ReferentialIntegrity(format!(
                    "ancestry of {id} exceeds depth {}",
                    self.max_depth
                )));
            }
            let root = VersionChain::root_of(&parent)
                .ok_or_else(|| EngineError::ReferentialIntegrity("ancestor without id".to_string()))?;
            if !seen.insert(root.clone()) {
                return Err(EngineError::ReferentialIntegrity(format!("cycle through {root} above {id}")));
            }
            ancestors.push(parent.clone());
            current = parent;
        }
        Ok(ancestors)
    }

    /// Brand that owns `id`; a brand owns itself
    ///
    /// # Errors
    /// [`EngineError::ReferentialIntegrity`] if the walk does not end at a brand
    pub async fn brand_for(&self, id: &DocumentId) -> Result<Document, EngineError> {
        let document = self.chain.get_active(id).await?;
        if EntityKind::of(&document)? == EntityKind::Brand {
            return Ok(document);
        }
        let ancestors = self.ancestors(id).await?;
        match ancestors.last() {
            Some(top) if EntityKind::of(top)? == EntityKind::Brand => Ok(top.clone()),
            _ => Err(EngineError::ReferentialIntegrity(format!("{id} does not resolve to a brand"))),
        }
    }

    async fn children_matching(&self, parent: &Document, kind: EntityKind) -> Result<Vec<Document>, EngineError> {
        let parent_ids: Vec<Value> = if EntityKind::of(parent)?.is_versioned() {
            let root = VersionChain::root_of(parent)
                .ok_or_else(|| EngineError::Validation("parent has no id".to_string()))?;
            self.chain
                .members(&root)
                .await?
                .iter()
                .filter_map(Document::id)
                .map(|id| id.to_value())
                .collect()
        } else {
            parent.id().map(|id| id.to_value()).into_iter().collect()
        };

        let query = Query::new()
            .eq(fields::KIND, kind.as_str())
            .is_in(fields::PARENT_ID, parent_ids);
        let children = self.repo.find(&query).await?;
        Ok(if kind.is_versioned() {
            current_per_chain(children)
        } else {
            children
        })
    }
}

fn describe(document: &Document) -> String {
    document.id().map_or_else(|| "<no id>".to_string(), |id| id.to_string())
}
