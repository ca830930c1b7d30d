//! In-process store backed by a concurrent map

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mkt_document::{Document, DocumentId};

use super::{DocumentStore, FieldUpdate, Query, StoreError};

/// Concurrent in-memory [`DocumentStore`]
///
/// Per-document writes are atomic, so conditional updates race correctly
/// across tasks. Used by tests and the simulator.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: DashMap<DocumentId, Document>,
}

impl InMemoryStore {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Every stored document, ordered by id
    #[must_use]
    pub fn snapshot(&self) -> Vec<Document> {
        let mut all: Vec<_> = self.documents.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.id().cmp(&b.id()));
        all
    }

    /// Write a raw document, bypassing every engine rule
    ///
    /// Seeds legacy or damaged documents for repair tests.
    pub fn put_raw(&self, document: Document) -> Result<(), StoreError> {
        let id = document.id().ok_or(StoreError::MissingId)?;
        self.documents.insert(id, document);
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.get(id).map(|d| d.value().clone()))
    }

    async fn find(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut found: Vec<(DocumentId, Document)> = self
            .documents
            .iter()
            .filter(|e| query.matches(e.value()))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found.into_iter().map(|(_, d)| d).collect())
    }

    async fn insert(&self, document: Document) -> Result<(), StoreError> {
        let id = document.id().ok_or(StoreError::MissingId)?;
        match self.documents.entry(id) {
            Entry::Occupied(entry) => Err(StoreError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(document);
                Ok(())
            }
        }
    }

    async fn update_in_place(&self, id: &DocumentId, update: &FieldUpdate) -> Result<Document, StoreError> {
        let mut entry = self
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::Missing(id.clone()))?;
        update.apply(entry.value_mut());
        Ok(entry.value().clone())
    }

    async fn update_where(
        &self,
        id: &DocumentId,
        guard: &Query,
        update: &FieldUpdate,
    ) -> Result<Option<Document>, StoreError> {
        let Some(mut entry) = self.documents.get_mut(id) else {
            return Ok(None);
        };
        if !guard.matches(entry.value()) {
            return Ok(None);
        }
        update.apply(entry.value_mut());
        Ok(Some(entry.value().clone()))
    }

    async fn delete_hard(&self, id: &DocumentId) -> Result<bool, StoreError> {
        Ok(self.documents.remove(id).is_some())
    }
}
