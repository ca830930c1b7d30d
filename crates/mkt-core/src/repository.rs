//! Normalizing read access to the store
//!
//! Every document leaving the store passes through the [`Normalizer`]
//! before any other component sees it.

use std::sync::Arc;

use mkt_document::{Document, DocumentId, NormalizeError, Normalizer, RepairPass, SchemaError};
use tracing::debug;

use crate::error::EngineError;
use crate::model::EntityKind;
use crate::store::{DocumentStore, Query};

/// Store handle plus the read-time repair applied to everything it returns
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
    normalizer: Normalizer,
}

impl Repository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, normalizer: Normalizer) -> Self {
        Self { store, normalizer }
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Repair a raw stored document against its kind's schema
    ///
    /// # Errors
    /// Returns [`EngineError::CorruptDocument`] if the kind is unknown or
    /// every repair pass fails
    pub fn normalize(&self, raw: Document) -> Result<Document, EngineError> {
        let kind = EntityKind::of(&raw).map_err(|e| {
            EngineError::CorruptDocument(NormalizeError::CorruptDocument {
                schema: "document".to_string(),
                id: raw.id().map_or_else(|| "<unknown>".to_string(), |id| id.to_string()),
                last_error: SchemaError::new("document", e.to_string()),
            })
        })?;
        let normalized = self.normalizer.normalize(raw.into_map(), kind.schema())?;
        if normalized.pass != RepairPass::AsIs {
            debug!(kind = %kind, pass = ?normalized.pass, "stored document needed repair");
        }
        Ok(normalized.document)
    }

    /// Fetch and normalize one document
    ///
    /// # Errors
    /// Store failures and [`EngineError::CorruptDocument`]
    pub async fn load(&self, id: &DocumentId) -> Result<Option<Document>, EngineError> {
        match self.store.get(id).await? {
            Some(raw) => self.normalize(raw).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`load`](Self::load) but a missing document is an error
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if there is no document with this id
    pub async fn require(&self, id: &DocumentId) -> Result<Document, EngineError> {
        self.load(id).await?.ok_or_else(|| EngineError::NotFound(id.clone()))
    }

    /// Find and normalize every match
    ///
    /// # Errors
    /// Store failures and [`EngineError::CorruptDocument`]
    pub async fn find(&self, query: &Query) -> Result<Vec<Document>, EngineError> {
        self.store
            .find(query)
            .await?
            .into_iter()
            .map(|raw| self.normalize(raw))
            .collect()
    }
}
