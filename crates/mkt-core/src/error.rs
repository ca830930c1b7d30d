//! Error types for the entity engine
//!
//! Every failure reaches the caller as a typed [`EngineError`]. Only the
//! normalizer retries internally, and it surfaces
//! [`EngineError::CorruptDocument`] once its repair passes are exhausted.

use mkt_document::{DocumentId, InvalidDate, NormalizeError};
use mkt_merge::PatchError;

use crate::model::EntityKind;
use crate::store::StoreError;

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Stored document failed every repair pass
    #[error(transparent)]
    CorruptDocument(#[from] NormalizeError),

    /// Requested state is not reachable from the current one
    #[error(
        "invalid {kind} transition from `{from}` to `{to}` (allowed from `{from}`: [{}])",
        .allowed.join(", ")
    )]
    InvalidTransition {
        kind: EntityKind,
        from: String,
        to: String,
        /// Every state reachable from `from`
        allowed: Vec<String>,
    },

    /// Content body contains terms its brand avoids
    #[error("content {content_id} uses avoided terms: {}", .terms.join(", "))]
    GuidelineViolation {
        content_id: DocumentId,
        terms: Vec<String>,
    },

    /// No document for the id or root id
    #[error("document not found: {0}")]
    NotFound(DocumentId),

    /// Parent reference is missing or of the wrong kind
    #[error("referential integrity: {0}")]
    ReferentialIntegrity(String),

    /// A concurrent fork of the same chain won
    #[error("version chain {root_id} was forked concurrently")]
    Conflict { root_id: DocumentId },

    /// Write-time schema enforcement rejected a document
    #[error("validation failed: {0}")]
    Validation(String),

    /// Operation does not apply to this entity kind
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Persistence port failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Whether the caller can fix the request and retry
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::CorruptDocument(_) | Self::Store(_) => false,
            Self::InvalidTransition { .. }
            | Self::GuidelineViolation { .. }
            | Self::NotFound(_)
            | Self::ReferentialIntegrity(_)
            | Self::Conflict { .. }
            | Self::Validation(_)
            | Self::InvalidRequest(_) => true,
        }
    }

    /// Whether retrying the identical request may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Store(StoreError::Unavailable(_)))
    }

    pub(crate) fn invalid_transition(kind: EntityKind, from: &str, to: &str, allowed: &[&str]) -> Self {
        Self::InvalidTransition {
            kind,
            from: from.to_string(),
            to: to.to_string(),
            allowed: allowed.iter().map(ToString::to_string).collect(),
        }
    }
}

impl From<PatchError> for EngineError {
    fn from(value: PatchError) -> Self {
        Self::InvalidRequest(value.to_string())
    }
}

impl From<InvalidDate> for EngineError {
    fn from(value: InvalidDate) -> Self {
        Self::Validation(value.to_string())
    }
}
