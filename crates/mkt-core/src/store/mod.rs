//! Persistence port
//!
//! The engine treats storage as a generic document store: get by id,
//! filtered find, insert, field-level updates and hard delete. Filters
//! cover equality, membership and ranges on top-level fields, which is all
//! the engine needs (`rootId`, `parentId`, `state`, `isActive`, dates).

mod memory;

use std::cmp::Ordering;

use mkt_document::timestamp::parse_timestamp;
use mkt_document::{Document, DocumentId};
use serde_json::{Map, Value};

pub use memory::InMemoryStore;

/// Document store the engine persists through
///
/// Each call touches one document or reads a snapshot; there are no
/// multi-document transactions. [`update_where`](Self::update_where) must
/// check its guard and write atomically for that one document.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document
    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, StoreError>;

    /// Every document matching all filters, ordered by id
    async fn find(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Insert a new document
    ///
    /// # Errors
    /// [`StoreError::Duplicate`] if the id is taken
    async fn insert(&self, document: Document) -> Result<(), StoreError>;

    /// Apply field changes to an existing document, returning the result
    ///
    /// # Errors
    /// [`StoreError::Missing`] if there is no such document
    async fn update_in_place(&self, id: &DocumentId, update: &FieldUpdate) -> Result<Document, StoreError>;

    /// Apply field changes only if the document currently matches `guard`
    ///
    /// Returns `None` when the document is missing or the guard fails.
    async fn update_where(
        &self,
        id: &DocumentId,
        guard: &Query,
        update: &FieldUpdate,
    ) -> Result<Option<Document>, StoreError>;

    /// Remove a document; `false` if it did not exist
    async fn delete_hard(&self, id: &DocumentId) -> Result<bool, StoreError>;
}

/// Persistence failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Insert collided with an existing id
    #[error("document {0} already exists")]
    Duplicate(DocumentId),

    /// Update targeted a document that does not exist
    #[error("document {0} does not exist")]
    Missing(DocumentId),

    /// Document cannot be stored without an `id`
    #[error("document has no id")]
    MissingId,

    /// Backend could not serve the call
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One condition on a top-level field
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals value; a missing field equals `null`
    Eq { field: String, value: Value },
    /// Field equals one of the values
    In { field: String, values: Vec<Value> },
    /// Field lies in `[from, until)`; either bound may be open
    ///
    /// Timestamps compare as instants, numbers numerically, strings
    /// lexicographically. Missing or incomparable values never match.
    Range {
        field: String,
        from: Option<Value>,
        until: Option<Value>,
    },
}

impl Filter {
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::Eq { field, value } => document.get(field).unwrap_or(&Value::Null) == value,
            Self::In { field, values } => {
                let actual = document.get(field).unwrap_or(&Value::Null);
                values.iter().any(|v| v == actual)
            }
            Self::Range { field, from, until } => {
                let Some(actual) = document.get(field).filter(|v| !v.is_null()) else {
                    return false;
                };
                let above = from
                    .as_ref()
                    .map_or(true, |lo| matches!(compare(actual, lo), Some(Ordering::Greater | Ordering::Equal)));
                let below = until
                    .as_ref()
                    .map_or(true, |hi| matches!(compare(actual, hi), Some(Ordering::Less)));
                above && below
            }
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_timestamp(a), parse_timestamp(b)) {
            (Some(ta), Some(tb)) => Some(ta.cmp(&tb)),
            _ => Some(x.cmp(y)),
        },
        _ => None,
    }
}

/// Conjunction of filters; an empty query matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<Filter>,
}

impl Query {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn is_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filters.push(Filter::In {
            field: field.into(),
            values,
        });
        self
    }

    #[must_use]
    pub fn range(mut self, field: impl Into<String>, from: Option<Value>, until: Option<Value>) -> Self {
        self.filters.push(Filter::Range {
            field: field.into(),
            from,
            until,
        });
        self
    }

    #[inline]
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(document))
    }
}

/// Top-level field changes for one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdate {
    set: Map<String, Value>,
    unset: Vec<String>,
}

impl FieldUpdate {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.unset.push(field.into());
        self
    }

    /// Changes that turn `old` into `new`
    #[must_use]
    pub fn diff(old: &Document, new: &Document) -> Self {
        let set = new
            .as_map()
            .iter()
            .filter(|(key, value)| old.get(key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let unset = old
            .as_map()
            .keys()
            .filter(|key| !new.contains_key(key))
            .cloned()
            .collect();
        Self { set, unset }
    }

    /// Drop any change to `field`
    #[must_use]
    pub fn without(mut self, field: &str) -> Self {
        self.set.remove(field);
        self.unset.retain(|f| f != field);
        self
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn fields_set(&self) -> &Map<String, Value> {
        &self.set
    }

    #[inline]
    #[must_use]
    pub fn fields_unset(&self) -> &[String] {
        &self.unset
    }

    /// Apply to a document; `id` is never changed
    pub fn apply(&self, document: &mut Document) {
        for key in &self.unset {
            if key != mkt_document::fields::ID {
                document.remove(key);
            }
        }
        for (key, value) in &self.set {
            if key != mkt_document::fields::ID {
                document.insert(key.clone(), value.clone());
            }
        }
    }
}
