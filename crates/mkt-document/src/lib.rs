//! Marketing document layer
//!
//! Loosely-typed stored documents and the read-time repair that makes them
//! safe to hand to strict schema validation.
//!
//! # Core Concepts
//!
//! - [`Document`]: JSON object as it lives in the store
//! - [`DocumentId`]: store key, generated as a ULID on creation
//! - [`FieldPath`]: dotted addressing of nested fields
//! - [`Normalizer`]: total coercion pass plus three-attempt schema repair
//! - [`DocumentSchema`]: seam through which entity models plug in validation
//!
//! # Example
//!
//! ```rust,ignore
//! use mkt_document::{Normalizer, NormalizerConfig};
//!
//! let normalizer = Normalizer::new(NormalizerConfig::default());
//! let normalized = normalizer.normalize(raw, &campaign_schema)?;
//! println!("repaired in pass {:?}", normalized.pass);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod document;
mod normalize;
mod path;
pub mod timestamp;

pub use document::{fields, Document, DocumentError, DocumentId};
pub use normalize::{
    is_clear_sentinel, strip_nulls, DatedArray, DocumentSchema, InvalidDate, NormalizeError, Normalized,
    Normalizer, NormalizerConfig, RepairPass, SchemaError, CLEAR_SENTINEL,
};
pub use path::{FieldPath, PathError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
