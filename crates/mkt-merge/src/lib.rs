//! Structural merge engine
//!
//! Merges partial updates into nested documents field by field, and arrays
//! of objects element by element on a declared identity field.
//!
//! # Core Concepts
//!
//! - [`Patch`]: partial update with explicit `Keep` / `Set` / `Clear` per field
//! - [`KeyedArrays`]: per-entity declarations of identity fields for arrays
//! - [`merge`]: pure, deterministic application of a patch to a document
//!
//! # Example
//!
//! ```rust,ignore
//! use mkt_merge::{merge, KeyedArrays, Patch};
//!
//! let arrays = KeyedArrays::new().with("goals", "type");
//! let patch = Patch::from_json(json!({"goals": [{"type": "A", "priority": 9}]}))?;
//! let merged = merge(&existing, &patch, &arrays);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod engine;
mod keyed;
mod patch;

pub use engine::{merge, merge_json};
pub use keyed::KeyedArrays;
pub use patch::{FieldPatch, Patch, PatchError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
