//! MKT Core - marketing entity engine
//!
//! Owns everything that changes a marketing document after it is created:
//! - Lifecycle state machines per entity kind
//! - Mutate-in-place vs fork-a-version updates with an active pointer
//! - Structural merging of partial updates
//! - Walking the Brand → Campaign → MasterPlan → MicroPlan → Content tree
//! - Brand guideline checks before content is marked ready
//!
//! # Example
//!
//! ```rust,ignore
//! use mkt_core::{Engine, EngineConfig, EntityKind, InMemoryStore, UpdateOptions};
//!
//! # async fn example() -> Result<(), mkt_core::EngineError> {
//! let engine = Engine::new(Arc::new(InMemoryStore::new()), EngineConfig::default());
//!
//! let brand = engine.create(EntityKind::Brand, json!({"name": "Acme"}), "ana").await?;
//! let campaign = engine.create(EntityKind::Campaign, campaign_payload(&brand), "ana").await?;
//!
//! let v2 = engine
//!     .update(&campaign_id, json!({"name": "Summer"}), UpdateOptions::fork("ana"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod guidelines;
pub mod hierarchy;
pub mod lifecycle;
pub mod model;
pub mod repository;
pub mod store;
pub mod versioning;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, UpdateMode};
pub use engine::{Engine, UpdateOptions};
pub use error::EngineError;
pub use hierarchy::{ContentFilter, Hierarchy};
pub use lifecycle::{CampaignState, ContentState, LifecycleState, PlanState};
pub use model::{decode, EntityKind};
pub use repository::Repository;
pub use store::{DocumentStore, FieldUpdate, Filter, InMemoryStore, Query, StoreError};
pub use versioning::VersionChain;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the engine
    pub use crate::{
        ContentFilter, DocumentStore, Engine, EngineConfig, EngineError, EntityKind,
        InMemoryStore, UpdateMode, UpdateOptions,
    };
    pub use mkt_document::{Document, DocumentId};
    pub use mkt_merge::Patch;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
