//! Biochar SDK - Record Verification and Cache Sync
//!
//! Client-side core for reviewing biochar production and measurement records.
//!
//! # Architecture
//!
//! Everything hangs off a `Session`, created at login and dropped at logout:
//! - **RecordStore**: keyed cache with stale-while-revalidate and in-flight
//!   request coalescing
//! - **MutationCoordinator**: verify/reject/create/update/delete, resolving
//!   only after the store reflects the change
//! - **Verification**: pure kontiki transitions and record-level aggregation
//! - **RefreshPolicy**: per-kind polling and focus revalidation
//!
//! Views read through `Query` handles and never mutate the store directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use biochar_sdk::{RecordKind, Session, SyncConfig};
//!
//! let session = Session::connect(SyncConfig::from_env())?;
//! let refresh = session.start_refresh();
//!
//! let mut production = session.use_collection(RecordKind::Production, 1);
//! let state = production.load().await;
//!
//! // Resolves once the refetched record is in the store
//! session.reject(RecordKind::Production, "rec-1", "k-3", "poor photo quality").await?;
//!
//! refresh.focus();
//! refresh.shutdown().await;
//! ```

// Record shapes
pub mod model;

// Kontiki state machine and aggregation
pub mod verification;

// Caching primitives
pub mod cache;

// Backend boundary and HTTP transport
pub mod backend;

// Session, queries and mutations
pub mod client;

// Background revalidation
pub mod refresh;

// Configuration
pub mod config;

// Error types
pub mod error;

// Re-export model types
pub use model::{PageMeta, Record, RecordBody, RecordKind, RecordPage, SubUnit};

// Re-export verification types
pub use verification::{
    aggregate_status, transition, RecordStatus, Review, Reviewer, UnitStatus, VerificationEvent,
};

// Re-export cache types
pub use cache::{CacheEntry, CacheKey, CachedValue, RecordStore, SessionStore, StoreStats};

// Re-export backend types
pub use backend::RecordBackend;
#[cfg(feature = "http")]
pub use backend::HttpBackend;

// Re-export client types
pub use client::{MutationCoordinator, Query, QueryState, Session};

// Re-export refresh types
pub use refresh::{RefreshHandle, RefreshPolicy, RefreshReport, RefreshSignal};

// Re-export config types
pub use config::{RefreshConfig, SyncConfig};

// Re-export error types
pub use error::{Result, SdkError};
