//! Caching primitives for record data
//!
//! Provides the session-scoped record store with per-key freshness,
//! in-flight request coalescing and generation-checked write-back.

mod key;
mod store;

pub use key::{CacheKey, CachedValue, KeyScope};
pub use store::{CacheEntry, RecordStore, StoreStats};

/// Record store as used by a session
pub type SessionStore = RecordStore<CacheKey, CachedValue>;
