//! Boundary with the records API
//!
//! The backend stores records and decides who may review them; this crate
//! only issues commands and reads results back. `RecordBackend` is the seam:
//! `HttpBackend` talks to the real API, tests plug in an in-memory fake.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpBackend;

use crate::error::Result;
use crate::model::{Record, RecordKind, RecordPage};
use async_trait::async_trait;

/// Commands and queries the records API answers.
///
/// Commands return once the backend has committed them. Errors use the
/// crate taxonomy: `NotFound`, `Conflict`, `Validation`, `Network`, `Server`.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// One page of a kind's collection (pages are 1-based)
    async fn list(&self, kind: RecordKind, page: u32, page_size: u32) -> Result<RecordPage>;

    /// A single record
    async fn get(&self, kind: RecordKind, id: &str) -> Result<Record>;

    /// Mark one kontiki of a record as verified
    async fn verify_sub_unit(
        &self,
        kind: RecordKind,
        record_id: &str,
        kontiki_id: &str,
    ) -> Result<()>;

    /// Reject one kontiki of a record with a note
    async fn reject_sub_unit(
        &self,
        kind: RecordKind,
        record_id: &str,
        kontiki_id: &str,
        note: &str,
    ) -> Result<()>;

    /// Verify a record reviewed as a whole
    async fn verify_record(&self, kind: RecordKind, id: &str) -> Result<()>;

    /// Reject a record reviewed as a whole
    async fn reject_record(&self, kind: RecordKind, id: &str, note: &str) -> Result<()>;

    async fn create(&self, kind: RecordKind, payload: &serde_json::Value) -> Result<Record>;

    async fn update(
        &self,
        kind: RecordKind,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<Record>;

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<()>;
}
