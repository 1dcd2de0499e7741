//! State-changing operations and the cache invalidation they imply
//!
//! Every command follows the same contract: validate locally, send the
//! command, and only on success mark the affected keys stale and await a
//! refetch. The future resolves after the store holds the new state, so a
//! caller re-reading the record right away sees its own change. Nothing is
//! flipped optimistically.

use super::loader::KeyLoader;
use crate::backend::RecordBackend;
use crate::cache::{CacheKey, SessionStore};
use crate::config::SyncConfig;
use crate::error::{Result, SdkError};
use crate::model::{Record, RecordKind};
use crate::verification::{transition, UnitStatus, VerificationEvent};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Executes reviewer decisions and record edits against the backend.
#[derive(Clone)]
pub struct MutationCoordinator {
    store: Arc<SessionStore>,
    loader: KeyLoader,
    config: Arc<SyncConfig>,
}

impl MutationCoordinator {
    pub fn new(
        store: Arc<SessionStore>,
        backend: Arc<dyn RecordBackend>,
        config: Arc<SyncConfig>,
    ) -> Self {
        Self {
            store,
            loader: KeyLoader::new(backend),
            config,
        }
    }

    fn backend(&self) -> &Arc<dyn RecordBackend> {
        self.loader.backend()
    }

    // =========================================================================
    // Kontiki review
    // =========================================================================

    /// Verify one kontiki of a production or bulk-density record.
    ///
    /// Refused locally with `Conflict` if the kontiki is already VERIFIED.
    pub async fn submit_verify(
        &self,
        kind: RecordKind,
        record_id: &str,
        kontiki_id: &str,
    ) -> Result<()> {
        require_sub_units(kind)?;
        self.check_sub_unit(kind, record_id, kontiki_id, &VerificationEvent::Verify)
            .await?;

        self.commit_review(
            kind,
            record_id,
            self.backend().verify_sub_unit(kind, record_id, kontiki_id),
        )
        .await?;

        info!(kind = %kind, record_id, kontiki_id, "Kontiki verified");
        Ok(())
    }

    /// Reject one kontiki with a mandatory note.
    pub async fn submit_reject(
        &self,
        kind: RecordKind,
        record_id: &str,
        kontiki_id: &str,
        note: &str,
    ) -> Result<()> {
        let event = VerificationEvent::reject(note.trim())?;
        require_sub_units(kind)?;
        self.check_sub_unit(kind, record_id, kontiki_id, &event).await?;

        self.commit_review(
            kind,
            record_id,
            self.backend().reject_sub_unit(kind, record_id, kontiki_id, note.trim()),
        )
        .await?;

        info!(kind = %kind, record_id, kontiki_id, "Kontiki rejected");
        Ok(())
    }

    // =========================================================================
    // Whole-record review
    // =========================================================================

    /// Verify a sourcing, sampling or activation record.
    pub async fn verify_record(&self, kind: RecordKind, record_id: &str) -> Result<()> {
        require_whole_record(kind)?;
        self.check_record(kind, record_id, &VerificationEvent::Verify).await?;

        self.commit_review(kind, record_id, self.backend().verify_record(kind, record_id))
            .await?;

        info!(kind = %kind, record_id, "Record verified");
        Ok(())
    }

    /// Reject a sourcing, sampling or activation record.
    pub async fn reject_record(&self, kind: RecordKind, record_id: &str, note: &str) -> Result<()> {
        let event = VerificationEvent::reject(note.trim())?;
        require_whole_record(kind)?;
        self.check_record(kind, record_id, &event).await?;

        self.commit_review(
            kind,
            record_id,
            self.backend().reject_record(kind, record_id, note.trim()),
        )
        .await?;

        info!(kind = %kind, record_id, "Record rejected");
        Ok(())
    }

    // =========================================================================
    // Record edits
    // =========================================================================

    /// Create a record; resolves after every cached page of the kind has
    /// been refetched.
    pub async fn create(&self, kind: RecordKind, payload: &serde_json::Value) -> Result<Record> {
        let record = self.backend().create(kind, payload).await?;

        let collections = self.collection_keys(kind);
        let mut keys = collections.clone();
        keys.push(CacheKey::record(kind, record.id.as_str()));
        self.store.invalidate_many(keys.iter());
        self.refetch_all(&collections).await?;

        info!(kind = %kind, record_id = %record.id, "Record created");
        Ok(record)
    }

    /// Update a record; resolves with the refetched record.
    pub async fn update(
        &self,
        kind: RecordKind,
        record_id: &str,
        payload: &serde_json::Value,
    ) -> Result<Record> {
        self.backend().update(kind, record_id, payload).await?;

        self.store.invalidate_many(self.affected_keys(kind, record_id).iter());
        let record = self.refetch_record(kind, record_id).await?;

        info!(kind = %kind, record_id, "Record updated");
        Ok(record)
    }

    /// Delete a record; resolves after every cached page of the kind has
    /// been refetched. The detail key stays stale.
    pub async fn delete(&self, kind: RecordKind, record_id: &str) -> Result<()> {
        self.backend().delete(kind, record_id).await?;

        self.store.invalidate_many(self.affected_keys(kind, record_id).iter());
        self.refetch_all(&self.collection_keys(kind)).await?;

        info!(kind = %kind, record_id, "Record deleted");
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Current view of a record, from cache when fresh enough
    async fn current_record(&self, kind: RecordKind, record_id: &str) -> Result<Record> {
        let key = CacheKey::record(kind, record_id);
        let max_age = Some(self.config.refresh_for(kind).stale_after());
        self.store
            .fetch(&key, max_age, || self.loader.load(&key))
            .await?
            .into_record()
    }

    async fn check_sub_unit(
        &self,
        kind: RecordKind,
        record_id: &str,
        kontiki_id: &str,
        event: &VerificationEvent,
    ) -> Result<UnitStatus> {
        let record = self.current_record(kind, record_id).await?;
        let unit = record.sub_unit(kontiki_id).ok_or_else(|| {
            SdkError::NotFound(format!("kontiki {} on record {}", kontiki_id, record_id))
        })?;
        transition(unit.status(), event)
    }

    async fn check_record(
        &self,
        kind: RecordKind,
        record_id: &str,
        event: &VerificationEvent,
    ) -> Result<UnitStatus> {
        let record = self.current_record(kind, record_id).await?;
        let review = record.review().ok_or_else(|| {
            SdkError::InvalidRecord {
                id: record_id.to_string(),
                reason: "record carries no review status".into(),
            }
        })?;
        transition(review.status, event)
    }

    /// Send a review command and bring the cache up to date with it.
    ///
    /// A backend `Conflict` means the cache disagrees with the server, so the
    /// record's keys are marked stale (without refetching) before the error
    /// is returned. Any other failure leaves the cache untouched.
    async fn commit_review<Fut>(
        &self,
        kind: RecordKind,
        record_id: &str,
        command: Fut,
    ) -> Result<()>
    where
        Fut: Future<Output = Result<()>>,
    {
        match command.await {
            Ok(()) => {}
            Err(SdkError::Conflict(message)) => {
                warn!(kind = %kind, record_id, message = %message, "Backend refused transition");
                self.store.invalidate_many(self.affected_keys(kind, record_id).iter());
                return Err(SdkError::Conflict(message));
            }
            Err(e) => return Err(e),
        }

        self.store.invalidate_many(self.affected_keys(kind, record_id).iter());
        self.refetch_record(kind, record_id).await?;
        Ok(())
    }

    fn collection_keys(&self, kind: RecordKind) -> Vec<CacheKey> {
        self.store.keys_where(|k| k.kind == kind && k.is_collection())
    }

    /// The record's detail key plus every cached page of its kind
    fn affected_keys(&self, kind: RecordKind, record_id: &str) -> Vec<CacheKey> {
        let mut keys = self.collection_keys(kind);
        keys.push(CacheKey::record(kind, record_id));
        keys
    }

    async fn refetch_record(&self, kind: RecordKind, record_id: &str) -> Result<Record> {
        let key = CacheKey::record(kind, record_id);
        let record = self
            .store
            .revalidate(&key, || self.loader.load(&key))
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Refetch after mutation failed");
                e
            })?
            .into_record()?;

        debug!(key = %key, status = %record.status(), "Refetched after mutation");
        Ok(record)
    }

    async fn refetch_all(&self, keys: &[CacheKey]) -> Result<()> {
        let refetches = keys
            .iter()
            .map(|key| self.store.revalidate(key, move || self.loader.load(key)));
        futures::future::try_join_all(refetches).await?;
        Ok(())
    }
}

fn require_sub_units(kind: RecordKind) -> Result<()> {
    if kind.has_sub_units() {
        Ok(())
    } else {
        Err(SdkError::Validation(format!("{} records have no kontikis", kind)))
    }
}

fn require_whole_record(kind: RecordKind) -> Result<()> {
    if kind.has_sub_units() {
        Err(SdkError::Validation(format!(
            "{} records are reviewed per kontiki",
            kind
        )))
    } else {
        Ok(())
    }
}
