//! Per-login session owning the record store

use super::loader::KeyLoader;
use super::mutation::MutationCoordinator;
use super::query::Query;
use crate::backend::RecordBackend;
use crate::cache::{CacheKey, CachedValue, SessionStore, StoreStats};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::model::{Record, RecordKind, RecordPage};
use crate::refresh::{RefreshHandle, RefreshPolicy};
use std::sync::Arc;
use tracing::info;

struct SessionInner {
    config: Arc<SyncConfig>,
    store: Arc<SessionStore>,
    loader: KeyLoader,
    mutations: MutationCoordinator,
}

/// Entry point for views: reads go through the session's store, writes
/// through its mutation coordinator.
///
/// A session is created at login and dropped at logout; the store it owns
/// goes with it. Cloning is cheap and shares the same store.
///
/// # Example
///
/// ```rust,ignore
/// use biochar_sdk::{RecordKind, Session, SyncConfig};
///
/// let session = Session::connect(SyncConfig::from_env())?;
/// let refresh = session.start_refresh();
///
/// let mut list = session.use_collection(RecordKind::Production, 1);
/// let state = list.load().await;
///
/// session.verify(RecordKind::Production, "rec-1", "k-2").await?;
/// // The detail key now holds the refetched record
/// let record = session.record(RecordKind::Production, "rec-1").await?;
///
/// refresh.shutdown().await;
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session over any backend
    pub fn new(backend: Arc<dyn RecordBackend>, config: SyncConfig) -> Result<Self> {
        config.validate()?;

        let config = Arc::new(config);
        let store = Arc::new(SessionStore::new());
        let mutations = MutationCoordinator::new(store.clone(), backend.clone(), config.clone());

        info!(page_size = config.page_size, "Session started");

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                store,
                loader: KeyLoader::new(backend),
                mutations,
            }),
        })
    }

    /// Create a session talking to the records API over HTTP
    #[cfg(feature = "http")]
    pub fn connect(config: SyncConfig) -> Result<Self> {
        let backend = crate::backend::HttpBackend::new(&config)?;
        Self::new(Arc::new(backend), config)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.store.stats()
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.inner.mutations
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn collection_key(&self, kind: RecordKind, page: u32) -> CacheKey {
        CacheKey::collection(kind, page.max(1), self.inner.config.page_size)
    }

    pub fn use_collection(&self, kind: RecordKind, page: u32) -> Query<RecordPage> {
        Query::new(self.clone(), self.collection_key(kind, page))
    }

    pub fn use_record(&self, kind: RecordKind, id: &str) -> Query<Record> {
        Query::new(self.clone(), CacheKey::record(kind, id))
    }

    pub async fn collection(&self, kind: RecordKind, page: u32) -> Result<RecordPage> {
        self.fetch_key(&self.collection_key(kind, page)).await?.into_page()
    }

    pub async fn record(&self, kind: RecordKind, id: &str) -> Result<Record> {
        self.fetch_key(&CacheKey::record(kind, id)).await?.into_record()
    }

    pub(crate) async fn fetch_key(&self, key: &CacheKey) -> Result<CachedValue> {
        let max_age = Some(self.inner.config.refresh_for(key.kind).stale_after());
        self.inner
            .store
            .fetch(key, max_age, || self.inner.loader.load(key))
            .await
    }

    pub(crate) async fn revalidate_key(&self, key: &CacheKey) -> Result<CachedValue> {
        self.inner
            .store
            .revalidate(key, || self.inner.loader.load(key))
            .await
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub async fn verify(&self, kind: RecordKind, record_id: &str, kontiki_id: &str) -> Result<()> {
        self.inner.mutations.submit_verify(kind, record_id, kontiki_id).await
    }

    pub async fn reject(
        &self,
        kind: RecordKind,
        record_id: &str,
        kontiki_id: &str,
        note: &str,
    ) -> Result<()> {
        self.inner
            .mutations
            .submit_reject(kind, record_id, kontiki_id, note)
            .await
    }

    pub async fn verify_record(&self, kind: RecordKind, record_id: &str) -> Result<()> {
        self.inner.mutations.verify_record(kind, record_id).await
    }

    pub async fn reject_record(&self, kind: RecordKind, record_id: &str, note: &str) -> Result<()> {
        self.inner.mutations.reject_record(kind, record_id, note).await
    }

    pub async fn create(&self, kind: RecordKind, payload: &serde_json::Value) -> Result<Record> {
        self.inner.mutations.create(kind, payload).await
    }

    pub async fn update(
        &self,
        kind: RecordKind,
        record_id: &str,
        payload: &serde_json::Value,
    ) -> Result<Record> {
        self.inner.mutations.update(kind, record_id, payload).await
    }

    pub async fn delete(&self, kind: RecordKind, record_id: &str) -> Result<()> {
        self.inner.mutations.delete(kind, record_id).await
    }

    // =========================================================================
    // Background refresh
    // =========================================================================

    /// Refresh policy bound to this session's store
    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::new(
            self.inner.store.clone(),
            self.inner.loader.clone(),
            self.inner.config.clone(),
        )
    }

    /// Spawn the polling/focus tasks; must be called inside a tokio runtime
    pub fn start_refresh(&self) -> RefreshHandle {
        self.refresh_policy().start()
    }
}
