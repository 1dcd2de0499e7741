//! Consumer-facing query handles

use super::session::Session;
use crate::cache::{CacheKey, CachedValue};
use crate::error::{Result, SdkError};
use crate::model::{Record, RecordPage};
use std::marker::PhantomData;

/// Types a query can read out of a cached value
pub trait FromCached: Sized {
    fn from_cached(value: CachedValue) -> Result<Self>;
}

impl FromCached for RecordPage {
    fn from_cached(value: CachedValue) -> Result<Self> {
        value.into_page()
    }
}

impl FromCached for Record {
    fn from_cached(value: CachedValue) -> Result<Self> {
        value.into_record()
    }
}

/// What a view renders: the last good data, whether a load is running,
/// and the last error seen by this handle.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub is_loading: bool,
    pub is_stale: bool,
    pub error: Option<SdkError>,
}

/// A view's subscription to one cache key.
///
/// Failed loads keep serving the previous data alongside the error.
pub struct Query<T> {
    session: Session,
    key: CacheKey,
    last_error: Option<SdkError>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromCached> Query<T> {
    pub(crate) fn new(session: Session, key: CacheKey) -> Self {
        Self {
            session,
            key,
            last_error: None,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Current state without touching the network
    pub fn snapshot(&self) -> QueryState<T> {
        let store = self.session.store();
        let entry = store.get(&self.key);

        QueryState {
            is_stale: entry.as_ref().map_or(true, |e| e.stale),
            data: entry.and_then(|e| T::from_cached(e.value).ok()),
            is_loading: store.is_in_flight(&self.key),
            error: self.last_error.clone(),
        }
    }

    /// Fetch through the cache (no network when fresh)
    pub async fn load(&mut self) -> QueryState<T> {
        let result = self.session.fetch_key(&self.key).await;
        self.finish(result)
    }

    /// Force a load, bypassing freshness
    pub async fn refetch(&mut self) -> Result<T> {
        let result = self.session.revalidate_key(&self.key).await;
        self.record_outcome(&result);
        T::from_cached(result?)
    }

    fn finish(&mut self, result: Result<CachedValue>) -> QueryState<T> {
        self.record_outcome(&result);
        let mut state = self.snapshot();
        if let Ok(value) = result {
            // Prefer what this load returned over a concurrently written value
            state.data = T::from_cached(value).ok().or(state.data);
        }
        state
    }

    fn record_outcome(&mut self, result: &Result<CachedValue>) {
        self.last_error = result.as_ref().err().cloned();
    }
}
