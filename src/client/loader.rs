//! Resolves cache keys against the backend

use crate::backend::RecordBackend;
use crate::cache::{CacheKey, CachedValue, KeyScope};
use crate::error::{Result, SdkError};
use std::sync::Arc;

/// Turns a `CacheKey` into the backend query that fills it, validating
/// what comes back before it can reach the store.
#[derive(Clone)]
pub struct KeyLoader {
    backend: Arc<dyn RecordBackend>,
}

impl KeyLoader {
    pub fn new(backend: Arc<dyn RecordBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn RecordBackend> {
        &self.backend
    }

    pub async fn load(&self, key: &CacheKey) -> Result<CachedValue> {
        match &key.scope {
            KeyScope::Collection { page, page_size } => {
                let page = self.backend.list(key.kind, *page, *page_size).await?;
                if let Some(foreign) = page.data.iter().find(|r| r.kind() != key.kind) {
                    return Err(SdkError::InvalidRecord {
                        id: foreign.id.clone(),
                        reason: format!("expected kind {}, got {}", key.kind, foreign.kind()),
                    });
                }
                page.validate()?;
                Ok(CachedValue::Page(page))
            }
            KeyScope::Record(id) => {
                let record = self.backend.get(key.kind, id).await?;
                let found = record.kind();
                if found != key.kind {
                    return Err(SdkError::InvalidRecord {
                        id: record.id,
                        reason: format!("expected kind {}, got {}", key.kind, found),
                    });
                }
                record.validate()?;
                Ok(CachedValue::Record(record))
            }
        }
    }
}
