//! Cache keys and cached values for record data

use crate::error::{Result, SdkError};
use crate::model::{Record, RecordKind, RecordPage};
use serde::{Deserialize, Serialize};

/// What a cache key points at within a record kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyScope {
    /// One page of the kind's collection
    Collection { page: u32, page_size: u32 },
    /// A single record by id
    Record(String),
}

/// Cache key: the record kind is part of every key, so one slot exists per
/// (kind, scope) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub kind: RecordKind,
    pub scope: KeyScope,
}

impl CacheKey {
    pub fn collection(kind: RecordKind, page: u32, page_size: u32) -> Self {
        Self {
            kind,
            scope: KeyScope::Collection { page, page_size },
        }
    }

    pub fn record(kind: RecordKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            scope: KeyScope::Record(id.into()),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.scope, KeyScope::Collection { .. })
    }

    pub fn record_id(&self) -> Option<&str> {
        match &self.scope {
            KeyScope::Record(id) => Some(id),
            KeyScope::Collection { .. } => None,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.scope {
            KeyScope::Collection { page, page_size } => {
                write!(f, "{}?page={}&limit={}", self.kind, page, page_size)
            }
            KeyScope::Record(id) => write!(f, "{}/{}", self.kind, id),
        }
    }
}

/// Payload stored under a `CacheKey`
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Page(RecordPage),
    Record(Record),
}

impl CachedValue {
    pub fn into_page(self) -> Result<RecordPage> {
        match self {
            Self::Page(page) => Ok(page),
            Self::Record(record) => Err(SdkError::Serialization(format!(
                "expected a collection page, cache holds record {}",
                record.id
            ))),
        }
    }

    pub fn into_record(self) -> Result<Record> {
        match self {
            Self::Record(record) => Ok(record),
            Self::Page(_) => Err(SdkError::Serialization(
                "expected a record, cache holds a collection page".into(),
            )),
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            Self::Page(_) => None,
        }
    }
}
