//! Shared fixtures: an in-memory records API and record builders

#![allow(dead_code)]

use async_trait::async_trait;
use biochar_sdk::{
    Record, RecordBackend, RecordBody, RecordKind, RecordPage, Result, Review, Reviewer,
    SdkError, Session, SubUnit, SyncConfig, VerificationEvent,
};
use biochar_sdk::model::{Batch, PageMeta, Standalone};
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Records API fake. Applies review commands with the crate's own state
/// machine, counts every call and can fail the next call of each class.
#[derive(Default)]
pub struct MockBackend {
    records: Mutex<BTreeMap<(RecordKind, String), Record>>,
    next_list_error: Mutex<Option<SdkError>>,
    next_get_error: Mutex<Option<SdkError>>,
    next_command_error: Mutex<Option<SdkError>>,
    get_gate: Mutex<Option<Arc<Semaphore>>>,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub command_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_records(records: Vec<Record>) -> Arc<Self> {
        let backend = Self::new();
        for record in records {
            backend.insert(record);
        }
        backend
    }

    pub fn insert(&self, record: Record) {
        self.records
            .lock()
            .unwrap()
            .insert((record.kind(), record.id.clone()), record);
    }

    /// Store a record under another kind's route, as a misbehaving API would
    pub fn insert_as(&self, kind: RecordKind, record: Record) {
        self.records
            .lock()
            .unwrap()
            .insert((kind, record.id.clone()), record);
    }

    /// Hold every later `get` until a permit is added to the returned gate
    pub fn gate_gets(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.get_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Server-side view of a record, bypassing call counters
    pub fn stored(&self, kind: RecordKind, id: &str) -> Option<Record> {
        self.records.lock().unwrap().get(&(kind, id.to_string())).cloned()
    }

    /// Apply a decision as another reviewer would, outside this session
    pub fn review_out_of_band(
        &self,
        kind: RecordKind,
        id: &str,
        kontiki_id: Option<&str>,
        event: VerificationEvent,
    ) {
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&(kind, id.to_string())).unwrap();
        let review = match kontiki_id {
            Some(kontiki_id) => &mut record.sub_unit_mut(kontiki_id).unwrap().review,
            None => record.review_mut().unwrap(),
        };
        review.apply(&event, &other_reviewer(), Utc::now()).unwrap();
    }

    pub fn fail_next_list(&self, error: SdkError) {
        *self.next_list_error.lock().unwrap() = Some(error);
    }

    pub fn fail_next_get(&self, error: SdkError) {
        *self.next_get_error.lock().unwrap() = Some(error);
    }

    pub fn fail_next_command(&self, error: SdkError) {
        *self.next_command_error.lock().unwrap() = Some(error);
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> usize {
        self.command_calls.load(Ordering::SeqCst)
    }

    async fn begin_command(&self) -> Result<()> {
        // Let concurrent callers interleave like a real round trip would
        tokio::task::yield_now().await;
        self.command_calls.fetch_add(1, Ordering::SeqCst);
        take(&self.next_command_error)
    }

    fn review_in_place(
        &self,
        kind: RecordKind,
        id: &str,
        kontiki_id: Option<&str>,
        event: VerificationEvent,
    ) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| SdkError::NotFound(format!("record {}", id)))?;

        let review = match kontiki_id {
            Some(kontiki_id) => &mut record
                .sub_unit_mut(kontiki_id)
                .ok_or_else(|| SdkError::NotFound(format!("kontiki {}", kontiki_id)))?
                .review,
            None => record
                .review_mut()
                .ok_or_else(|| SdkError::Validation("record has no review".into()))?,
        };

        review.apply(&event, &session_reviewer(), Utc::now())?;
        record.updated_at = Some(Utc::now());
        Ok(())
    }
}

fn take(slot: &Mutex<Option<SdkError>>) -> Result<()> {
    match slot.lock().unwrap().take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

#[async_trait]
impl RecordBackend for MockBackend {
    async fn list(&self, kind: RecordKind, page: u32, page_size: u32) -> Result<RecordPage> {
        tokio::task::yield_now().await;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        take(&self.next_list_error)?;

        let all: Vec<Record> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect();

        let total = all.len() as u64;
        let start = ((page.max(1) - 1) * page_size) as usize;
        let data = all.into_iter().skip(start).take(page_size as usize).collect();

        Ok(RecordPage {
            data,
            meta: PageMeta {
                total,
                page,
                limit: page_size,
                total_pages: ((total + page_size as u64 - 1) / page_size as u64) as u32,
            },
        })
    }

    async fn get(&self, kind: RecordKind, id: &str) -> Result<Record> {
        tokio::task::yield_now().await;
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.get_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        take(&self.next_get_error)?;

        self.stored(kind, id)
            .ok_or_else(|| SdkError::NotFound(format!("record {}", id)))
    }

    async fn verify_sub_unit(
        &self,
        kind: RecordKind,
        record_id: &str,
        kontiki_id: &str,
    ) -> Result<()> {
        self.begin_command().await?;
        self.review_in_place(kind, record_id, Some(kontiki_id), VerificationEvent::Verify)
    }

    async fn reject_sub_unit(
        &self,
        kind: RecordKind,
        record_id: &str,
        kontiki_id: &str,
        note: &str,
    ) -> Result<()> {
        self.begin_command().await?;
        self.review_in_place(kind, record_id, Some(kontiki_id), VerificationEvent::reject(note)?)
    }

    async fn verify_record(&self, kind: RecordKind, id: &str) -> Result<()> {
        self.begin_command().await?;
        self.review_in_place(kind, id, None, VerificationEvent::Verify)
    }

    async fn reject_record(&self, kind: RecordKind, id: &str, note: &str) -> Result<()> {
        self.begin_command().await?;
        self.review_in_place(kind, id, None, VerificationEvent::reject(note)?)
    }

    async fn create(&self, kind: RecordKind, payload: &serde_json::Value) -> Result<Record> {
        self.begin_command().await?;
        let record: Record = serde_json::from_value(payload.clone())?;
        if record.kind() != kind {
            return Err(SdkError::Validation("kind does not match route".into()));
        }
        self.insert(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        kind: RecordKind,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<Record> {
        self.begin_command().await?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| SdkError::NotFound(format!("record {}", id)))?;

        if let Some(site_id) = payload.get("siteId").and_then(|v| v.as_str()) {
            record.site_id = site_id.to_string();
        }
        record.updated_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<()> {
        self.begin_command().await?;
        self.records
            .lock()
            .unwrap()
            .remove(&(kind, id.to_string()))
            .map(|_| ())
            .ok_or_else(|| SdkError::NotFound(format!("record {}", id)))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn session_reviewer() -> Reviewer {
    Reviewer::new("reviewer-1", "Ana Reviewer")
}

pub fn other_reviewer() -> Reviewer {
    Reviewer::new("reviewer-2", "Second Reviewer")
}

fn base_record(id: &str, body: RecordBody) -> Record {
    let captured = "2024-05-01T08:30:00Z".parse().unwrap();
    Record {
        id: id.to_string(),
        user_id: "user-1".into(),
        site_id: "site-1".into(),
        record_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        record_time: "08:30".into(),
        captured_at: captured,
        submitted_at: captured,
        created_at: Some(captured),
        updated_at: None,
        latitude: -1.2921,
        longitude: 36.8219,
        gps_accuracy: Some(4.5),
        body,
    }
}

/// Production record whose kontikis are all SUBMITTED
pub fn production_record(id: &str, kontikis: &[&str]) -> Record {
    base_record(
        id,
        RecordBody::Production(Batch {
            kontikis: kontikis.iter().map(|k| SubUnit::new(*k)).collect(),
            details: serde_json::json!({ "feedstock": "maize stover" }),
        }),
    )
}

/// Sourcing record awaiting review
pub fn sourcing_record(id: &str) -> Record {
    base_record(
        id,
        RecordBody::Sourcing(Standalone {
            review: Review::submitted(),
            details: serde_json::json!({ "biomassType": "rice husk" }),
        }),
    )
}

pub fn session(backend: &Arc<MockBackend>) -> Session {
    session_with(backend, SyncConfig::default())
}

pub fn session_with(backend: &Arc<MockBackend>, config: SyncConfig) -> Session {
    init_tracing();
    Session::new(backend.clone(), config).unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
