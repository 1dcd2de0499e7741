//! Records, kontikis and pages of records

use super::RecordKind;
use crate::error::{Result, SdkError};
use crate::verification::{aggregate_status, RecordStatus, Review, UnitStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One kiln's contribution to a production or bulk-density record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubUnit {
    pub kontiki_id: String,
    #[serde(flatten)]
    pub review: Review,
    /// Photos, measurements and AI estimates; opaque to this crate
    #[serde(default)]
    pub evidence: serde_json::Value,
}

impl SubUnit {
    pub fn new(kontiki_id: impl Into<String>) -> Self {
        Self {
            kontiki_id: kontiki_id.into(),
            review: Review::submitted(),
            evidence: serde_json::Value::Null,
        }
    }

    pub fn status(&self) -> UnitStatus {
        self.review.status
    }
}

/// Body of a record kind whose kontikis are reviewed individually.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    #[serde(default)]
    pub kontikis: Vec<SubUnit>,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Body of a record kind reviewed as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standalone {
    #[serde(flatten)]
    pub review: Review,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Kind-specific part of a record, discriminated by the `kind` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordBody {
    Production(Batch),
    BulkDensity(Batch),
    Sourcing(Standalone),
    Sampling(Standalone),
    Activation(Standalone),
}

impl RecordBody {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Production(_) => RecordKind::Production,
            Self::BulkDensity(_) => RecordKind::BulkDensity,
            Self::Sourcing(_) => RecordKind::Sourcing,
            Self::Sampling(_) => RecordKind::Sampling,
            Self::Activation(_) => RecordKind::Activation,
        }
    }

    fn batch(&self) -> Option<&Batch> {
        match self {
            Self::Production(batch) | Self::BulkDensity(batch) => Some(batch),
            _ => None,
        }
    }

    fn batch_mut(&mut self) -> Option<&mut Batch> {
        match self {
            Self::Production(batch) | Self::BulkDensity(batch) => Some(batch),
            _ => None,
        }
    }

    fn standalone(&self) -> Option<&Standalone> {
        match self {
            Self::Sourcing(s) | Self::Sampling(s) | Self::Activation(s) => Some(s),
            _ => None,
        }
    }

    fn standalone_mut(&mut self) -> Option<&mut Standalone> {
        match self {
            Self::Sourcing(s) | Self::Sampling(s) | Self::Activation(s) => Some(s),
            _ => None,
        }
    }
}

/// A field submission awaiting review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub user_id: String,
    pub site_id: String,
    pub record_date: NaiveDate,
    pub record_time: String,
    pub captured_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_accuracy: Option<f64>,
    #[serde(flatten)]
    pub body: RecordBody,
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        self.body.kind()
    }

    /// Kontikis in submission order; empty for single-status kinds
    pub fn sub_units(&self) -> &[SubUnit] {
        self.body.batch().map(|b| b.kontikis.as_slice()).unwrap_or(&[])
    }

    pub fn sub_units_mut(&mut self) -> Option<&mut Vec<SubUnit>> {
        self.body.batch_mut().map(|b| &mut b.kontikis)
    }

    pub fn sub_unit(&self, kontiki_id: &str) -> Option<&SubUnit> {
        self.sub_units().iter().find(|u| u.kontiki_id == kontiki_id)
    }

    pub fn sub_unit_mut(&mut self, kontiki_id: &str) -> Option<&mut SubUnit> {
        self.body
            .batch_mut()?
            .kontikis
            .iter_mut()
            .find(|u| u.kontiki_id == kontiki_id)
    }

    /// Record-level review, for kinds reviewed as a whole
    pub fn review(&self) -> Option<&Review> {
        self.body.standalone().map(|s| &s.review)
    }

    pub fn review_mut(&mut self) -> Option<&mut Review> {
        self.body.standalone_mut().map(|s| &mut s.review)
    }

    /// Aggregate status, always derived, never stored.
    pub fn status(&self) -> RecordStatus {
        match self.review() {
            Some(review) => review.status.into(),
            None => aggregate_status(self.sub_units().iter().map(SubUnit::status)),
        }
    }

    /// Check the invariants a record must satisfy when it enters the cache.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| SdkError::InvalidRecord {
            id: self.id.clone(),
            reason,
        };

        let mut seen = HashSet::new();
        for unit in self.sub_units() {
            if !seen.insert(unit.kontiki_id.as_str()) {
                return Err(invalid(format!("duplicate kontikiId {}", unit.kontiki_id)));
            }
            if let Some(reason) = unit.review.invariant_violation() {
                return Err(invalid(format!("kontiki {}: {}", unit.kontiki_id, reason)));
            }
        }

        if let Some(reason) = self.review().and_then(Review::invariant_violation) {
            return Err(invalid(reason.to_string()));
        }

        Ok(())
    }
}

/// Pagination metadata returned with a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

/// One page of a record collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPage {
    pub data: Vec<Record>,
    pub meta: PageMeta,
}

impl RecordPage {
    pub fn validate(&self) -> Result<()> {
        self.data.iter().try_for_each(Record::validate)
    }

    pub fn find(&self, id: &str) -> Option<&Record> {
        self.data.iter().find(|r| r.id == id)
    }
}
