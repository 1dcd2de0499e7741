//! Review status plus the metadata that must travel with it

use super::{transition, UnitStatus, VerificationEvent};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity recorded on a verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reviewer {
    pub id: String,
    pub name: String,
}

impl Reviewer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Review state of a kontiki or of a single-status record.
///
/// `verified_at`/`verified_by_id` are set iff the status is VERIFIED, and
/// `rejection_note` iff it is REJECTED.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(default)]
    pub status: UnitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_note: Option<String>,
}

impl Review {
    pub fn submitted() -> Self {
        Self::default()
    }

    /// Apply a reviewer decision, keeping the metadata consistent with the
    /// new status. On error the review is left unchanged.
    pub fn apply(
        &mut self,
        event: &VerificationEvent,
        reviewer: &Reviewer,
        at: DateTime<Utc>,
    ) -> Result<UnitStatus> {
        let next = transition(self.status, event)?;

        match event {
            VerificationEvent::Verify => {
                self.verified_at = Some(at);
                self.verified_by_id = Some(reviewer.id.clone());
                self.verified_by_name = Some(reviewer.name.clone());
                self.rejection_note = None;
            }
            VerificationEvent::Reject { note } => {
                self.verified_at = None;
                self.verified_by_id = None;
                self.verified_by_name = None;
                self.rejection_note = Some(note.trim().to_string());
            }
        }
        self.status = next;

        Ok(next)
    }

    /// Describe the first metadata invariant this review breaks, if any.
    pub fn invariant_violation(&self) -> Option<&'static str> {
        let verified = self.status == UnitStatus::Verified;
        let rejected = self.status == UnitStatus::Rejected;

        if verified != self.verified_at.is_some() {
            return Some("verifiedAt must be present exactly when VERIFIED");
        }
        if verified != self.verified_by_id.is_some() {
            return Some("verifiedById must be present exactly when VERIFIED");
        }
        match (&self.rejection_note, rejected) {
            (Some(_), false) => Some("rejectionNote must be absent unless REJECTED"),
            (Some(note), true) if note.trim().is_empty() => Some("rejectionNote must not be empty"),
            (None, true) => Some("rejectionNote is required when REJECTED"),
            _ => None,
        }
    }
}
