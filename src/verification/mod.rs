//! Verification state machine
//!
//! Pure logic, no I/O. Computes how a single review status moves in response
//! to a reviewer's decision, and how a record's aggregate status is derived
//! from the statuses of its kontikis.
//!
//! ```text
//!   SUBMITTED ──verify──► VERIFIED (terminal)
//!       │                    ▲
//!    reject(note)            │ verify (re-review)
//!       ▼                    │
//!   REJECTED ────────────────┘
//! ```

mod aggregate;
mod review;

pub use aggregate::{aggregate_status, RecordStatus};
pub use review::{Review, Reviewer};

use crate::error::{Result, SdkError};
use serde::{Deserialize, Serialize};

/// Review status of a kontiki, or of a record kind that has no kontikis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Submitted,
    Verified,
    Rejected,
}

impl Default for UnitStatus {
    fn default() -> Self {
        Self::Submitted
    }
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Verified => "VERIFIED",
            Self::Rejected => "REJECTED",
        }
    }

    /// No further reviewer decision is accepted from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reviewer's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationEvent {
    Verify,
    Reject { note: String },
}

impl VerificationEvent {
    /// Build a reject event, refusing blank notes.
    pub fn reject(note: impl Into<String>) -> Result<Self> {
        let note = note.into();
        validate_rejection_note(&note)?;
        Ok(Self::Reject { note })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Reject { .. } => "reject",
        }
    }
}

/// Rejection notes are mandatory; whitespace alone does not count.
pub fn validate_rejection_note(note: &str) -> Result<()> {
    if note.trim().is_empty() {
        return Err(SdkError::Validation("rejection note must not be empty".into()));
    }
    Ok(())
}

/// Compute the status reached by applying `event` in state `from`.
///
/// Refused transitions surface as `Conflict`; a blank rejection note is a
/// `Validation` error regardless of state.
pub fn transition(from: UnitStatus, event: &VerificationEvent) -> Result<UnitStatus> {
    if let VerificationEvent::Reject { note } = event {
        validate_rejection_note(note)?;
    }

    match (from, event) {
        (UnitStatus::Submitted, VerificationEvent::Verify) => Ok(UnitStatus::Verified),
        (UnitStatus::Submitted, VerificationEvent::Reject { .. }) => Ok(UnitStatus::Rejected),
        (UnitStatus::Rejected, VerificationEvent::Verify) => Ok(UnitStatus::Verified),
        (from, event) => Err(SdkError::Conflict(format!(
            "cannot {} a unit in state {}",
            event.name(),
            from
        ))),
    }
}
