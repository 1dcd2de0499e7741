//! Record-level status derived from kontiki statuses

use super::UnitStatus;
use serde::{Deserialize, Serialize};

/// Aggregate status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Submitted,
    InProgress,
    PartiallyVerified,
    Verified,
    Rejected,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::InProgress => "IN_PROGRESS",
            Self::PartiallyVerified => "PARTIALLY_VERIFIED",
            Self::Verified => "VERIFIED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl From<UnitStatus> for RecordStatus {
    fn from(status: UnitStatus) -> Self {
        match status {
            UnitStatus::Submitted => Self::Submitted,
            UnitStatus::Verified => Self::Verified,
            UnitStatus::Rejected => Self::Rejected,
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derive a record's status from its kontiki statuses.
///
/// Only the counts per status matter, so the result does not depend on
/// ordering. Any VERIFIED unit next to a non-VERIFIED one (REJECTED
/// included) yields PARTIALLY_VERIFIED. A record without units is SUBMITTED.
pub fn aggregate_status<I>(statuses: I) -> RecordStatus
where
    I: IntoIterator<Item = UnitStatus>,
{
    let (mut submitted, mut verified, mut rejected) = (0usize, 0usize, 0usize);
    for status in statuses {
        match status {
            UnitStatus::Submitted => submitted += 1,
            UnitStatus::Verified => verified += 1,
            UnitStatus::Rejected => rejected += 1,
        }
    }

    match (submitted, verified, rejected) {
        (0, 0, 0) => RecordStatus::Submitted,
        (0, _, 0) => RecordStatus::Verified,
        (_, v, _) if v > 0 => RecordStatus::PartiallyVerified,
        (0, 0, _) => RecordStatus::Rejected,
        (_, 0, 0) => RecordStatus::Submitted,
        _ => RecordStatus::InProgress,
    }
}
