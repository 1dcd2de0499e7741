//! Record kinds

use serde::{Deserialize, Serialize};

/// The kinds of records submitted from the field.
///
/// Production and bulk-density records carry per-kontiki units that are
/// reviewed one by one; the others carry a single review status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Production,
    BulkDensity,
    Sourcing,
    Sampling,
    Activation,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Production,
        RecordKind::BulkDensity,
        RecordKind::Sourcing,
        RecordKind::Sampling,
        RecordKind::Activation,
    ];

    /// Parse from the kind tag (also accepts the kebab-case form)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "production" => Some(Self::Production),
            "bulk_density" => Some(Self::BulkDensity),
            "sourcing" => Some(Self::Sourcing),
            "sampling" => Some(Self::Sampling),
            "activation" => Some(Self::Activation),
            _ => None,
        }
    }

    /// Kind tag as used in payloads and config keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::BulkDensity => "bulk_density",
            Self::Sourcing => "sourcing",
            Self::Sampling => "sampling",
            Self::Activation => "activation",
        }
    }

    /// Path segment of this kind's endpoints on the records API
    pub fn route_segment(&self) -> &'static str {
        match self {
            Self::Production => "biochar-production",
            Self::BulkDensity => "bulk-density",
            Self::Sourcing => "biomass-sourcing",
            Self::Sampling => "biochar-sampling",
            Self::Activation => "biochar-activation",
        }
    }

    /// Whether records of this kind are reviewed per kontiki
    pub fn has_sub_units(&self) -> bool {
        matches!(self, Self::Production | Self::BulkDensity)
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
