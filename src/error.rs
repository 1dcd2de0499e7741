//! Error types for the Biochar SDK

use thiserror::Error;

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;

/// SDK error types
///
/// Errors are `Clone` because a single in-flight load is shared by every
/// caller waiting on the same cache key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SdkError {
    /// Transport failure reaching the records API
    #[error("Network error: {0}")]
    Network(String),

    /// Input rejected before (or by) the backend, e.g. empty rejection note
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transition refused, locally or by the backend
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Record or sub-unit not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend returned an unexpected error status
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend payload violates a record invariant
    #[error("Invalid record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SdkError {
    /// Whether this error came from the transport rather than the backend's answer
    pub fn is_network(&self) -> bool {
        matches!(self, SdkError::Network(_))
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SdkError::Serialization(err.to_string())
        } else {
            SdkError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SdkError {
    fn from(err: toml::de::Error) -> Self {
        SdkError::Config(err.to_string())
    }
}
