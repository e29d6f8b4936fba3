// Error taxonomy for adapters, reference tables and the fetch seam
use thiserror::Error;

/// Failure of one source for one query. Never aborts the whole aggregation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Unparseable response from {source_id}: {reason}")]
    UnparseableResponse { source_id: String, reason: String },

    #[error("{source_id} reported error {code}: {message}")]
    SourceReported {
        source_id: String,
        code: i64,
        message: String,
    },

    #[error("Unknown cabin type on {carrier} {flight_number}, code: {code}")]
    UnknownCabin {
        carrier: String,
        flight_number: String,
        code: String,
    },

    #[error("Unknown aircraft type {code} on {flight_number}")]
    UnknownAircraft { flight_number: String, code: String },

    #[error("Source {source_id} unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    #[error("No adapter registered for source {0}")]
    UnknownSource(String),
}

impl SourceError {
    pub fn unparseable(source_id: &str, reason: impl ToString) -> Self {
        SourceError::UnparseableResponse {
            source_id: source_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn unavailable(source_id: &str, reason: impl ToString) -> Self {
        SourceError::SourceUnavailable {
            source_id: source_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by whatever obtains raw payloads for the core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("No payload for source {0}")]
    NoPayload(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::NoPayload(_))
    }
}

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
