//! Error types for solve-core operations.

use std::path::PathBuf;

/// Coarse classification used when reporting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigurationMissing,
    ExtractionIncomplete,
    NetworkFailure,
    TimingAnomaly,
    StorageError,
}

/// All errors that can occur in solve-core operations.
#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Pipeline Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Problem extraction incomplete, missing: {}", missing.join(", "))]
    ExtractionIncomplete { missing: Vec<&'static str> },

    #[error("{service} request failed: {message}")]
    Network {
        service: &'static str,
        message: String,
    },

    #[error("Bridge request {id} timed out after {timeout_ms}ms")]
    BridgeTimeout { id: String, timeout_ms: u64 },

    #[error("Bridge channel closed")]
    BridgeClosed,

    #[error("Elapsed time went negative by {overshoot_ms}ms; session clock reset")]
    TimingAnomaly { overshoot_ms: i64 },

    // ─────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SolveError {
    pub fn network(service: &'static str, message: impl Into<String>) -> Self {
        SolveError::Network {
            service,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SolveError::ConfigurationMissing(_) | SolveError::ConfigMalformed { .. } => {
                ErrorKind::ConfigurationMissing
            }
            SolveError::ExtractionIncomplete { .. } => ErrorKind::ExtractionIncomplete,
            SolveError::Network { .. }
            | SolveError::BridgeTimeout { .. }
            | SolveError::BridgeClosed => ErrorKind::NetworkFailure,
            SolveError::TimingAnomaly { .. } => ErrorKind::TimingAnomaly,
            SolveError::Storage(_) | SolveError::Io { .. } | SolveError::Json { .. } => {
                ErrorKind::StorageError
            }
        }
    }
}

/// Convenience type alias for Results using SolveError.
pub type Result<T> = std::result::Result<T, SolveError>;

impl From<SolveError> for String {
    fn from(err: SolveError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_failures_classify_as_network() {
        let err = SolveError::BridgeTimeout {
            id: "01H".to_string(),
            timeout_ms: 3000,
        };
        assert_eq!(err.kind(), ErrorKind::NetworkFailure);
        assert_eq!(SolveError::BridgeClosed.kind(), ErrorKind::NetworkFailure);
    }

    #[test]
    fn extraction_message_lists_missing_fields() {
        let err = SolveError::ExtractionIncomplete {
            missing: vec!["title", "code"],
        };
        assert_eq!(
            err.to_string(),
            "Problem extraction incomplete, missing: title, code"
        );
    }
}
