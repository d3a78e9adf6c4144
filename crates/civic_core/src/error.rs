use thiserror::Error;

use crate::schema::{DocumentFormat, FailureKind};

/// Failures raised by the inference collaborator.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference request timed out after {0}s")]
    Timeout(u64),

    #[error("inference service unreachable at {0}")]
    Connection(String),

    #[error("inference service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("malformed inference response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no rule set for format {0}")]
    UnsupportedFormat(DocumentFormat),

    #[error("document {0} produced no voting records")]
    NoRecordsExtracted(String),

    #[error("fallback record {index} failed validation: {reason}")]
    SchemaValidationFailed { index: usize, reason: String },

    #[error("fallback inference failed: {0}")]
    FallbackTransportFailed(String),

    #[error("ambiguous match for {name}: {candidates:?}")]
    ResolverMergeConflict {
        name: String,
        candidates: Vec<String>,
    },

    #[error("write contention persisted after {attempts} attempts: {message}")]
    PersistenceConflict { attempts: u32, message: String },

    #[error("case boundary marker missing for format {0}")]
    MissingCaseBoundary(DocumentFormat),

    #[error("unknown representative: {0}")]
    UnknownRepresentative(String),

    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Classification used in the failure list of a processing result.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::NoRecordsExtracted(_)
            | Self::UnsupportedFormat(_)
            | Self::MissingCaseBoundary(_)
            | Self::SchemaValidationFailed { .. } => FailureKind::NoRecordsExtracted,
            Self::FallbackTransportFailed(_) => FailureKind::FallbackTransportFailed,
            Self::PersistenceConflict { .. } | Self::Database(_) => {
                FailureKind::PersistenceConflict
            }
            _ => FailureKind::Internal,
        }
    }
}

impl From<InferenceError> for PipelineError {
    fn from(err: InferenceError) -> Self {
        Self::FallbackTransportFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_errors_surface_as_transport_failures() {
        let err: PipelineError = InferenceError::Timeout(30).into();
        assert_eq!(err.failure_kind(), FailureKind::FallbackTransportFailed);
        assert!(err.to_string().contains("30s"));
    }
}
