//! Typed errors for the triage engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Error kinds line up with
//! the recovery story in spec.md section 7: transient failures and
//! validation failures are recovered locally by callers, while
//! lock-unavailable is a distinct kind the job queue worker loop treats
//! specially. Content-risk and retry-exhaustion are not errors at all —
//! `LlmClassifier::classify_batch` resolves them to a terminal
//! `LlmBatchOutcome::Abandoned` so a bad batch never fails the job.

use thiserror::Error;

/// Errors that can occur in the triage engine's pure/storage operations.
#[derive(Debug, Error)]
pub enum TriageError {
    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A post, insight, or other entity was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// External service call (embedding, LLM, fetch, notify) failed transiently.
    #[error("transient external failure: {0}")]
    Transient(String),

    /// External service response could not be parsed / validated.
    #[error("validation failure: {0}")]
    Validation(String),

    /// Requested mutual-exclusion lock is currently held by someone else.
    #[error("lock unavailable: scope={scope} holder={holder}")]
    LockUnavailable { scope: String, holder: String },

    /// A routing cache or embedding was stale and needs to be rebuilt.
    #[error("stale state: {0}")]
    Stale(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for triage-core operations.
pub type Result<T> = std::result::Result<T, TriageError>;
