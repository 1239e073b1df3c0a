//! Typed errors for the migration library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell a
//! missing job apart from a busy key or an exhausted persistence retry.

use thiserror::Error;

use crate::types::JobId;

/// Errors reported by an external collaborator (source repository,
/// document transformer, index store).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Remote service could not be reached or answered with a server error
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Remote service refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Call did not complete within the configured timeout
    #[error("call timed out")]
    Timeout,

    /// The call was interrupted underneath the job (task killed, connection torn down)
    #[error("call interrupted")]
    Interrupted,
}

impl CollaboratorError {
    /// Whether this error must stop the whole walk rather than a single node.
    pub fn is_structural(&self) -> bool {
        matches!(self, CollaboratorError::Interrupted)
    }
}

/// Why a single node produced no result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeFailure {
    /// The node no longer exists in the source repository
    #[error("not found in source")]
    NotFound,

    /// The transformer could not assemble a complete document
    #[error("could not build document")]
    TransformFailed,

    /// The index store refused the document
    #[error("index store rejected document")]
    IndexRejected,

    /// A collaborator call failed
    #[error("{0}")]
    Collaborator(#[from] CollaboratorError),
}

/// Errors that can occur while building, running or tracking migration jobs.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// No persisted or registered job with this id
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Another request is constructing a job for the same key; retry later
    #[error("job {key} is initializing")]
    JobInitializing { key: String },

    /// A live job already holds the key a resumed job belongs to
    #[error("job {job_id} is already registered for {key}")]
    JobConflict { key: String, job_id: JobId },

    /// Collaborator call failed outside of a single node
    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Job status could not be persisted within the retry budget
    #[error("job status persistence failed after {attempts} attempts")]
    PersistenceExhausted { attempts: u32 },

    /// The walk itself broke down (not a per-node failure)
    #[error("structural failure: {0}")]
    Structural(String),

    /// Invalid configuration value
    #[error("config error: {var}: {reason}")]
    Config { var: String, reason: String },

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Result type alias for collaborator calls.
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;
