use thiserror::Error;

use crate::models::JobStatus;
use crate::providers::ProviderError;

/// Failure returned by every caller-facing operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected input; nothing was written.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The book is already in the catalog. Callers may retry with an override.
    #[error("\"{title}\" is already in the catalog")]
    Duplicate { title: String },

    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
