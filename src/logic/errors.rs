use thiserror::Error;

/// Failure taxonomy of the versioning core.
///
/// Validation and not-found errors are raised before any lock is taken and
/// before any commit begins, so they never leave partial side effects.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    /// A caller-specified lock wait timeout elapsed
    #[error("{0}")]
    Locked(String),
    #[error("The operation has been canceled")]
    Canceled,
    /// Underlying storage or commit failure
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        CoreError::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        CoreError::Conflict(message.into())
    }
}
