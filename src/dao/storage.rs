use std::{error::Error, future::Future, time::Duration};
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or failed while serving the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {message}")]
    UniqueViolation { message: String },
    /// A foreign key pointed at a row that no longer exists.
    #[error("referenced row missing: {message}")]
    MissingParent { message: String },
    /// The backend refused the request (row-level policy, missing grant).
    #[error("request rejected by storage: {message}")]
    Rejected { message: String },
    /// The client-side request bound elapsed before the backend answered.
    #[error("storage request timed out")]
    Timeout,
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Whether re-issuing the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Unavailable { .. } | StorageError::Timeout
        )
    }
}

/// Bound a backend round-trip; expiry becomes [`StorageError::Timeout`].
pub async fn with_timeout<T>(
    limit: Duration,
    operation: impl Future<Output = StorageResult<T>>,
) -> StorageResult<T> {
    tokio::time::timeout(limit, operation)
        .await
        .unwrap_or(Err(StorageError::Timeout))
}
