//! Error types shared by the PostgREST storage implementation.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`PostgrestError`] failures.
pub type PostgrestResult<T> = Result<T, PostgrestError>;

/// Postgres error code for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";
/// Postgres error code for `foreign_key_violation`; PostgREST also answers 409 for it.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Failures that can occur while talking to PostgREST, GoTrue or the change stream.
#[derive(Debug, Error)]
pub enum PostgrestError {
    /// Required environment variable is missing.
    #[error("missing database environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build database client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent.
    #[error("failed to send request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    #[error("unexpected response status {status} for `{path}`: {message}")]
    RequestStatus {
        path: String,
        status: StatusCode,
        /// Postgres error code from the response body, when present.
        code: Option<String>,
        message: String,
    },
    /// Response payload could not be parsed into JSON.
    #[error("failed to decode response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// A change-stream frame did not carry a valid change event.
    #[error("malformed change event `{payload}`")]
    DecodeChange {
        payload: String,
        #[source]
        source: serde_json::Error,
    },
    /// A stored procedure reported a committed write without returning the row.
    #[error("procedure `{procedure}` returned an inconsistent result")]
    MalformedProcedureResult { procedure: &'static str },
}

impl From<PostgrestError> for StorageError {
    fn from(err: PostgrestError) -> Self {
        match err {
            PostgrestError::RequestStatus { code, message, .. }
                if code.as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                StorageError::UniqueViolation { message }
            }
            PostgrestError::RequestStatus { code, message, .. }
                if code.as_deref() == Some(FOREIGN_KEY_VIOLATION) =>
            {
                StorageError::MissingParent { message }
            }
            PostgrestError::RequestStatus {
                status, message, ..
            } if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                StorageError::Rejected { message }
            }
            PostgrestError::RequestStatus {
                status, message, ..
            } if status == StatusCode::CONFLICT => StorageError::UniqueViolation { message },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: StatusCode, code: Option<&str>) -> PostgrestError {
        PostgrestError::RequestStatus {
            path: "ride_participants".into(),
            status,
            code: code.map(str::to_string),
            message: "nope".into(),
        }
    }

    #[test]
    fn duplicate_key_maps_to_unique_violation() {
        assert!(matches!(
            StorageError::from(status(StatusCode::CONFLICT, None)),
            StorageError::UniqueViolation { .. }
        ));
        assert!(matches!(
            StorageError::from(status(StatusCode::BAD_REQUEST, Some("23505"))),
            StorageError::UniqueViolation { .. }
        ));
    }

    #[test]
    fn missing_parent_row_is_not_a_duplicate() {
        assert!(matches!(
            StorageError::from(status(StatusCode::CONFLICT, Some("23503"))),
            StorageError::MissingParent { .. }
        ));
    }

    #[test]
    fn policy_refusal_maps_to_rejected() {
        assert!(matches!(
            StorageError::from(status(StatusCode::FORBIDDEN, Some("42501"))),
            StorageError::Rejected { .. }
        ));
    }

    #[test]
    fn server_errors_stay_retryable() {
        let err = StorageError::from(status(StatusCode::BAD_GATEWAY, None));
        assert!(err.is_retryable());
    }
}
