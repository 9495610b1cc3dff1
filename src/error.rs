use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

use crate::dao::storage::StorageError;

/// Why a join/leave/edit conflicts with the current state of a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConflictKind {
    #[error("you have already joined this ride")]
    AlreadyJoined,
    #[error("you have not joined this ride")]
    NotJoined,
    #[error("no seats left on this ride")]
    RideFull,
    #[error("you cannot join your own ride")]
    OwnRide,
    #[error("seat capacity cannot change once riders have joined")]
    CapacityLocked,
    #[error("another request for this ride is still in progress")]
    InFlight,
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Operation requires a signed-in user.
    #[error("please sign in to continue")]
    Unauthenticated,
    /// Malformed input, rejected before any network call.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Operation conflicts with the ride's current state.
    #[error(transparent)]
    Conflict(#[from] ConflictKind),
    /// Owner-only operation attempted by someone else, or sign-in refused.
    #[error("{0}")]
    Forbidden(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Network or store failure; re-invoking the operation may succeed.
    #[error("storage unavailable")]
    Transport(#[source] StorageError),
}

impl ServiceError {
    /// Whether re-invoking the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Transport(source) if source.is_retryable())
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Transport(err)
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        let message = err
            .message
            .map(|message| message.into_owned())
            .unwrap_or_else(|| err.code.into_owned());
        ServiceError::Validation(message)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// No signed-in user.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Signed in, but not allowed.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Backing store unreachable or timed out.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unauthenticated => AppError::Unauthorized(err.to_string()),
            ServiceError::Validation(message) => AppError::BadRequest(message),
            ServiceError::Conflict(kind) => AppError::Conflict(kind.to_string()),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Transport(source) => AppError::ServiceUnavailable(source.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_map_to_409_with_reason() {
        let response = AppError::from(ServiceError::from(ConflictKind::RideFull)).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn timeouts_are_retryable_transport_failures() {
        let err = ServiceError::from(StorageError::Timeout);
        assert!(err.is_retryable());
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn rejections_are_not_retryable() {
        let err = ServiceError::from(StorageError::Rejected {
            message: "row-level policy".into(),
        });
        assert!(!err.is_retryable());
    }
}
