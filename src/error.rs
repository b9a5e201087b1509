//! Error taxonomy shared by the service layer and the HTTP/WebSocket surfaces.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{dao::storage::StoreError, state::state_machine::InvalidTransition};

/// Domain-level errors raised by session operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The referenced session, quiz or player does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The requested player name is already taken by a connected player.
    #[error("name already taken: {0}")]
    NameTaken(String),
    /// The player already answered this question.
    #[error("answer already submitted for this question")]
    DuplicateAnswer,
    /// The submitted answer does not belong to the active question.
    #[error("invalid answer: {0}")]
    InvalidAnswer(String),
    /// The operation is not allowed in the session's current state.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),
    /// The caller lacks the capability for this operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The request payload is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The quiz-storage backend failed.
    #[error(transparent)]
    Upstream(#[from] StoreError),
}

impl ServiceError {
    /// Shorthand for a state-gate rejection.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidStateTransition(message.into())
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        Self::InvalidStateTransition(err.to_string())
    }
}

/// Error as surfaced on the HTTP API.
#[derive(Debug, Error)]
pub enum AppError {
    /// 404.
    #[error("not found: {0}")]
    NotFound(String),
    /// 409.
    #[error("conflict: {0}")]
    Conflict(String),
    /// 400.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// 401.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// 503.
    #[error("upstream unavailable: {0}")]
    ServiceUnavailable(String),
    /// 500.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body attached to error responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable description of the failure.
    pub error: String,
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::NameTaken(_)
            | ServiceError::DuplicateAnswer
            | ServiceError::InvalidStateTransition(_) => AppError::Conflict(err.to_string()),
            ServiceError::InvalidAnswer(_) | ServiceError::InvalidInput(_) => {
                AppError::BadRequest(err.to_string())
            }
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::Upstream(store) => AppError::ServiceUnavailable(store.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_expected_http_classes() {
        let cases: Vec<(ServiceError, fn(&AppError) -> bool)> = vec![
            (ServiceError::NotFound("x".into()), |e| {
                matches!(e, AppError::NotFound(_))
            }),
            (ServiceError::NameTaken("ada".into()), |e| {
                matches!(e, AppError::Conflict(_))
            }),
            (ServiceError::DuplicateAnswer, |e| {
                matches!(e, AppError::Conflict(_))
            }),
            (ServiceError::invalid_state("not in progress"), |e| {
                matches!(e, AppError::Conflict(_))
            }),
            (ServiceError::InvalidAnswer("x".into()), |e| {
                matches!(e, AppError::BadRequest(_))
            }),
            (ServiceError::Unauthorized("bad token".into()), |e| {
                matches!(e, AppError::Unauthorized(_))
            }),
        ];

        for (service, check) in cases {
            let app = AppError::from(service);
            assert!(check(&app), "unexpected mapping: {app:?}");
        }
    }
}
