use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fontwatch_core::SourceError;
use fontwatch_process::ProcessError;
use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheError;

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Source(e) => match e {
                SourceError::UnknownSource(_) | SourceError::FamilyNotFound { .. } => StatusCode::NOT_FOUND,
                SourceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                SourceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                SourceError::Transport(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Process(e) => match e {
                ProcessError::NotFound(_) => StatusCode::NOT_FOUND,
                ProcessError::Rejected(_) | ProcessError::Unregistered { .. } => StatusCode::FORBIDDEN,
                ProcessError::Conflict { .. } | ProcessError::AlreadyExists(_) => StatusCode::CONFLICT,
                ProcessError::Task(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Cache(CacheError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use fontwatch_process::TicketError;

    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::from(SourceError::UnknownSource("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(SourceError::family_not_found("x", "Test Sans")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(ProcessError::from(TicketError::Mismatch)).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::BadRequest("nope".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("key".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(CacheError::Unavailable("down".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
