//! API error types with HTTP response mapping.
//!
//! Responses only carry a generic message for the status. The detailed cause,
//! including compensators that failed while unwinding, is logged server-side.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::{ErrorKind, WorkflowError};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be decoded.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No live session cookie was presented.
    #[error("Missing session")]
    Unauthenticated,

    /// A workflow failed.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// The task running the workflow panicked or was aborted.
    #[error("Workflow task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::Validation,
            ApiError::Unauthenticated => ErrorKind::Forbidden,
            ApiError::Workflow(e) => e.kind(),
            ApiError::Task(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

fn public_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "invalid request",
        ErrorKind::Forbidden => "forbidden",
        ErrorKind::NotFound => "not found",
        ErrorKind::Conflict => "already exists",
        ErrorKind::Internal => "internal server error",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();

        match &self {
            ApiError::Workflow(e) if !e.compensation_failures.is_empty() => {
                tracing::error!(
                    error = %e,
                    compensation_failures = ?e.compensation_failures,
                    "request failed with incomplete cleanup"
                );
            }
            _ if status.is_server_error() => tracing::error!(error = %self, "internal server error"),
            _ => tracing::warn!(error = %self, status = status.as_u16(), "request rejected"),
        }

        let body = serde_json::json!({ "error": public_message(kind) });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga::SagaError;
    use store::StoreError;

    #[test]
    fn test_status_follows_workflow_kind() {
        let not_found = ApiError::from(WorkflowError::new(
            SagaError::Store(StoreError::not_found("garment", "x")),
            Vec::new(),
        ));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict = ApiError::from(WorkflowError::new(
            SagaError::Conflict("taken".to_string()),
            Vec::new(),
        ));
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::BadRequest("x".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_body_hides_details() {
        let err = ApiError::from(WorkflowError::new(
            SagaError::Store(StoreError::Unavailable("db password wrong".to_string())),
            Vec::new(),
        ));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "internal server error");
    }
}
