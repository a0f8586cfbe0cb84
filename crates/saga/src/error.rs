//! Workflow error types.

use domain::DomainError;
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

/// Coarse classification of a failure, as seen by the delivery layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed, oversized or disallowed input. Nothing was created.
    Validation,
    /// The caller does not own the resource.
    Forbidden,
    /// A referenced row or file is absent.
    NotFound,
    /// A unique key is already taken.
    Conflict,
    /// An adapter or repository failed.
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

/// The cause of a failed workflow step.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Request input failed a check that is not a media rule.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Uploaded media broke a media rule.
    #[error("Invalid media: {0}")]
    Media(#[from] DomainError),

    /// The caller is not the owner or creator of the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A unique key is already taken.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A repository, blob store or session cache call failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Background cutter call failed.
    #[error("Cutter service error: {0}")]
    Cutter(String),

    /// Classifier call failed.
    #[error("Classifier service error: {0}")]
    Classifier(String),

    /// Similarity scorer call failed.
    #[error("Similarity service error: {0}")]
    Similarity(String),

    /// Password hashing or hash parsing failed.
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    /// The workflow's cancellation token fired before the step finished.
    #[error("Workflow cancelled")]
    Cancelled,

    /// The workflow's deadline passed before the step finished.
    #[error("Workflow deadline exceeded")]
    Timeout,
}

impl SagaError {
    /// Classifies the error for status mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::Validation(_) | SagaError::Media(_) => ErrorKind::Validation,
            SagaError::Forbidden(_) => ErrorKind::Forbidden,
            SagaError::Conflict(_) => ErrorKind::Conflict,
            SagaError::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            SagaError::Store(StoreError::Conflict(_)) => ErrorKind::Conflict,
            _ => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

/// A compensator that failed during an unwind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompensationFailure {
    /// Label given when the compensator was registered.
    pub step: String,
    pub reason: String,
}

/// Error returned by every orchestrator.
///
/// Reports the original triggering cause. Compensators that failed while
/// unwinding are listed alongside it so orphaned resources can be reconciled.
#[derive(Debug, Error)]
#[error("{cause}")]
pub struct WorkflowError {
    pub cause: SagaError,
    pub compensation_failures: Vec<CompensationFailure>,
}

impl WorkflowError {
    pub fn new(cause: SagaError, compensation_failures: Vec<CompensationFailure>) -> Self {
        Self {
            cause,
            compensation_failures,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }

    pub fn status_code(&self) -> u16 {
        self.cause.status_code()
    }

    /// Returns true if every compensator ran successfully.
    pub fn is_fully_compensated(&self) -> bool {
        self.compensation_failures.is_empty()
    }
}

/// Convenience type alias for workflow results.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            SagaError::Media(DomainError::EmptyFile).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            SagaError::Forbidden("x".into()).status_code(),
            403
        );
        assert_eq!(
            SagaError::Store(StoreError::not_found("garment", "1")).status_code(),
            404
        );
        assert_eq!(
            SagaError::Store(StoreError::Conflict("login".into())).status_code(),
            409
        );
        assert_eq!(
            SagaError::Store(StoreError::Unavailable("down".into())).status_code(),
            500
        );
        assert_eq!(SagaError::Timeout.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_workflow_error_reports_cause() {
        let err = WorkflowError::new(
            SagaError::Classifier("boom".into()),
            vec![CompensationFailure {
                step: "delete mask".into(),
                reason: "disk".into(),
            }],
        );
        assert_eq!(err.to_string(), "Classifier service error: boom");
        assert_eq!(err.status_code(), 500);
        assert!(!err.is_fully_compensated());
    }
}
