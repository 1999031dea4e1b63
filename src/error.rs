// =============================================================================
// ERROR MODULE
// =============================================================================
// This module defines the error types of the engine and their HTTP responses.
//
// ERROR TAXONOMY:
// - StreamError:   the snapshot subscription failed; processing halts
// - StorageError:  the persisted alert log could not be read or written;
//                  callers of the store never see it, the store logs it and
//                  degrades to an empty log
// - PanelError:    caller errors on the alert lifecycle (e.g. resolving an
//                  alert twice)
// - SnapshotError: an inbound snapshot failed validation at the boundary
// - AppError:      what HTTP handlers return
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// =============================================================================
// STREAM ERRORS
// =============================================================================
/// Failure of the upstream snapshot subscription. Terminal for the
/// subscription; the core does not retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The source reported a failure (e.g. a missing index upstream)
    #[error("snapshot subscription failed: {0}")]
    Subscription(String),
}

// =============================================================================
// STORAGE ERRORS
// =============================================================================
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("alert log read failed: {0}")]
    Read(String),

    #[error("alert log write failed: {0}")]
    Write(String),

    /// The stored payload is not a JSON array of log entries
    #[error("alert log payload is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// =============================================================================
// PANEL ERRORS
// =============================================================================
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PanelError {
    /// The alert was already resolved; resolving is a one-way transition
    #[error("alert {0} is already resolved")]
    AlreadyResolved(String),

    #[error("alert not found: {0}")]
    NotFound(String),

    /// Another alert with the same id is already on the panel
    #[error("alert {0} is already registered")]
    Duplicate(String),
}

// =============================================================================
// SNAPSHOT VALIDATION ERRORS
// =============================================================================
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("remaining_percentage must be between 0 and 100, got {0}")]
    PercentageOutOfRange(i64),

    #[error("{0} must not be empty")]
    MissingIdentity(&'static str),

    #[error("stall path must look like <location>/stalls/<stall>, got {0:?}")]
    MalformedPath(String),
}

// =============================================================================
// HTTP ERROR TYPE
// =============================================================================
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(#[from] SnapshotError),

    #[error(transparent)]
    Panel(#[from] PanelError),

    /// The stream has halted and accepts no more batches
    #[error("Snapshot stream is not accepting updates: {0}")]
    StreamHalted(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

// =============================================================================
// HTTP RESPONSE CONVERSION
// =============================================================================
impl AppError {
    /// HTTP status this error answers with
    pub fn status_code(&self) -> StatusCode {
        self.parts().0
    }

    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidSnapshot(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_SNAPSHOT"),
            AppError::Panel(PanelError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Panel(PanelError::AlreadyResolved(_)) => {
                (StatusCode::CONFLICT, "ALREADY_RESOLVED")
            }
            AppError::Panel(PanelError::Duplicate(_)) => (StatusCode::CONFLICT, "DUPLICATE_ALERT"),
            AppError::StreamHalted(_) => (StatusCode::SERVICE_UNAVAILABLE, "STREAM_HALTED"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        let message = self.to_string();

        tracing::error!(
            error_code = error_code,
            message = %message,
            "Request failed"
        );

        (status, Json(ErrorResponse::new(error_code, message))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_errors_map_to_client_statuses() {
        let status = |e: PanelError| AppError::from(e).status_code();
        assert_eq!(status(PanelError::NotFound("a".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(PanelError::AlreadyResolved("a".into())), StatusCode::CONFLICT);
        assert_eq!(status(PanelError::Duplicate("a".into())), StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(SnapshotError::PercentageOutOfRange(101)).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
