//! Error types for backend calls and HTTP responses.

use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{Request, Response};
use thiserror::Error;

use crate::types::ErrorBody;

/// Errors from the model backend and the process that hosts it.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend could not be contacted at all.
    #[error("Model backend not reachable at {0}")]
    Unreachable(String),

    /// Backend answered with an error payload.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Model pull stream failed or timed out.
    #[error("Model pull failed: {0}")]
    PullFailed(String),

    /// Backend process could not be spawned.
    #[error("Failed to launch backend: {0}")]
    Spawn(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackendError {
    pub fn is_unreachable(&self) -> bool {
        match self {
            BackendError::Unreachable(_) => true,
            BackendError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Request-phase failures, rendered as `{"error": ...}` with a status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::Validation(_) => Status::BadRequest,
            ApiError::Unavailable(_) => Status::ServiceUnavailable,
            ApiError::Internal(_) => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        Response::build_from(body.respond_to(req)?)
            .status(status)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            Status::BadRequest
        );
        assert_eq!(
            ApiError::Unavailable("x".into()).status(),
            Status::ServiceUnavailable
        );
        assert_eq!(
            ApiError::Internal("x".into()).status(),
            Status::InternalServerError
        );
    }

    #[test]
    fn test_unreachable_classification() {
        assert!(BackendError::Unreachable("http://127.0.0.1:11434".into()).is_unreachable());
        assert!(!BackendError::Generation("model not found".into()).is_unreachable());
        assert!(!BackendError::PullFailed("disk full".into()).is_unreachable());
    }
}
