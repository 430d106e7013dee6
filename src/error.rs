// Error taxonomy shared by the registry, executor and HTTP layer
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Failures surfaced at the API boundary. Each variant maps to one HTTP
/// status so clients can tell "fix your input" from "wait and poll again"
/// from "this job will never produce an artifact".
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The job exists but is not completed, or never produced the requested
    /// file kind.
    #[error("{0}")]
    NotReady(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotReady(_) | ApiError::InvalidTransition(_) => StatusCode::CONFLICT,
            ApiError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Failures raised inside adapters. The executor records these verbatim in
/// the job's error field; only validation errors escape synchronously.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    /// The external tool ran and reported an error.
    #[error("{0}")]
    Tool(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl From<AdapterError> for ApiError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::InvalidInput(msg) => ApiError::Validation(msg),
            AdapterError::NotFound(msg) => ApiError::NotFound(msg),
            AdapterError::Upstream(msg) => ApiError::UpstreamUnavailable(msg),
            AdapterError::Tool(msg) => ApiError::Internal(msg),
            AdapterError::Io(err) => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::NotReady("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::UpstreamUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_adapter_error_maps_to_api_error() {
        let err: ApiError = AdapterError::InvalidInput("empty list".into()).into();
        assert!(matches!(err, ApiError::Validation(_)));
        let err: ApiError = AdapterError::Upstream("timeout".into()).into();
        assert!(matches!(err, ApiError::UpstreamUnavailable(_)));
    }
}
