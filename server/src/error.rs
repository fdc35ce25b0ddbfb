use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use stream_core::CoordinatorError;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("TTS error: {0}")]
    TtsError(#[from] anyhow::Error),

    #[error("{0}")]
    Timeout(String),

    #[error("Session cancelled")]
    Cancelled,

    #[error("Service not ready: {0}")]
    NotReady(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::LlmError(_) => StatusCode::BAD_GATEWAY,
            ApiError::TtsError(_) | ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Cancelled | ApiError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message shown to the client.
    pub fn message(&self) -> String {
        match self {
            ApiError::InvalidInput(msg) | ApiError::InternalError(msg) => msg.clone(),
            ApiError::TtsError(e) => format!("TTS error: {e:#}"),
            other => other.to_string(),
        }
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::Producer(e) => ApiError::LlmError(format!("{e:#}")),
            CoordinatorError::Consumer(e) => ApiError::TtsError(e),
            CoordinatorError::Timeout(d) => ApiError::Timeout(format!(
                "Request timed out after {} seconds. Please try again with a shorter message.",
                d.as_secs()
            )),
            CoordinatorError::Cancelled => ApiError::Cancelled,
            both @ CoordinatorError::Both { .. } => ApiError::InternalError(both.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(ErrorResponse {
            error: self.message(),
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn coordinator_errors_map_to_statuses() {
        let e: ApiError = CoordinatorError::Producer(anyhow::anyhow!("connection refused")).into();
        assert_eq!(e.status(), StatusCode::BAD_GATEWAY);
        assert!(e.message().contains("connection refused"));

        let e: ApiError = CoordinatorError::Consumer(anyhow::anyhow!("Unknown voice")).into();
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(e.message().starts_with("TTS error"));

        let e: ApiError = CoordinatorError::Timeout(Duration::from_secs(120)).into();
        assert_eq!(e.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(e.message().contains("120 seconds"));

        let e: ApiError = CoordinatorError::Cancelled.into();
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);

        let e: ApiError = CoordinatorError::Both {
            producer: Box::new(CoordinatorError::Producer(anyhow::anyhow!("llm down"))),
            consumer: Box::new(CoordinatorError::Consumer(anyhow::anyhow!("tts down"))),
        }
        .into();
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_input_is_reported_verbatim() {
        let e = ApiError::InvalidInput("Messages cannot be empty".into());
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.message(), "Messages cannot be empty");
    }
}
