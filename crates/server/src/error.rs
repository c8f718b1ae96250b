//! HTTP-facing error surface: maps `core::Error` to OpenAI-shaped error bodies (§7.1).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Everything a handler can fail with, beyond what `core::Error` already covers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] core::Error),

    #[error("The request body could not be parsed: {0}")]
    BadRequest(String),

    #[error("Streaming is not yet supported. Please set stream=false or omit the parameter.")]
    StreamingNotSupported,

    #[error("Missing or invalid Authorization header")]
    Unauthorized,

    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    #[error("Provider '{0}' not found")]
    ProviderNotFound(String),

    #[error("Job '{0}' not found")]
    JobNotFound(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Core(core::Error::InvalidModel(_)) => StatusCode::NOT_FOUND,
            Self::Core(core::Error::ConfigError(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Core(core::Error::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Core(core::Error::ProviderExit { .. }) => StatusCode::BAD_GATEWAY,
            Self::Core(core::Error::SpawnError(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Core(core::Error::ParseError(_)) => StatusCode::BAD_GATEWAY,
            Self::Core(core::Error::ChainExhausted { .. }) => StatusCode::BAD_GATEWAY,
            Self::Core(core::Error::Upstream { kind, .. }) => match kind {
                core::FailureKind::Auth => StatusCode::UNAUTHORIZED,
                core::FailureKind::QuotaExhausted => StatusCode::FORBIDDEN,
                core::FailureKind::CapacityExhausted => StatusCode::SERVICE_UNAVAILABLE,
                core::FailureKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::BadRequest(_) | Self::StreamingNotSupported => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ModelNotFound(_) | Self::ProviderNotFound(_) | Self::JobNotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Core(core::Error::InvalidModel(_)) => "not_found_error",
            Self::Core(core::Error::ConfigError(_)) => "internal_error",
            Self::Core(core::Error::Timeout { .. }) => "api_error",
            Self::Core(core::Error::ProviderExit { .. }) => "api_error",
            Self::Core(core::Error::SpawnError(_)) => "internal_error",
            Self::Core(core::Error::ParseError(_)) => "api_error",
            Self::Core(core::Error::ChainExhausted { .. }) => "api_error",
            Self::Core(core::Error::Upstream { kind, .. }) => match kind {
                core::FailureKind::Auth => "authentication_error",
                core::FailureKind::QuotaExhausted => "insufficient_quota",
                core::FailureKind::RateLimited => "rate_limit_error",
                _ => "api_error",
            },
            Self::BadRequest(_) | Self::StreamingNotSupported => "invalid_request_error",
            Self::Unauthorized => "authentication_error",
            Self::ModelNotFound(_) | Self::ProviderNotFound(_) | Self::JobNotFound(_) => "not_found_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    r#type: &'static str,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: ErrorDetails {
                message: self.to_string(),
                r#type: self.error_type(),
                code: status.as_u16(),
            },
        };

        (status, Json(body)).into_response()
    }
}
