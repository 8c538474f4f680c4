//! Error types for chatrelay.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::time::Duration;

/// Result type alias for chatrelay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chatrelay.
///
/// Every variant is scoped to the request that produced it; none of them
/// stop the server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("API key is not configured; set CHATRELAY_API_KEY or upstream.api_key")]
    MissingApiKey,

    #[error("{0}")]
    InvalidMode(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Upstream request failed: HTTP {status} - {body}")]
    UpstreamHttp { status: u16, body: String },

    #[error("Unexpected upstream response: {0}")]
    UpstreamProtocol(String),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Upstream did not respond within {0:?}")]
    Timeout(Duration),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidMode(_) | Error::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Config(_)
            | Error::MissingApiKey
            | Error::UpstreamHttp { .. }
            | Error::UpstreamProtocol(_)
            | Error::Upstream(_)
            | Error::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body extraction failures. Well-formed JSON of the wrong shape is a
/// validation error; anything that is not JSON at all is a bad request.
impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(_) => Error::Validation(rejection.body_text()),
            _ => Error::MalformedBody(rejection.body_text()),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "detail": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
