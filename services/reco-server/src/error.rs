//! Service-specific error types and JSON error responses

use std::time::Duration;

use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use integrations::IntegrationError;
use serde_json::{Value, json};
use thiserror::Error;

/// Failures of the service's own collaborators.
///
/// OAuth failures stay as `spotify_auth::Error` and are mapped to HTTP
/// responses by the route that observed them.
#[derive(Error, Debug)]
pub enum Error {
    #[error("database unreachable: {0}")]
    DatabaseUnreachable(String),

    #[error("database probe timed out after {0:?}")]
    DatabaseTimeout(Duration),

    #[error("classification failed: {0}")]
    Classifier(String),

    #[error("upload signing failed: {0}")]
    UploadSigner(String),
}

impl Error {
    pub fn from_probe(err: IntegrationError) -> Self {
        match err {
            IntegrationError::Timeout(after) => Self::DatabaseTimeout(after),
            other => Self::DatabaseUnreachable(other.to_string()),
        }
    }

    pub fn from_classifier(err: IntegrationError) -> Self {
        Self::Classifier(err.to_string())
    }

    pub fn from_signer(err: IntegrationError) -> Self {
        Self::UploadSigner(err.to_string())
    }

    /// Label for the `upstream_errors_total` metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseUnreachable(_) => "unreachable",
            Self::DatabaseTimeout(_) => "timeout",
            Self::Classifier(_) => "classifier",
            Self::UploadSigner(_) => "storage",
        }
    }
}

/// JSON error body: `{"error": "...", "details": ...}`.
///
/// `details` is omitted when there is nothing beyond the message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn with_details(mut self, details: Option<Value>) -> Self {
        self.details = details;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.message, "details": details }),
            None => json!({ "error": self.message }),
        };
        (
            self.status,
            [(CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

/// Status for a provider-side failure whose status is passed through:
/// the provider's own status when it answered, 504 on timeout, 502 for
/// other transport or decoding failures.
pub fn passthrough_status(err: &spotify_auth::Error) -> StatusCode {
    if let Some(status) = err
        .upstream_status()
        .and_then(|s| StatusCode::from_u16(s).ok())
    {
        return status;
    }
    match err {
        spotify_auth::Error::Validation(_) | spotify_auth::Error::AuthorizationDenied(_) => {
            StatusCode::BAD_REQUEST
        }
        spotify_auth::Error::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        e if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}
