//! Error taxonomy for the authorization-code client
//!
//! Provider-side failures keep the upstream status and payload so the HTTP
//! layer can pass them through unchanged. Nothing here is retried.

use std::fmt;

use serde_json::Value;

/// How an outbound provider call failed.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamFailure {
    /// Provider answered with a non-2xx status. `body` is the JSON payload
    /// when parsable, otherwise the raw text as a JSON string.
    Rejected { status: u16, body: Value },
    /// The call never produced a response: connect error, reset, or timeout.
    Transport { message: String, timed_out: bool },
    /// 2xx response whose body did not have the expected shape.
    InvalidBody { message: String },
}

impl UpstreamFailure {
    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
            timed_out: err.is_timeout(),
        }
    }
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { status, body } => write!(f, "provider returned {status}: {body}"),
            Self::Transport {
                message,
                timed_out: true,
            } => write!(f, "request timed out: {message}"),
            Self::Transport { message, .. } => write!(f, "transport error: {message}"),
            Self::InvalidBody { message } => write!(f, "invalid response body: {message}"),
        }
    }
}

/// Errors from the authorization-code client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid static configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The provider redirected back with an `error` parameter.
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Required request input missing; raised before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(UpstreamFailure),

    #[error("token refresh failed: {0}")]
    TokenRefresh(UpstreamFailure),

    #[error("profile fetch failed: {0}")]
    ProfileFetch(UpstreamFailure),

    #[error("playlist creation failed: {0}")]
    PlaylistCreation(UpstreamFailure),
}

impl Error {
    /// The upstream failure behind a provider-side error, if any.
    pub fn upstream(&self) -> Option<&UpstreamFailure> {
        match self {
            Self::TokenExchange(f)
            | Self::TokenRefresh(f)
            | Self::ProfileFetch(f)
            | Self::PlaylistCreation(f) => Some(f),
            _ => None,
        }
    }

    /// Provider HTTP status for pass-through, when the provider answered.
    pub fn upstream_status(&self) -> Option<u16> {
        match self.upstream() {
            Some(UpstreamFailure::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Upstream payload suitable for a `details` field.
    ///
    /// Provider bodies are returned verbatim; transport and decoding
    /// failures fall back to their message.
    pub fn details(&self) -> Option<Value> {
        match self.upstream()? {
            UpstreamFailure::Rejected { body, .. } => Some(body.clone()),
            UpstreamFailure::Transport { message, .. } => Some(Value::String(message.clone())),
            UpstreamFailure::InvalidBody { message } => Some(Value::String(message.clone())),
        }
    }

    /// True for network-level failures (the `TransportError` class).
    pub fn is_transport(&self) -> bool {
        matches!(self.upstream(), Some(UpstreamFailure::Transport { .. }))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.upstream(),
            Some(UpstreamFailure::Transport {
                timed_out: true,
                ..
            })
        )
    }

    /// Stable short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::AuthorizationDenied(_) => "authorization_denied",
            Self::Validation(_) => "validation",
            _ => match self.upstream() {
                Some(UpstreamFailure::Rejected { .. }) => "rejected",
                Some(UpstreamFailure::Transport {
                    timed_out: true, ..
                }) => "timeout",
                Some(UpstreamFailure::Transport { .. }) => "transport",
                Some(UpstreamFailure::InvalidBody { .. }) | None => "invalid_body",
            },
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
