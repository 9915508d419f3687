//! OAuth token exchange and refresh
//!
//! Both operations POST form-encoded credentials to the token endpoint with
//! different grant types. Neither retries: a failed refresh means the user
//! has to go through the authorization flow again.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::config::OAuthConfig;
use crate::error::{Error, Result, UpstreamFailure};
use crate::http::send_json;

/// Tokens returned by the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from issuance. Nothing here tracks
/// elapsed time: the caller must refresh before the access token expires
/// and must not use it afterwards.
///
/// `refresh_token` is optional because refresh responses may omit it when
/// the provider does not rotate refresh tokens. Any further fields the
/// provider sends (`token_type`, `scope`, ...) are kept in `extra` so the
/// pair serializes back to the provider's payload.
#[derive(Clone, PartialEq, Deserialize, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Trade an authorization code for a token pair.
///
/// `redirect_uri` is sent again and must equal the one used at login; the
/// provider rejects the exchange otherwise and its error body is carried
/// in the returned `TokenExchange` error.
#[instrument(skip_all)]
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
) -> Result<TokenPair> {
    let code = code.trim();
    if code.is_empty() {
        return Err(Error::Validation("missing authorization code".into()));
    }

    let request = client
        .post(&config.token_endpoint)
        .timeout(config.timeout)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose().as_str()),
        ]);

    let body = send_json("token_exchange", request).await.map_err(|failure| {
        warn!(error = %failure, "token exchange failed");
        Error::TokenExchange(failure)
    })?;

    let pair = parse_token_pair(body).map_err(Error::TokenExchange)?;
    info!(
        expires_in = pair.expires_in,
        has_refresh_token = pair.refresh_token.is_some(),
        "authorization code exchanged"
    );
    Ok(pair)
}

/// Trade a refresh token for a new access token.
///
/// The returned pair's `refresh_token` is `None` when the provider keeps
/// the old one valid; callers should then continue using the token they have.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    config: &OAuthConfig,
    refresh_token: &str,
) -> Result<TokenPair> {
    let body = refresh_token_payload(client, config, refresh_token).await?;
    parse_token_pair(body).map_err(Error::TokenRefresh)
}

/// Refresh and return the token endpoint's payload exactly as received.
///
/// Only the presence of `access_token` is checked. Fields the provider
/// omits or sends as `null` (`expires_in`, `refresh_token`) stay that way.
#[instrument(skip_all)]
pub async fn refresh_token_payload(
    client: &reqwest::Client,
    config: &OAuthConfig,
    refresh_token: &str,
) -> Result<Value> {
    let refresh_token = refresh_token.trim();
    if refresh_token.is_empty() {
        return Err(Error::Validation("missing refresh_token".into()));
    }

    let request = client
        .post(&config.token_endpoint)
        .timeout(config.timeout)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose().as_str()),
        ]);

    let body = send_json("token_refresh", request).await.map_err(|failure| {
        warn!(error = %failure, "token refresh failed");
        Error::TokenRefresh(failure)
    })?;

    if !body.get("access_token").is_some_and(Value::is_string) {
        return Err(Error::TokenRefresh(UpstreamFailure::InvalidBody {
            message: "token response has no access_token".into(),
        }));
    }
    let rotated = body.get("refresh_token").is_some_and(Value::is_string);
    let expires_in = body.get("expires_in").and_then(Value::as_u64);
    info!(?expires_in, rotated, "access token refreshed");
    Ok(body)
}

fn parse_token_pair(body: Value) -> std::result::Result<TokenPair, UpstreamFailure> {
    serde_json::from_value(body).map_err(|e| UpstreamFailure::InvalidBody {
        message: format!("unexpected token response: {e}"),
    })
}
