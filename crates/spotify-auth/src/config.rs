//! Static client configuration shared by every flow

use std::time::Duration;

use common::Secret;
use url::Url;

use crate::authorize::AuthorizationRequest;
use crate::constants::{
    API_BASE_URL, AUTHORIZE_ENDPOINT, DEFAULT_SCOPES, DEFAULT_TIMEOUT_SECS, TOKEN_ENDPOINT,
};
use crate::error::{Error, Result};

/// OAuth client registration plus provider endpoints.
///
/// Built once at process start and validated with [`OAuthConfig::validate`];
/// a failure there is fatal, never a per-request error.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Must match the URI registered with the provider byte for byte.
    pub redirect_uri: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub api_base_url: String,
    pub scopes: Vec<String>,
    /// Force the consent dialog even when the user already approved the app.
    pub show_dialog: bool,
    /// Applied to every outbound call.
    pub timeout: Duration,
}

impl OAuthConfig {
    /// Config pointing at Spotify's public endpoints with default scopes.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
            authorize_endpoint: AUTHORIZE_ENDPOINT.to_string(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            api_base_url: API_BASE_URL.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            show_dialog: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Configuration("client_id is required".into()));
        }
        if self.client_secret.is_empty() {
            return Err(Error::Configuration("client_secret is required".into()));
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(Error::Configuration("redirect_uri is required".into()));
        }
        for (name, value) in [
            ("redirect_uri", &self.redirect_uri),
            ("authorize_endpoint", &self.authorize_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("api_base_url", &self.api_base_url),
        ] {
            parse_http_url(name, value)?;
        }
        if self.timeout.is_zero() {
            return Err(Error::Configuration(
                "timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Login request for this client. `state` is echoed back by the provider.
    pub fn authorization_request(&self, state: Option<String>) -> AuthorizationRequest {
        AuthorizationRequest {
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scopes: self.scopes.clone(),
            show_dialog: self.show_dialog,
            state,
        }
    }

    /// Join path segments onto `api_base_url`, percent-encoding each one.
    pub(crate) fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = parse_http_url("api_base_url", &self.api_base_url)?;
        url.path_segments_mut()
            .map_err(|()| Error::Configuration("api_base_url cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

pub(crate) fn parse_http_url(name: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value.trim())
        .map_err(|e| Error::Configuration(format!("{name} is not a valid URL ({value}): {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::Configuration(format!(
            "{name} must use http or https, got: {other}"
        ))),
    }
}
