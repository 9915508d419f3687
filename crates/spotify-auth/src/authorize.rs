//! Authorization redirect construction
//!
//! Builds the provider login URL the user is sent to. Pure: no I/O, and the
//! same request always produces the same URL.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use serde::Deserialize;

use crate::config::parse_http_url;
use crate::error::{Error, Result};

/// One login attempt. Not persisted; consumed to build the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    /// Requested scopes, in order. Duplicates are dropped when serialized.
    pub scopes: Vec<String>,
    pub show_dialog: bool,
    pub state: Option<String>,
}

impl AuthorizationRequest {
    /// Scopes joined with a single space, first occurrence wins.
    pub fn scope_string(&self) -> String {
        let mut seen: Vec<&str> = Vec::with_capacity(self.scopes.len());
        for scope in self.scopes.iter().map(|s| s.trim()) {
            if !scope.is_empty() && !seen.contains(&scope) {
                seen.push(scope);
            }
        }
        seen.join(" ")
    }
}

/// Build the full authorization URL.
///
/// Query parameters are emitted in a fixed order: `client_id`,
/// `response_type`, `redirect_uri`, `scope`, `show_dialog`, then `state`
/// when present.
pub fn build_authorization_url(endpoint: &str, request: &AuthorizationRequest) -> Result<String> {
    if request.client_id.trim().is_empty() {
        return Err(Error::Configuration("client_id is required".into()));
    }
    if request.redirect_uri.trim().is_empty() {
        return Err(Error::Configuration("redirect_uri is required".into()));
    }

    let mut url = parse_http_url("authorize_endpoint", endpoint)?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair("client_id", &request.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &request.redirect_uri)
            .append_pair("scope", &request.scope_string())
            .append_pair(
                "show_dialog",
                if request.show_dialog { "true" } else { "false" },
            );
        if let Some(state) = &request.state {
            pairs.append_pair("state", state);
        }
    }
    Ok(url.into())
}

/// Random opaque `state` value for the authorization request.
///
/// 16 random bytes, URL-safe base64 without padding (22 characters).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Query parameters the provider appends when redirecting back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub state: Option<String>,
}

impl CallbackParams {
    /// The authorization code, or why the exchange must not be attempted.
    ///
    /// A non-empty `error` parameter always wins over a `code`; an empty
    /// one counts as absent.
    pub fn authorization_code(&self) -> Result<&str> {
        if let Some(error) = self.error.as_deref().filter(|e| !e.is_empty()) {
            return Err(Error::AuthorizationDenied(error.to_string()));
        }
        match self.code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Ok(code),
            _ => Err(Error::Validation("missing authorization code".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const ENDPOINT: &str = "https://accounts.spotify.com/authorize";

    fn request() -> AuthorizationRequest {
        AuthorizationRequest {
            client_id: "client-123".into(),
            redirect_uri: "http://localhost:3000/callback?source=app".into(),
            scopes: vec!["user-read-private".into(), "user-read-email".into()],
            show_dialog: true,
            state: Some("st-42".into()),
        }
    }

    fn query_of(url: &str) -> HashMap<String, String> {
        url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn url_round_trips_every_parameter() {
        let request = request();
        let url = build_authorization_url(ENDPOINT, &request).unwrap();
        assert!(url.starts_with(ENDPOINT));

        let query = query_of(&url);
        assert_eq!(query.len(), 6);
        assert_eq!(query["client_id"], request.client_id);
        assert_eq!(query["redirect_uri"], request.redirect_uri);
        assert_eq!(query["scope"], "user-read-private user-read-email");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["show_dialog"], "true");
        assert_eq!(query["state"], "st-42");
    }

    #[test]
    fn url_is_deterministic_and_ordered() {
        let a = build_authorization_url(ENDPOINT, &request()).unwrap();
        let b = build_authorization_url(ENDPOINT, &request()).unwrap();
        assert_eq!(a, b);

        let keys: Vec<String> = url::Url::parse(&a)
            .unwrap()
            .query_pairs()
            .map(|(k, _)| k.into_owned())
            .collect();
        assert_eq!(
            keys,
            ["client_id", "response_type", "redirect_uri", "scope", "show_dialog", "state"]
        );
    }

    #[test]
    fn scopes_are_space_joined_and_deduplicated() {
        let mut request = request();
        request.scopes = vec![
            "playlist-modify-public".into(),
            "user-read-email".into(),
            "playlist-modify-public".into(),
            " ".into(),
        ];
        assert_eq!(
            request.scope_string(),
            "playlist-modify-public user-read-email"
        );
        let url = build_authorization_url(ENDPOINT, &request).unwrap();
        assert!(url.contains("scope=playlist-modify-public+user-read-email"), "got: {url}");
    }

    #[test]
    fn state_is_omitted_when_absent() {
        let mut request = request();
        request.state = None;
        request.show_dialog = false;
        let query = query_of(&build_authorization_url(ENDPOINT, &request).unwrap());
        assert!(!query.contains_key("state"));
        assert_eq!(query["show_dialog"], "false");
    }

    #[test]
    fn missing_client_id_or_redirect_is_configuration_error() {
        let mut request = request();
        request.client_id = String::new();
        assert!(matches!(
            build_authorization_url(ENDPOINT, &request),
            Err(Error::Configuration(_))
        ));

        let mut request = self::request();
        request.redirect_uri = " ".into();
        assert!(matches!(
            build_authorization_url(ENDPOINT, &request),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn invalid_endpoint_is_configuration_error() {
        assert!(matches!(
            build_authorization_url("not a url", &request()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn generated_state_is_url_safe_and_unique() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 22);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "state must be URL-safe: {a}"
        );
        assert_ne!(a, b);
    }

    #[test]
    fn callback_error_wins_over_code() {
        let params = CallbackParams {
            code: Some("abc".into()),
            error: Some("access_denied".into()),
            state: None,
        };
        assert!(matches!(
            params.authorization_code(),
            Err(Error::AuthorizationDenied(ref e)) if e == "access_denied"
        ));
    }

    #[test]
    fn empty_callback_error_counts_as_absent() {
        let params = CallbackParams {
            code: Some("abc".into()),
            error: Some(String::new()),
            state: None,
        };
        assert_eq!(params.authorization_code().unwrap(), "abc");
    }

    #[test]
    fn callback_without_code_is_validation_error() {
        let params = CallbackParams::default();
        assert!(matches!(
            params.authorization_code(),
            Err(Error::Validation(_))
        ));

        let params = CallbackParams {
            code: Some("auth-code".into()),
            ..Default::default()
        };
        assert_eq!(params.authorization_code().unwrap(), "auth-code");
    }
}
