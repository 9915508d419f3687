//! Completing the authorization flow: code exchange followed by profile fetch

use serde_json::Value;
use tracing::{instrument, warn};

use crate::authorize::CallbackParams;
use crate::config::OAuthConfig;
use crate::error::{Error, Result};
use crate::http::send_json;
use crate::token::{TokenPair, exchange_code};

/// Outcome of a completed login: fresh tokens plus the user's profile.
#[derive(Debug, Clone)]
pub struct AuthorizedSession {
    pub token_pair: TokenPair,
    /// Provider's `/me` object, unmodified.
    pub profile: Value,
}

/// Handle the provider's redirect back to us.
///
/// If the callback carries `error`, no network call is made and
/// `AuthorizationDenied` is returned. Otherwise the code is exchanged and
/// the profile fetched with the new access token. A profile failure fails
/// the whole call with `ProfileFetch`, even though the exchange itself
/// succeeded and its tokens are dropped.
#[instrument(skip_all)]
pub async fn complete_authorization(
    client: &reqwest::Client,
    config: &OAuthConfig,
    callback: &CallbackParams,
) -> Result<AuthorizedSession> {
    let code = callback.authorization_code().inspect_err(|e| {
        if let Error::AuthorizationDenied(reason) = e {
            warn!(reason, "provider reported authorization failure");
        }
    })?;

    let token_pair = exchange_code(client, config, code).await?;
    let profile = fetch_profile(client, config, &token_pair.access_token).await?;

    Ok(AuthorizedSession {
        token_pair,
        profile,
    })
}

/// Fetch the current user's profile (`GET {api_base_url}/me`).
#[instrument(skip_all)]
pub async fn fetch_profile(
    client: &reqwest::Client,
    config: &OAuthConfig,
    access_token: &str,
) -> Result<Value> {
    if access_token.trim().is_empty() {
        return Err(Error::Validation("missing access_token".into()));
    }

    let url = config.api_url(&["me"])?;
    let request = client
        .get(url)
        .timeout(config.timeout)
        .bearer_auth(access_token);

    send_json("profile_fetch", request).await.map_err(|failure| {
        warn!(error = %failure, "profile fetch failed");
        Error::ProfileFetch(failure)
    })
}
