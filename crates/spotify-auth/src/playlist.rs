//! Playlist creation on behalf of an authorized user

use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::config::OAuthConfig;
use crate::constants::DEFAULT_PLAYLIST_DESCRIPTION;
use crate::error::{Error, Result};
use crate::http::send_json;

/// One-shot playlist creation request.
#[derive(Clone, Default)]
pub struct PlaylistCreationRequest {
    pub access_token: String,
    pub user_id: String,
    pub name: String,
    /// Defaults to [`DEFAULT_PLAYLIST_DESCRIPTION`].
    pub description: Option<String>,
    /// Defaults to `true`.
    pub public: Option<bool>,
}

impl std::fmt::Debug for PlaylistCreationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistCreationRequest")
            .field("access_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("public", &self.public)
            .finish()
    }
}

impl PlaylistCreationRequest {
    /// Reject blank required fields, naming all of them at once.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("access_token", &self.access_token),
            ("user_id", &self.user_id),
            ("name", &self.name),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }

    fn body(&self) -> Value {
        json!({
            "name": self.name,
            "description": self
                .description
                .as_deref()
                .unwrap_or(DEFAULT_PLAYLIST_DESCRIPTION),
            "public": self.public.unwrap_or(true),
        })
    }
}

/// Create a playlist owned by `request.user_id`.
///
/// Returns the provider's playlist object unchanged. Provider errors keep
/// their status and body for pass-through; there is no retry.
#[instrument(skip_all, fields(user_id = %request.user_id))]
pub async fn create_playlist(
    client: &reqwest::Client,
    config: &OAuthConfig,
    request: &PlaylistCreationRequest,
) -> Result<Value> {
    request.validate()?;

    let url = config.api_url(&["users", request.user_id.trim(), "playlists"])?;
    let outbound = client
        .post(url)
        .timeout(config.timeout)
        .bearer_auth(request.access_token.trim())
        .json(&request.body());

    let playlist = send_json("playlist_create", outbound)
        .await
        .map_err(|failure| {
            warn!(error = %failure, "playlist creation failed");
            Error::PlaylistCreation(failure)
        })?;

    let playlist_id = playlist
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("<none>");
    info!(playlist_id, "playlist created");
    Ok(playlist)
}
