//! OAuth login, callback, token refresh and playlist creation routes
//!
//! Status policy:
//! - `/callback`: denial or missing code → 400, any provider failure → 500
//! - `/refresh_token`: any failure → 400
//! - `/create-playlist`: missing fields → 400, provider rejection → the
//!   provider's status, timeout → 504, other transport failure → 502

use std::time::Instant;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use spotify_auth::{
    CallbackParams, PlaylistCreationRequest, build_authorization_url, complete_authorization,
    create_playlist, generate_state, refresh_token_payload,
};
use tracing::{error, info, instrument, warn};

use crate::AppState;
use crate::error::{ApiError, passthrough_status};
use crate::metrics;

/// Metric label for the provider call that produced `err`.
fn operation(err: &spotify_auth::Error) -> &'static str {
    match err {
        spotify_auth::Error::TokenExchange(_) => "token_exchange",
        spotify_auth::Error::TokenRefresh(_) => "token_refresh",
        spotify_auth::Error::ProfileFetch(_) => "profile_fetch",
        spotify_auth::Error::PlaylistCreation(_) => "playlist_create",
        _ => "local",
    }
}

/// Record duration and, for provider-side failures, the error kind.
fn observe<T>(operation_label: &'static str, started: Instant, result: &spotify_auth::Result<T>) {
    metrics::record_upstream_duration(operation_label, started.elapsed().as_secs_f64());
    if let Err(e) = result {
        if e.upstream().is_some() {
            metrics::record_upstream_error(operation(e), e.kind());
        }
    }
}

/// Details for a failure: the provider payload when there is one,
/// otherwise the error message.
fn details(err: &spotify_auth::Error) -> Value {
    err.details().unwrap_or_else(|| Value::String(err.to_string()))
}

/// GET /login: redirect to the provider's consent page.
#[instrument(skip_all, fields(request_id = %crate::new_request_id()))]
pub async fn login(State(state): State<AppState>) -> Response {
    let request = state.oauth.authorization_request(Some(generate_state()));
    match build_authorization_url(&state.oauth.authorize_endpoint, &request) {
        Ok(url) => (StatusCode::FOUND, [(LOCATION, url)]).into_response(),
        Err(e) => {
            error!(error = %e, "failed to build authorization URL");
            ApiError::internal("Failed to build authorization URL").into_response()
        }
    }
}

/// GET /callback: exchange the authorization code and fetch the profile.
#[instrument(skip_all, fields(request_id = %crate::new_request_id()))]
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(reason) = params.error.as_deref().filter(|r| !r.is_empty()) {
        warn!(reason, "authorization denied by user or provider");
        return ApiError::bad_request("Spotify authorization failed")
            .with_details(Some(Value::String(reason.to_string())))
            .into_response();
    }

    let started = Instant::now();
    let result = complete_authorization(&state.http, &state.oauth, &params).await;
    observe("authorization", started, &result);

    match result {
        Ok(session) => {
            info!("authorization completed");
            let tokens = session.token_pair;
            Json(json!({
                "access_token": tokens.access_token,
                "refresh_token": tokens.refresh_token,
                "expires_in": tokens.expires_in,
                "user": session.profile,
            }))
            .into_response()
        }
        Err(e @ spotify_auth::Error::Validation(_)) => ApiError::bad_request(e.to_string())
            .into_response(),
        Err(e) => {
            error!(error = %e, kind = e.kind(), "authorization failed");
            ApiError::internal("Failed to authenticate with Spotify")
                .with_details(Some(details(&e)))
                .into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshParams {
    pub refresh_token: Option<String>,
}

/// GET /refresh_token: trade a refresh token for a new access token.
///
/// The provider payload is returned as received; it carries a new
/// `refresh_token` only when the provider rotated it.
#[instrument(skip_all, fields(request_id = %crate::new_request_id()))]
pub async fn refresh_token(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> Response {
    let token = params.refresh_token.unwrap_or_default();

    let started = Instant::now();
    let result = refresh_token_payload(&state.http, &state.oauth, &token).await;
    observe("token_refresh", started, &result);

    match result {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => {
            warn!(error = %e, kind = e.kind(), "token refresh failed");
            ApiError::bad_request("Invalid refresh token")
                .with_details(Some(details(&e)))
                .into_response()
        }
    }
}

/// Body of `POST /create-playlist`. Every field is optional at the JSON
/// layer so that missing ones surface as a single validation error.
#[derive(Debug, Default, Deserialize)]
pub struct CreatePlaylistBody {
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub public: Option<bool>,
}

impl From<CreatePlaylistBody> for PlaylistCreationRequest {
    fn from(body: CreatePlaylistBody) -> Self {
        Self {
            access_token: body.access_token.unwrap_or_default(),
            user_id: body.user_id.unwrap_or_default(),
            name: body.name.unwrap_or_default(),
            description: body.description,
            public: body.public,
        }
    }
}

/// POST /create-playlist: create a playlist for the given user.
#[instrument(skip_all, fields(request_id = %crate::new_request_id()))]
pub async fn create_playlist_handler(
    State(state): State<AppState>,
    body: Result<Json<CreatePlaylistBody>, JsonRejection>,
) -> Response {
    let request: PlaylistCreationRequest = match body {
        Ok(Json(body)) => body.into(),
        Err(rejection) => {
            return ApiError::new(rejection.status(), "Invalid request body")
                .with_details(Some(Value::String(rejection.body_text())))
                .into_response();
        }
    };

    if let Err(e) = request.validate() {
        return ApiError::bad_request(e.to_string()).into_response();
    }

    let started = Instant::now();
    let result = create_playlist(&state.http, &state.oauth, &request).await;
    observe("playlist_create", started, &result);

    match result {
        Ok(playlist) => Json(json!({ "success": true, "playlist": playlist })).into_response(),
        Err(e) => {
            let status = passthrough_status(&e);
            error!(error = %e, kind = e.kind(), status = status.as_u16(), "playlist creation failed");
            ApiError::new(status, "Failed to create playlist")
                .with_details(Some(details(&e)))
                .into_response()
        }
    }
}
