//! Spotify OAuth and Web API defaults
//!
//! These are public endpoint locations, not secrets. The client secret is
//! never compiled in; it is resolved at runtime (see `OAuthConfig`).

/// Authorization endpoint the user is redirected to for consent
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.spotify.com/authorize";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";

/// Web API base; `/me` and `/users/{id}/playlists` hang off this
pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Scopes requested at login. Profile and email are needed for `/me`.
pub const DEFAULT_SCOPES: &[&str] = &["user-read-private", "user-read-email"];

/// Description attached to playlists when the caller supplies none
pub const DEFAULT_PLAYLIST_DESCRIPTION: &str = "Created by spotify-reco";

/// Per-call timeout for outbound provider requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
