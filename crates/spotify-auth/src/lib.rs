//! Spotify OAuth2 authorization-code client
//!
//! Covers the four provider interactions of the login and playlist flow.
//! Callers own every token this crate returns; nothing is persisted.
//!
//! Flow:
//! 1. `build_authorization_url()` produces the login redirect
//! 2. The user consents on the provider's site, which redirects back with
//!    `code` (or `error`)
//! 3. `complete_authorization()` exchanges the code and fetches `/me`
//! 4. `create_playlist()` acts on the user's behalf with the access token
//! 5. `refresh_access_token()` renews an expired access token at any time
//!
//! All outbound calls go through the caller's `reqwest::Client` so that
//! connections are pooled, and each call carries `OAuthConfig::timeout`.

pub mod authorize;
pub mod config;
pub mod constants;
pub mod error;
mod http;
pub mod playlist;
pub mod session;
pub mod token;

#[cfg(test)]
mod test_support;

pub use authorize::{AuthorizationRequest, CallbackParams, build_authorization_url, generate_state};
pub use config::OAuthConfig;
pub use constants::*;
pub use error::{Error, Result, UpstreamFailure};
pub use playlist::{PlaylistCreationRequest, create_playlist};
pub use session::{AuthorizedSession, complete_authorization, fetch_profile};
pub use token::{TokenPair, exchange_code, refresh_access_token, refresh_token_payload};
