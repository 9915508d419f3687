//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Credentials (Spotify client secret, database URL, inference token) are
//! loaded from env vars or `*_file` paths, never stored in the TOML itself.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::{Secret, resolve_secret};
use serde::Deserialize;
use spotify_auth::OAuthConfig;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// OAuth client registration and provider endpoints
#[derive(Debug, Deserialize)]
pub struct SpotifyConfig {
    /// Overridden by `SPOTIFY_CLIENT_ID`.
    #[serde(default)]
    pub client_id: String,
    /// Overridden by `REDIRECT_URI`.
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to SPOTIFY_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub show_dialog: bool,
    #[serde(default = "default_oauth_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub authorize_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

/// Emotion classifier inference endpoint
#[derive(Debug, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_inference_endpoint")]
    pub endpoint: String,
    #[serde(skip)]
    pub api_token: Option<Secret<String>>,
    #[serde(default)]
    pub api_token_file: Option<PathBuf>,
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Object storage for presigned uploads
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Overridden by `AWS_S3_BUCKET`.
    #[serde(default)]
    pub bucket: String,
    /// Falls back to `AWS_REGION` / the AWS profile when unset.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_upload_expiry")]
    pub upload_expiry_secs: u64,
}

/// Document database liveness supervision
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(skip)]
    pub url: Option<Secret<String>>,
    #[serde(default)]
    pub url_file: Option<PathBuf>,
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_inference_endpoint(),
            api_token: None,
            api_token_file: None,
            timeout_secs: default_classifier_timeout(),
            top_k: default_top_k(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: None,
            upload_expiry_secs: default_upload_expiry(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            url_file: None,
            probe_interval_secs: default_probe_interval(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_max_connections() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_oauth_timeout() -> u64 {
    spotify_auth::DEFAULT_TIMEOUT_SECS
}

fn default_model() -> String {
    "facial_emotions_image_detection".into()
}

fn default_inference_endpoint() -> String {
    "https://api-inference.huggingface.co/models/dima806/facial_emotions_image_detection".into()
}

fn default_classifier_timeout() -> u64 {
    30
}

fn default_top_k() -> usize {
    3
}

fn default_upload_expiry() -> u64 {
    3600
}

fn default_probe_interval() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    5
}

/// S3 caps presigned URLs at seven days.
const MAX_UPLOAD_EXPIRY_SECS: u64 = 7 * 24 * 3600;

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret resolution order (each): env var, then the `*_file` path.
    /// The Spotify client secret and database URL are required.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Some(id) = non_empty_env("SPOTIFY_CLIENT_ID") {
            config.spotify.client_id = id;
        }
        if let Some(uri) = non_empty_env("REDIRECT_URI") {
            config.spotify.redirect_uri = uri;
        }
        if let Some(bucket) = non_empty_env("AWS_S3_BUCKET") {
            config.storage.bucket = bucket;
        }

        config.spotify.client_secret = resolve_secret(
            "SPOTIFY_CLIENT_SECRET",
            config.spotify.client_secret_file.as_deref(),
        )?;
        if config.spotify.client_secret.is_none() {
            return Err(common::Error::MissingSecret(
                "SPOTIFY_CLIENT_SECRET or spotify.client_secret_file".into(),
            ));
        }

        config.database.url = resolve_secret("DATABASE_URL", config.database.url_file.as_deref())?;
        if config.database.url.is_none() {
            return Err(common::Error::MissingSecret(
                "DATABASE_URL or database.url_file".into(),
            ));
        }

        config.classifier.api_token = resolve_secret(
            "INFERENCE_API_TOKEN",
            config.classifier.api_token_file.as_deref(),
        )?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        self.oauth_config()?
            .validate()
            .map_err(|e| common::Error::Config(e.to_string()))?;

        if !self.classifier.endpoint.starts_with("http://")
            && !self.classifier.endpoint.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "classifier.endpoint must start with http:// or https://, got: {}",
                self.classifier.endpoint
            )));
        }
        if self.classifier.timeout_secs == 0 {
            return Err(common::Error::Config(
                "classifier.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.classifier.top_k == 0 {
            return Err(common::Error::Config(
                "classifier.top_k must be greater than 0".into(),
            ));
        }

        if self.storage.bucket.trim().is_empty() {
            return Err(common::Error::Config(
                "storage.bucket is required (or set AWS_S3_BUCKET)".into(),
            ));
        }
        if !(1..=MAX_UPLOAD_EXPIRY_SECS).contains(&self.storage.upload_expiry_secs) {
            return Err(common::Error::Config(format!(
                "storage.upload_expiry_secs must be between 1 and {MAX_UPLOAD_EXPIRY_SECS}"
            )));
        }

        if self.database.probe_interval_secs == 0 || self.database.probe_timeout_secs == 0 {
            return Err(common::Error::Config(
                "database probe interval and timeout must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// OAuth client config with any endpoint overrides applied.
    pub fn oauth_config(&self) -> common::Result<OAuthConfig> {
        let secret = self.spotify.client_secret.clone().ok_or_else(|| {
            common::Error::MissingSecret("SPOTIFY_CLIENT_SECRET or spotify.client_secret_file".into())
        })?;

        let mut oauth = OAuthConfig::new(
            self.spotify.client_id.trim(),
            secret,
            self.spotify.redirect_uri.trim(),
        );
        if let Some(scopes) = &self.spotify.scopes {
            oauth.scopes = scopes.clone();
        }
        if let Some(endpoint) = &self.spotify.authorize_endpoint {
            oauth.authorize_endpoint = endpoint.clone();
        }
        if let Some(endpoint) = &self.spotify.token_endpoint {
            oauth.token_endpoint = endpoint.clone();
        }
        if let Some(base) = &self.spotify.api_base_url {
            oauth.api_base_url = base.clone();
        }
        oauth.show_dialog = self.spotify.show_dialog;
        oauth.timeout = Duration::from_secs(self.spotify.timeout_secs);
        Ok(oauth)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("spotify-reco.toml")
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
