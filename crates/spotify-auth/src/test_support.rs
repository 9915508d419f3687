//! In-process mock provider for unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::Secret;
use tokio::net::TcpListener;

use crate::config::OAuthConfig;

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub(crate) async fn spawn_provider(router: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Config whose token and API endpoints live under `base`.
pub(crate) fn config_for(base: &str) -> OAuthConfig {
    let mut config = OAuthConfig::new(
        "client-123",
        Secret::new("secret-456".to_string()),
        "http://localhost:3000/callback",
    );
    config.authorize_endpoint = format!("{base}/authorize");
    config.token_endpoint = format!("{base}/api/token");
    config.api_base_url = format!("{base}/v1");
    config.timeout = Duration::from_secs(2);
    config
}

/// Shared call counter for asserting how often a mock route was hit.
#[derive(Clone, Default)]
pub(crate) struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub(crate) fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
