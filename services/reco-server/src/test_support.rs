//! Shared fixtures for router tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use common::Secret;
use integrations::{
    BoxFuture, EmotionClassifier, IntegrationError, Prediction, UploadSigner, rank_predictions,
};
use serde_json::Value;
use spotify_auth::OAuthConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::AppState;
use crate::metrics::ServiceMetrics;
use crate::supervisor::DatabaseHealth;

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub(crate) async fn spawn_provider(router: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Shared call counter for asserting how often a mock was hit.
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

/// Classifier returning four fixed labels, ranked by the real helper.
#[derive(Default)]
pub(crate) struct FakeClassifier {
    pub fail: bool,
    /// Held before answering, after the call is counted.
    pub delay: Duration,
    pub calls: Calls,
    pub last_url: Arc<Mutex<Option<String>>>,
}

impl EmotionClassifier for FakeClassifier {
    fn id(&self) -> &str {
        "fake-emotions"
    }

    fn classify<'a>(
        &'a self,
        image_url: &'a str,
        top_k: usize,
    ) -> BoxFuture<'a, integrations::Result<Vec<Prediction>>> {
        Box::pin(async move {
            self.calls.hit();
            *self.last_url.lock().unwrap() = Some(image_url.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(IntegrationError::Classifier("model offline".into()));
            }
            let raw = [("sad", 0.04), ("happy", 0.71), ("surprise", 0.1), ("neutral", 0.15)]
                .into_iter()
                .map(|(label, score)| Prediction {
                    label: label.into(),
                    score,
                })
                .collect();
            Ok(rank_predictions(raw, top_k))
        })
    }
}

type SignRequest = (String, String, Duration);

/// Signer producing `https://uploads.test/{key}?sig=fake`.
#[derive(Default)]
pub(crate) struct FakeSigner {
    pub fail: bool,
    pub last_request: Arc<Mutex<Option<SignRequest>>>,
}

impl UploadSigner for FakeSigner {
    fn presign_put<'a>(
        &'a self,
        key: &'a str,
        content_type: &'a str,
        expires_in: Duration,
    ) -> BoxFuture<'a, integrations::Result<String>> {
        Box::pin(async move {
            *self.last_request.lock().unwrap() =
                Some((key.to_string(), content_type.to_string(), expires_in));
            if self.fail {
                return Err(IntegrationError::Storage("no credentials".into()));
            }
            Ok(format!("https://uploads.test/{key}?sig=fake"))
        })
    }
}

/// OAuth config whose endpoints live under `base`.
pub(crate) fn oauth_for(base: &str) -> OAuthConfig {
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

pub(crate) fn test_state(base: &str) -> AppState {
    test_state_with(
        base,
        Arc::new(FakeClassifier::default()),
        Arc::new(FakeSigner::default()),
    )
}

pub(crate) fn test_state_with(
    base: &str,
    classifier: Arc<dyn EmotionClassifier>,
    uploads: Arc<dyn UploadSigner>,
) -> AppState {
    let (_tx, database) = watch::channel(DatabaseHealth::Connected);
    AppState {
        http: reqwest::Client::new(),
        oauth: Arc::new(oauth_for(base)),
        classifier,
        uploads,
        top_k: 3,
        upload_expiry: Duration::from_secs(3600),
        database,
        metrics: ServiceMetrics::new(),
        prometheus: metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle(),
    }
}

pub(crate) fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub(crate) fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub(crate) async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
