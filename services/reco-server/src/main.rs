//! spotify-reco backend
//!
//! Single-binary service that:
//! 1. Classifies the emotion in a face image (`/predict`)
//! 2. Issues presigned upload URLs for images (`/get-presigned-url`)
//! 3. Runs the Spotify authorization-code flow and creates playlists
//!    (`/login`, `/callback`, `/refresh_token`, `/create-playlist`)
//! 4. Supervises database liveness in the background (`/health`)

mod config;
mod error;
mod media;
mod metrics;
mod spotify;
mod supervisor;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{MatchedPath, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use integrations::{EmotionClassifier, HttpClassifier, S3UploadSigner, TcpProbe, UploadSigner};
use metrics_exporter_prometheus::PrometheusHandle;
use spotify_auth::OAuthConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::metrics::ServiceMetrics;
use crate::supervisor::{DatabaseHealth, spawn_supervisor};

/// Graceful shutdown budget for in-flight requests.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Preflight responses may be cached for a day.
const CORS_MAX_AGE: Duration = Duration::from_secs(86400);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    http: reqwest::Client,
    oauth: Arc<OAuthConfig>,
    classifier: Arc<dyn EmotionClassifier>,
    uploads: Arc<dyn UploadSigner>,
    top_k: usize,
    upload_expiry: Duration,
    database: watch::Receiver<DatabaseHealth>,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

/// Fresh request id for log correlation.
fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(CORS_MAX_AGE)
}

/// Build the axum router with all routes and shared state.
///
/// API routes are counted in `requests_served`/`errors_total`; the
/// operational endpoints are not. A concurrency limit layer bounds
/// in-flight requests at `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let api = Router::new()
        .route("/login", get(spotify::login))
        .route("/callback", get(spotify::callback))
        .route("/refresh_token", get(spotify::refresh_token))
        .route("/create-playlist", post(spotify::create_playlist_handler))
        .route("/predict", get(media::predict))
        .route("/get-presigned-url", get(media::presigned_url))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_requests));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api)
        .layer(cors_layer())
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting spotify-reco");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let oauth = config.oauth_config().context("invalid OAuth configuration")?;

    info!(
        listen_addr = %config.server.listen_addr,
        client_id = %oauth.client_id,
        redirect_uri = %oauth.redirect_uri,
        model = %config.classifier.model,
        bucket = %config.storage.bucket,
        "configuration loaded"
    );

    let http = reqwest::Client::new();

    let classifier = HttpClassifier::new(
        http.clone(),
        config.classifier.model.clone(),
        config.classifier.endpoint.clone(),
        config.classifier.api_token.clone(),
        Duration::from_secs(config.classifier.timeout_secs),
    );
    let uploads =
        S3UploadSigner::from_env(config.storage.bucket.clone(), config.storage.region.clone())
            .await;

    let database_url = config
        .database
        .url
        .as_ref()
        .context("database URL not configured")?;
    let probe = TcpProbe::from_connection_string(
        database_url.expose(),
        Duration::from_secs(config.database.probe_timeout_secs),
    )
    .context("invalid database connection string")?;

    let (supervisor_stop_tx, supervisor_stop_rx) = watch::channel(false);
    let (database, supervisor_task) = spawn_supervisor(
        Arc::new(probe),
        Duration::from_secs(config.database.probe_interval_secs),
        supervisor_stop_rx,
    );

    let metrics = ServiceMetrics::new();
    let app_state = AppState {
        http,
        oauth: Arc::new(oauth),
        classifier: Arc::new(classifier),
        uploads: Arc::new(uploads),
        top_k: config.classifier.top_k,
        upload_expiry: Duration::from_secs(config.storage.upload_expiry_secs),
        database,
        metrics: metrics.clone(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    let in_flight = metrics.in_flight.clone();

    // The drain timer starts at signal receipt, not at server start: the
    // server is told to drain, then raced against DRAIN_TIMEOUT.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    let _ = shutdown_tx.send(());
    let _ = supervisor_stop_tx.send(true);

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    if tokio::time::timeout(DRAIN_TIMEOUT, supervisor_task)
        .await
        .is_err()
    {
        warn!("database supervisor did not stop in time");
    }

    info!("shutdown complete");
    Ok(())
}

async fn root_handler() -> &'static str {
    "Server is running spotify-reco"
}

/// Count API requests and record `http_requests_total` by matched route.
async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let in_flight = state.metrics.track_in_flight();
    let response = next.run(request).await;
    drop(in_flight);

    let status = response.status();
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    if status.is_client_error() || status.is_server_error() {
        state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
    }
    metrics::record_request(&route, status.as_u16());
    response
}

/// Health endpoint: JSON with status, database state, uptime, request counts.
/// Returns 200 when the database is reachable, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.metrics.started_at.elapsed().as_secs();
    let requests = state.metrics.requests_total.load(Ordering::Relaxed);
    let errors = state.metrics.errors_total.load(Ordering::Relaxed);
    let database = state.database.borrow().clone();

    let (status_code, status) = if database.is_connected() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let mut body = serde_json::json!({
        "status": status,
        "database": database.label(),
        "uptime_seconds": uptime,
        "requests_served": requests,
        "errors_total": errors,
    });
    if !database.is_connected() {
        body["database_detail"] = serde_json::json!(database);
    }

    (
        status_code,
        [(CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        FakeClassifier, FakeSigner, body_json, get, test_state, test_state_with,
    };
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    fn state_with_database(health: DatabaseHealth) -> AppState {
        let mut state = test_state("http://127.0.0.1:1");
        state.database = watch::channel(health).1;
        state
    }

    #[tokio::test]
    async fn root_reports_running() {
        let app = build_router(test_state("http://unused"), 1000);
        let response = app.oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Server is running spotify-reco");
    }

    #[tokio::test]
    async fn health_endpoint_returns_json_when_connected() {
        let state = state_with_database(DatabaseHealth::Connected);
        state.metrics.requests_total.fetch_add(5, Ordering::Relaxed);

        let response = build_router(state, 1000)
            .oneshot(get("/health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["database"], "connected");
        assert_eq!(json["requests_served"], 5);
        assert!(json["uptime_seconds"].is_u64());
        assert!(json.get("database_detail").is_none());
    }

    #[tokio::test]
    async fn health_endpoint_degraded_while_reconnecting() {
        let state = state_with_database(DatabaseHealth::Reconnecting {
            failures: 3,
            last_error: "database unreachable: db:27017".into(),
        });

        let response = build_router(state, 1000)
            .oneshot(get("/health"))
            .await
            .unwrap();

        assert_eq!(
            response.status(),
            StatusCode::SERVICE_UNAVAILABLE,
            "health endpoint must return 503 when the database is not connected"
        );
        let json = body_json(response).await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["database"], "disconnected");
        assert_eq!(json["database_detail"]["state"], "reconnecting");
        assert_eq!(json["database_detail"]["failures"], 3);
    }

    #[tokio::test]
    async fn health_endpoint_degraded_before_first_probe() {
        let state = state_with_database(DatabaseHealth::Connecting);
        let response = build_router(state, 1000)
            .oneshot(get("/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["database"], "connecting");
    }

    #[tokio::test]
    async fn api_requests_are_counted() {
        let state = test_state("http://unused");
        let metrics = state.metrics.clone();
        let app = build_router(state, 1000);

        app.clone().oneshot(get("/predict")).await.unwrap();
        app.clone()
            .oneshot(get("/get-presigned-url?type=png"))
            .await
            .unwrap();
        app.oneshot(get("/health")).await.unwrap();

        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 2);
        assert_eq!(
            metrics.errors_total.load(Ordering::Relaxed),
            1,
            "the 400 from /predict counts as an error"
        );
        assert_eq!(metrics.in_flight.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn cancelled_request_leaves_no_in_flight_count() {
        let classifier = FakeClassifier {
            delay: Duration::from_secs(30),
            ..Default::default()
        };
        let calls = classifier.calls.clone();
        let state = test_state_with(
            "http://unused",
            Arc::new(classifier),
            Arc::new(FakeSigner::default()),
        );
        let metrics = state.metrics.clone();
        let app = build_router(state, 1000);

        let pending = app.oneshot(get("/predict?imageUrl=https://cdn.example.com/face.jpg"));
        let outcome = tokio::time::timeout(Duration::from_millis(50), pending).await;

        assert!(outcome.is_err(), "request should still be running");
        assert_eq!(calls.count(), 1);
        assert_eq!(
            metrics.in_flight.load(Ordering::Relaxed),
            0,
            "dropping the request must release its in-flight slot"
        );
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let app = build_router(test_state("http://unused"), 1000);
        let response = app.oneshot(get("/metrics")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }

    #[tokio::test]
    async fn cors_preflight_allows_any_origin() {
        let app = build_router(test_state("http://unused"), 1000);
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("OPTIONS")
                    .uri("/create-playlist")
                    .header("origin", "https://app.example.com")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-max-age"], "86400");
        let methods = headers["access-control-allow-methods"].to_str().unwrap();
        for method in ["GET", "POST", "PUT", "DELETE"] {
            assert!(methods.contains(method), "missing {method} in {methods}");
        }
    }

    #[tokio::test]
    async fn cors_header_on_simple_request() {
        let app = build_router(test_state("http://unused"), 1000);
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header("origin", "https://app.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let app = build_router(test_state("http://unused"), 1000);
        let response = app.oneshot(get("/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn request_ids_are_prefixed_and_unique() {
        let a = new_request_id();
        let b = new_request_id();
        assert!(a.starts_with("req_"));
        assert_eq!(a.len(), 4 + 32);
        assert_ne!(a, b);
    }
}
