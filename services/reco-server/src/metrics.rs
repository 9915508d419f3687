//! Prometheus metrics exposition
//!
//! - `http_requests_total` (counter): labels `route`, `status`
//! - `upstream_request_duration_seconds` (histogram): label `operation`
//! - `upstream_errors_total` (counter): labels `operation`, `kind`
//! - `database_connected` (gauge): 1 while the liveness probe succeeds

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// In-process counters reported by `/health`.
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Requests currently being handled; logged if the shutdown drain
    /// deadline expires.
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    /// Count a request as in flight until the returned guard is dropped,
    /// including when the client disconnects and the handler is cancelled.
    pub fn track_in_flight(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard(self.in_flight.clone())
    }
}

pub struct InFlightGuard(Arc<AtomicU64>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Upstream calls range from sub-10ms presigning to the 30s classifier
/// timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("upstream_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `upstream_request_duration_seconds` gets explicit buckets so it renders
/// as a histogram (`_bucket` lines) rather than a summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed inbound request.
pub fn record_request(route: &str, status: u16) {
    metrics::counter!("http_requests_total", "route" => route.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record the latency of one outbound call.
pub fn record_upstream_duration(operation: &'static str, duration_secs: f64) {
    metrics::histogram!("upstream_request_duration_seconds", "operation" => operation)
        .record(duration_secs);
}

/// Record a failed outbound call with a classification label.
pub fn record_upstream_error(operation: &'static str, kind: &'static str) {
    metrics::counter!("upstream_errors_total", "operation" => operation, "kind" => kind)
        .increment(1);
}

pub fn set_database_connected(connected: bool) {
    metrics::gauge!("database_connected").set(if connected { 1.0 } else { 0.0 });
}

#[cfg(test)]
pub(crate) fn isolated_recorder() -> (
    metrics_exporter_prometheus::PrometheusRecorder,
    PrometheusHandle,
) {
    let recorder = builder()
        .expect("failed to set histogram buckets")
        .build_recorder();
    let handle = recorder.handle();
    (recorder, handle)
}
