//! Shared outbound request handling

use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use crate::error::UpstreamFailure;

/// Send a prepared request and decode the body as JSON.
///
/// Non-2xx statuses become `Rejected` with the payload preserved; empty
/// bodies decode to `Value::Null` and non-JSON bodies to a JSON string.
pub(crate) async fn send_json(
    operation: &'static str,
    request: reqwest::RequestBuilder,
) -> std::result::Result<Value, UpstreamFailure> {
    let started = Instant::now();
    let response = request
        .send()
        .await
        .map_err(|e| UpstreamFailure::from_reqwest(&e))?;

    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| UpstreamFailure::from_reqwest(&e))?;
    let body = decode_body(&bytes);

    debug!(
        operation,
        status = status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "provider responded"
    );

    if !status.is_success() {
        return Err(UpstreamFailure::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
