//! Emotion prediction and upload-URL routes

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use integrations::{IntegrationError, content_type_for, upload_object_key};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::AppState;
use crate::error::{ApiError, Error};
use crate::metrics;

/// Used when `/get-presigned-url` is called without `type`.
const DEFAULT_FILE_TYPE: &str = "jpg";

/// Longest accepted file extension.
const MAX_FILE_TYPE_LEN: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct PredictParams {
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

/// GET /predict: top emotion labels for the image at `imageUrl`.
#[instrument(skip_all, fields(request_id = %crate::new_request_id()))]
pub async fn predict(State(state): State<AppState>, Query(params): Query<PredictParams>) -> Response {
    let Some(image_url) = params.image_url.filter(|u| !u.trim().is_empty()) else {
        return ApiError::bad_request("Missing imageUrl").into_response();
    };

    let started = Instant::now();
    let result = state.classifier.classify(image_url.trim(), state.top_k).await;
    metrics::record_upstream_duration("classify", started.elapsed().as_secs_f64());

    match result {
        Ok(predictions) => {
            info!(
                model = state.classifier.id(),
                top = predictions.first().map(|p| p.label.as_str()).unwrap_or("<none>"),
                "image classified"
            );
            Json(predictions).into_response()
        }
        Err(IntegrationError::InvalidInput(message)) => {
            warn!(%message, "rejected image URL");
            ApiError::bad_request(message).into_response()
        }
        Err(e) => {
            let err = Error::from_classifier(e);
            metrics::record_upstream_error("classify", err.kind());
            error!(error = %err, "classification failed");
            ApiError::internal(err.to_string()).into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PresignParams {
    #[serde(rename = "type")]
    pub file_type: Option<String>,
}

/// Accept short alphanumeric extensions only; the value lands in both the
/// object key and the signed content type.
fn file_type(params: PresignParams) -> Result<String, ApiError> {
    let file_type = params
        .file_type
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string());

    if file_type.len() > MAX_FILE_TYPE_LEN || !file_type.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(ApiError::bad_request(format!(
            "type must be 1-{MAX_FILE_TYPE_LEN} alphanumeric characters"
        )));
    }
    Ok(file_type)
}

/// GET /get-presigned-url: time-limited PUT URL for a new image upload.
#[instrument(skip_all, fields(request_id = %crate::new_request_id()))]
pub async fn presigned_url(
    State(state): State<AppState>,
    Query(params): Query<PresignParams>,
) -> Response {
    let file_type = match file_type(params) {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };

    let millis = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis(),
        Err(e) => {
            error!(error = %e, "system clock before unix epoch");
            return ApiError::internal("system clock error").into_response();
        }
    };
    let key = upload_object_key(&file_type, millis);
    let content_type = content_type_for(&file_type);

    let started = Instant::now();
    let result = state
        .uploads
        .presign_put(&key, &content_type, state.upload_expiry)
        .await;
    metrics::record_upstream_duration("presign", started.elapsed().as_secs_f64());

    match result {
        Ok(url) => {
            info!(key = %key, content_type = %content_type, "upload URL issued");
            Json(json!({ "url": url, "fileName": key })).into_response()
        }
        Err(e) => {
            let err = Error::from_signer(e);
            metrics::record_upstream_error("presign", err.kind());
            error!(error = %err, "presigning failed");
            ApiError::internal(err.to_string()).into_response()
        }
    }
}
