//! Facial-emotion classification via a hosted inference endpoint
//!
//! The image is downloaded first and its bytes are posted to the model
//! endpoint, which answers with `[{"label": .., "score": ..}, ..]` (the
//! Hugging Face image-classification response shape).

use std::time::Duration;

use common::Secret;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};

use crate::{BoxFuture, EmotionClassifier, IntegrationError, Prediction, Result, rank_predictions};

/// Largest image accepted for classification.
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub struct HttpClassifier {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    api_token: Option<Secret<String>>,
    timeout: Duration,
}

impl HttpClassifier {
    pub fn new(
        client: reqwest::Client,
        model: impl Into<String>,
        endpoint: impl Into<String>,
        api_token: Option<Secret<String>>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            endpoint: endpoint.into(),
            api_token,
            timeout,
        }
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn run(&self, image_url: &str, top_k: usize) -> Result<Vec<Prediction>> {
        let parsed = url::Url::parse(image_url)
            .map_err(|e| IntegrationError::InvalidInput(format!("imageUrl is not a URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(IntegrationError::InvalidInput(
                "imageUrl must use http or https".into(),
            ));
        }

        let image = self
            .client
            .get(parsed)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error("image download", &e))?;
        if !image.status().is_success() {
            return Err(IntegrationError::Classifier(format!(
                "image download returned {}",
                image.status()
            )));
        }
        let content_type = image
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = self.read_capped(image).await?;
        debug!(bytes = bytes.len(), content_type = %content_type, "image downloaded");

        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error("inference", &e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Classifier(format!(
                "inference endpoint returned {status}: {body}"
            )));
        }

        let predictions: Vec<Prediction> = response
            .json()
            .await
            .map_err(|e| IntegrationError::Classifier(format!("invalid inference response: {e}")))?;
        Ok(rank_predictions(predictions, top_k))
    }

    /// Read the image body, failing as soon as it passes `MAX_IMAGE_BYTES`.
    async fn read_capped(&self, mut image: reqwest::Response) -> Result<Vec<u8>> {
        if image
            .content_length()
            .is_some_and(|len| len > MAX_IMAGE_BYTES as u64)
        {
            return Err(image_too_large());
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = image
            .chunk()
            .await
            .map_err(|e| self.transport_error("image download", &e))?
        {
            if bytes.len() + chunk.len() > MAX_IMAGE_BYTES {
                return Err(image_too_large());
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    fn transport_error(&self, stage: &str, err: &reqwest::Error) -> IntegrationError {
        if err.is_timeout() {
            IntegrationError::Timeout(self.timeout)
        } else {
            IntegrationError::Classifier(format!("{stage} failed: {err}"))
        }
    }
}

fn image_too_large() -> IntegrationError {
    IntegrationError::InvalidInput(format!("image exceeds {MAX_IMAGE_BYTES} bytes"))
}

impl EmotionClassifier for HttpClassifier {
    fn id(&self) -> &str {
        &self.model
    }

    fn classify<'a>(
        &'a self,
        image_url: &'a str,
        top_k: usize,
    ) -> BoxFuture<'a, Result<Vec<Prediction>>> {
        Box::pin(self.run(image_url, top_k))
    }
}
