//! Presigned upload URLs for image storage in S3

use std::time::Duration;

use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use tracing::{debug, instrument};

use crate::{BoxFuture, IntegrationError, Result, UploadSigner};

/// Prefix under which uploaded images are stored.
pub const UPLOAD_PREFIX: &str = "images";

/// Object key for a new upload: `images/{unix_millis}.{file_type}`.
pub fn upload_object_key(file_type: &str, unix_millis: u128) -> String {
    format!("{UPLOAD_PREFIX}/{unix_millis}.{file_type}")
}

/// MIME type for an image extension. `jpg` is the one alias that needs
/// mapping; everything else is used as the subtype verbatim.
pub fn content_type_for(file_type: &str) -> String {
    match file_type {
        "jpg" => "image/jpeg".to_string(),
        other => format!("image/{other}"),
    }
}

pub struct S3UploadSigner {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3UploadSigner {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a signer from the standard AWS environment (`AWS_ACCESS_KEY_ID`,
    /// `AWS_SECRET_ACCESS_KEY`, profiles, instance roles). `region` overrides
    /// `AWS_REGION` when set.
    pub async fn from_env(bucket: impl Into<String>, region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let shared = loader.load().await;
        Self::new(aws_sdk_s3::Client::new(&shared), bucket)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn presign(&self, key: &str, content_type: &str, expires_in: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| IntegrationError::InvalidInput(format!("invalid expiry: {e}")))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| IntegrationError::Storage(format!("presigning failed: {e}")))?;

        debug!("upload URL presigned");
        Ok(request.uri().to_string())
    }
}

impl UploadSigner for S3UploadSigner {
    fn presign_put<'a>(
        &'a self,
        key: &'a str,
        content_type: &'a str,
        expires_in: Duration,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.presign(key, content_type, expires_in))
    }
}
