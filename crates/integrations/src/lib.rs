//! External collaborators behind narrow, injectable contracts
//!
//! The service never reaches a classifier, object store or database
//! directly. It holds `Arc<dyn Trait>` handles built at startup, so tests
//! can substitute fakes:
//!
//! - `EmotionClassifier` ranks emotion labels for an image URL
//! - `UploadSigner` issues time-limited upload URLs
//! - `LivenessProbe` answers "is the database reachable right now?"
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility.

pub mod classifier;
pub mod probe;
pub mod storage;

pub use classifier::HttpClassifier;
pub use probe::{DnsSrvResolver, SrvResolver, TcpProbe};
pub use storage::{S3UploadSigner, content_type_for, upload_object_key};

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future returned by collaborator calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One ranked label from the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub score: f64,
}

/// Errors from collaborator calls.
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("probe failed: {0}")]
    Unreachable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Result alias for collaborator calls.
pub type Result<T> = std::result::Result<T, IntegrationError>;

/// Image-classification inference.
pub trait EmotionClassifier: Send + Sync {
    /// Identifier for logging (e.g. the model name)
    fn id(&self) -> &str;

    /// Classify the image at `image_url`, returning at most `top_k` labels
    /// ordered by descending score.
    fn classify<'a>(
        &'a self,
        image_url: &'a str,
        top_k: usize,
    ) -> BoxFuture<'a, Result<Vec<Prediction>>>;
}

/// Presigned upload URL issuance.
pub trait UploadSigner: Send + Sync {
    /// URL allowing a single `PUT` of `key` with `content_type` until
    /// `expires_in` has elapsed.
    fn presign_put<'a>(
        &'a self,
        key: &'a str,
        content_type: &'a str,
        expires_in: Duration,
    ) -> BoxFuture<'a, Result<String>>;
}

/// Connection-liveness check for the document database.
pub trait LivenessProbe: Send + Sync {
    /// Where the probe connects, without credentials.
    fn target(&self) -> &str;

    fn ping(&self) -> BoxFuture<'_, Result<()>>;
}

/// Keep the `top_k` highest-scoring predictions, best first.
pub fn rank_predictions(mut predictions: Vec<Prediction>, top_k: usize) -> Vec<Prediction> {
    predictions.sort_by(|a, b| b.score.total_cmp(&a.score));
    predictions.truncate(top_k);
    predictions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(label: &str, score: f64) -> Prediction {
        Prediction {
            label: label.into(),
            score,
        }
    }

    #[test]
    fn rank_sorts_descending_and_truncates() {
        let ranked = rank_predictions(
            vec![p("sad", 0.1), p("happy", 0.7), p("neutral", 0.15), p("angry", 0.05)],
            3,
        );
        let labels: Vec<&str> = ranked.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["happy", "neutral", "sad"]);
    }

    #[test]
    fn rank_with_fewer_predictions_than_top_k() {
        let ranked = rank_predictions(vec![p("happy", 0.9)], 3);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn prediction_serializes_as_label_and_score() {
        let json = serde_json::to_value(p("happy", 0.5)).unwrap();
        assert_eq!(json, serde_json::json!({"label": "happy", "score": 0.5}));
    }
}
