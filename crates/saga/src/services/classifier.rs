//! Garment-type classifier.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::TraceId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::SagaError;
use crate::services::http::InferenceClient;

/// Label used by the in-memory classifier until another one is forced.
pub const DEFAULT_TEST_LABEL: &str = "Tee";

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Returns the canonical garment-type label for `image`.
    async fn classify(&self, trace_id: TraceId, image: &[u8]) -> Result<String, SagaError>;
}

#[derive(Serialize)]
struct ClassifyRequest {
    image: String,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    category: String,
}

/// HTTP client for the classifier service (`POST /classify`).
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: InferenceClient,
}

impl HttpClassifier {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SagaError> {
        let client = InferenceClient::new(base_url, timeout)
            .map_err(|e| SagaError::Classifier(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    #[tracing::instrument(skip(self, image), fields(size = image.len()))]
    async fn classify(&self, trace_id: TraceId, image: &[u8]) -> Result<String, SagaError> {
        let request = ClassifyRequest {
            image: STANDARD.encode(image),
        };
        let response: ClassifyResponse = self
            .client
            .post_json("/classify", trace_id, &request)
            .await
            .map_err(|e| SagaError::Classifier(e.to_string()))?;

        let label = response.category.trim();
        if label.is_empty() {
            return Err(SagaError::Classifier("empty category".to_string()));
        }
        Ok(label.to_string())
    }
}

#[derive(Debug)]
struct InMemoryClassifierState {
    label: String,
    fail: bool,
    calls: u32,
}

impl Default for InMemoryClassifierState {
    fn default() -> Self {
        Self {
            label: DEFAULT_TEST_LABEL.to_string(),
            fail: false,
            calls: 0,
        }
    }
}

/// Classifier returning a configurable label, for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClassifier {
    state: Arc<RwLock<InMemoryClassifierState>>,
}

impl InMemoryClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the label returned by following calls.
    pub async fn set_label(&self, label: impl Into<String>) {
        self.state.write().await.label = label.into();
    }

    pub async fn set_fail(&self, fail: bool) {
        self.state.write().await.fail = fail;
    }

    pub async fn calls(&self) -> u32 {
        self.state.read().await.calls
    }
}

#[async_trait]
impl Classifier for InMemoryClassifier {
    async fn classify(&self, _trace_id: TraceId, _image: &[u8]) -> Result<String, SagaError> {
        let mut state = self.state.write().await;
        state.calls += 1;
        if state.fail {
            return Err(SagaError::Classifier("model unavailable".to_string()));
        }
        Ok(state.label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forced_label() {
        let classifier = InMemoryClassifier::new();
        assert_eq!(
            classifier.classify(TraceId::new(), b"x").await.unwrap(),
            DEFAULT_TEST_LABEL
        );

        classifier.set_label("Hoodie").await;
        assert_eq!(
            classifier.classify(TraceId::new(), b"x").await.unwrap(),
            "Hoodie"
        );
        assert_eq!(classifier.calls().await, 2);
    }

    #[tokio::test]
    async fn test_failure() {
        let classifier = InMemoryClassifier::new();
        classifier.set_fail(true).await;
        assert!(classifier.classify(TraceId::new(), b"x").await.is_err());
    }
}
