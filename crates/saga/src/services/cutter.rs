//! Background cutter: splits an uploaded photo into a foreground image and a mask.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::TraceId;
use domain::ImageFormat;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::SagaError;
use crate::services::http::{InferenceClient, InferenceError};

/// Foreground image and mask produced by the cutter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmented {
    pub image: Vec<u8>,
    pub mask: Vec<u8>,
}

#[async_trait]
pub trait Cutter: Send + Sync {
    /// Segments `image`, declared by the client as `format` under `file_name`.
    async fn segment(
        &self,
        trace_id: TraceId,
        image: &[u8],
        file_name: &str,
        format: ImageFormat,
    ) -> Result<Segmented, SagaError>;
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    file_name: &'a str,
    content_type: &'a str,
    image: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    img: String,
    mask: String,
}

/// HTTP client for the cutter service (`POST /upload`).
#[derive(Debug, Clone)]
pub struct HttpCutter {
    client: InferenceClient,
}

impl HttpCutter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SagaError> {
        let client = InferenceClient::new(base_url, timeout).map_err(cutter_error)?;
        Ok(Self { client })
    }
}

fn cutter_error(e: InferenceError) -> SagaError {
    SagaError::Cutter(e.to_string())
}

#[async_trait]
impl Cutter for HttpCutter {
    #[tracing::instrument(skip(self, image), fields(size = image.len()))]
    async fn segment(
        &self,
        trace_id: TraceId,
        image: &[u8],
        file_name: &str,
        format: ImageFormat,
    ) -> Result<Segmented, SagaError> {
        let request = UploadRequest {
            file_name,
            content_type: format.content_type(),
            image: STANDARD.encode(image),
        };
        let response: UploadResponse = self
            .client
            .post_json("/upload", trace_id, &request)
            .await
            .map_err(cutter_error)?;

        let decode = |field: &str, data: &str| {
            STANDARD
                .decode(data)
                .map_err(|e| cutter_error(InferenceError::Malformed(format!("{field}: {e}"))))
        };
        Ok(Segmented {
            image: decode("img", &response.img)?,
            mask: decode("mask", &response.mask)?,
        })
    }
}

#[derive(Debug, Default)]
struct InMemoryCutterState {
    fail: bool,
    calls: u32,
}

/// Deterministic cutter for testing.
///
/// The foreground is the input unchanged and the mask is its bytes thresholded
/// to black and white.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCutter {
    state: Arc<RwLock<InMemoryCutterState>>,
}

impl InMemoryCutter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every following call to fail.
    pub async fn set_fail(&self, fail: bool) {
        self.state.write().await.fail = fail;
    }

    pub async fn calls(&self) -> u32 {
        self.state.read().await.calls
    }
}

#[async_trait]
impl Cutter for InMemoryCutter {
    async fn segment(
        &self,
        _trace_id: TraceId,
        image: &[u8],
        _file_name: &str,
        _format: ImageFormat,
    ) -> Result<Segmented, SagaError> {
        let mut state = self.state.write().await;
        state.calls += 1;
        if state.fail {
            return Err(SagaError::Cutter("background removal failed".to_string()));
        }

        Ok(Segmented {
            image: image.to_vec(),
            mask: image
                .iter()
                .map(|b| if *b > 127 { 0xFF } else { 0x00 })
                .collect(),
        })
    }
}
