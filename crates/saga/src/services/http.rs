//! Shared JSON-over-HTTP plumbing for the inference services.

use std::time::Duration;

use common::TraceId;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Header carrying the workflow trace id to the inference services.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Errors from an inference service call.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("service returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The service answered with a payload that does not fit the contract.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// JSON client bound to one service base URL.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: reqwest::Client,
    base_url: String,
}

impl InferenceClient {
    /// Builds a client whose every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Reuses an existing [`reqwest::Client`] (shares its connection pool).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends `POST {base_url}{path}` with a JSON body and decodes a JSON reply.
    pub async fn post_json<B, R>(&self, path: &str, trace_id: TraceId, body: &B) -> Result<R, InferenceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(REQUEST_ID_HEADER, trace_id.to_string())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<R>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = InferenceClient::with_client(reqwest::Client::new(), "http://cutter:8080/");
        assert_eq!(client.base_url(), "http://cutter:8080");
    }
}
