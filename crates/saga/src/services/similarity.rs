//! Visual similarity scorer.
//!
//! Compares the mask of one garment against the masks of candidate garments
//! and returns an integer score per candidate. Masks are referenced by their
//! blob path; the service reads the shared media volume.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{GarmentId, TraceId};
use domain::BlobPath;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::SagaError;
use crate::services::http::InferenceClient;

#[async_trait]
pub trait SimilarityScorer: Send + Sync {
    /// Scores `subject` against every candidate mask.
    ///
    /// Candidates missing from the result were not scored.
    async fn score(
        &self,
        trace_id: TraceId,
        subject: &BlobPath,
        candidates: &[(GarmentId, BlobPath)],
    ) -> Result<HashMap<GarmentId, i32>, SagaError>;
}

#[derive(Serialize)]
struct SimilarityRequest<'a> {
    image: &'a str,
    images: HashMap<String, &'a str>,
}

#[derive(Deserialize)]
struct SimilarityResponse {
    similarity: HashMap<String, i32>,
}

/// HTTP client for the similarity service (`POST /similarity`).
#[derive(Debug, Clone)]
pub struct HttpSimilarityScorer {
    client: InferenceClient,
}

impl HttpSimilarityScorer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SagaError> {
        let client = InferenceClient::new(base_url, timeout)
            .map_err(|e| SagaError::Similarity(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SimilarityScorer for HttpSimilarityScorer {
    #[tracing::instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    async fn score(
        &self,
        trace_id: TraceId,
        subject: &BlobPath,
        candidates: &[(GarmentId, BlobPath)],
    ) -> Result<HashMap<GarmentId, i32>, SagaError> {
        let request = SimilarityRequest {
            image: subject.as_str(),
            images: candidates
                .iter()
                .map(|(id, path)| (id.to_string(), path.as_str()))
                .collect(),
        };
        let response: SimilarityResponse = self
            .client
            .post_json("/similarity", trace_id, &request)
            .await
            .map_err(|e| SagaError::Similarity(e.to_string()))?;

        let mut scores = HashMap::with_capacity(response.similarity.len());
        for (key, score) in response.similarity {
            match key.parse::<GarmentId>() {
                Ok(id) => {
                    scores.insert(id, score);
                }
                Err(_) => tracing::warn!(%key, "Similarity service returned an unknown id"),
            }
        }
        Ok(scores)
    }
}

/// A recorded call to the in-memory scorer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRequest {
    pub subject: BlobPath,
    pub candidates: Vec<GarmentId>,
}

#[derive(Debug, Default)]
struct InMemoryScorerState {
    forced: HashMap<GarmentId, i32>,
    default_score: i32,
    fail: bool,
    requests: Vec<ScoreRequest>,
}

/// Scorer returning forced scores per candidate, for testing.
///
/// Candidates without a forced score get the default score (zero unless set).
#[derive(Debug, Clone, Default)]
pub struct InMemorySimilarityScorer {
    state: Arc<RwLock<InMemoryScorerState>>,
}

impl InMemorySimilarityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the score reported for `candidate`.
    pub async fn set_score(&self, candidate: GarmentId, score: i32) {
        self.state.write().await.forced.insert(candidate, score);
    }

    pub async fn set_default_score(&self, score: i32) {
        self.state.write().await.default_score = score;
    }

    pub async fn set_fail(&self, fail: bool) {
        self.state.write().await.fail = fail;
    }

    /// Every request received so far, oldest first.
    pub async fn requests(&self) -> Vec<ScoreRequest> {
        self.state.read().await.requests.clone()
    }
}

#[async_trait]
impl SimilarityScorer for InMemorySimilarityScorer {
    async fn score(
        &self,
        _trace_id: TraceId,
        subject: &BlobPath,
        candidates: &[(GarmentId, BlobPath)],
    ) -> Result<HashMap<GarmentId, i32>, SagaError> {
        let mut state = self.state.write().await;
        state.requests.push(ScoreRequest {
            subject: subject.clone(),
            candidates: candidates.iter().map(|(id, _)| *id).collect(),
        });
        if state.fail {
            return Err(SagaError::Similarity("scorer unavailable".to_string()));
        }

        Ok(candidates
            .iter()
            .map(|(id, _)| (*id, state.forced.get(id).copied().unwrap_or(state.default_score)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forced_and_default_scores() {
        let scorer = InMemorySimilarityScorer::new();
        let a = GarmentId::new();
        let b = GarmentId::new();
        scorer.set_score(a, 90).await;
        scorer.set_default_score(10).await;

        let subject = BlobPath::new("masks/x/s.webp");
        let scores = scorer
            .score(
                TraceId::new(),
                &subject,
                &[(a, BlobPath::new("masks/x/a.webp")), (b, BlobPath::new("masks/x/b.webp"))],
            )
            .await
            .unwrap();

        assert_eq!(scores[&a], 90);
        assert_eq!(scores[&b], 10);
        assert_eq!(
            scorer.requests().await,
            vec![ScoreRequest {
                subject,
                candidates: vec![a, b],
            }]
        );
    }
}
