//! Workflow orchestrators.
//!
//! Every orchestrator takes the caller's [`WorkflowContext`], runs its steps
//! through [`WorkflowContext::step`] and registers one compensator after each
//! side-effecting step. The first failing step unwinds the whole scope.

mod account;
mod garment;
mod outfit;
mod post;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::media::DEFAULT_MAX_UPLOAD_BYTES;
use store::{
    AccountRepository, BlobStore, GarmentRepository, OutfitRepository, PostRepository,
    SessionCache, SimilarityRepository,
};

use crate::background::BackgroundTasks;
use crate::error::WorkflowError;
use crate::services::{Classifier, Cutter, SimilarityScorer};

pub use account::{MIN_PASSWORD_LEN, SignUp, hash_password, verify_password};
pub use outfit::{ComposeOutfit, OutfitView, UpdateOutfit};
pub use post::CreatePost;

/// Minimum similarity score that yields a binding unless configured otherwise.
pub const DEFAULT_SIMILARITY_THRESHOLD: i32 = 80;

/// Session lifetime unless configured otherwise (one day).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Tunables handed to the orchestrators by the delivery layer.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Candidates scored at or above this value get a similarity binding.
    pub similarity_threshold: i32,
    /// Also run the similarity scan inside garment ingestion.
    pub scan_on_ingest: bool,
    pub session_ttl: Duration,
    pub max_upload_bytes: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            scan_on_ingest: false,
            session_ttl: DEFAULT_SESSION_TTL,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Every resource adapter the orchestrators talk to.
#[derive(Clone)]
pub struct Adapters {
    pub accounts: Arc<dyn AccountRepository>,
    pub garments: Arc<dyn GarmentRepository>,
    pub similarities: Arc<dyn SimilarityRepository>,
    pub outfits: Arc<dyn OutfitRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub blobs: Arc<dyn BlobStore>,
    pub sessions: Arc<dyn SessionCache>,
    pub cutter: Arc<dyn Cutter>,
    pub classifier: Arc<dyn Classifier>,
    pub similarity: Arc<dyn SimilarityScorer>,
}

impl Adapters {
    /// Builds the adapter set from one store that implements every repository.
    pub fn from_store<S>(
        store: S,
        blobs: Arc<dyn BlobStore>,
        sessions: Arc<dyn SessionCache>,
        cutter: Arc<dyn Cutter>,
        classifier: Arc<dyn Classifier>,
        similarity: Arc<dyn SimilarityScorer>,
    ) -> Self
    where
        S: AccountRepository
            + GarmentRepository
            + SimilarityRepository
            + OutfitRepository
            + PostRepository
            + 'static,
    {
        let store = Arc::new(store);
        Self {
            accounts: store.clone(),
            garments: store.clone(),
            similarities: store.clone(),
            outfits: store.clone(),
            posts: store,
            blobs,
            sessions,
            cutter,
            classifier,
            similarity,
        }
    }
}

/// An uploaded file as received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Entry point for every business operation.
#[derive(Clone)]
pub struct Workflows {
    adapters: Adapters,
    settings: WorkflowSettings,
    background: BackgroundTasks,
}

impl Workflows {
    pub fn new(adapters: Adapters, settings: WorkflowSettings, background: BackgroundTasks) -> Self {
        Self {
            adapters,
            settings,
            background,
        }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }
}

/// Records start, duration and failure metrics around one workflow run.
async fn observe<T, F>(workflow: &'static str, run: F) -> Result<T, WorkflowError>
where
    F: Future<Output = Result<T, WorkflowError>>,
{
    metrics::counter!("workflow_started_total", "workflow" => workflow).increment(1);
    let started = Instant::now();

    let result = run.await;

    metrics::histogram!("workflow_duration_seconds", "workflow" => workflow)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        metrics::counter!("workflow_failed_total", "workflow" => workflow).increment(1);
        tracing::warn!(
            workflow,
            error = %e,
            kind = e.kind().as_str(),
            compensation_failures = e.compensation_failures.len(),
            "Workflow failed"
        );
        for failure in &e.compensation_failures {
            tracing::error!(workflow, step = %failure.step, reason = %failure.reason, "Resource left behind by failed compensator");
        }
    }
    result
}
