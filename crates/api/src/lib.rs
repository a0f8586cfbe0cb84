//! HTTP API server with observability for the wardrobe backend.
//!
//! Provides REST endpoints for accounts, garments, outfits and posts on top of
//! the compensating workflows, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod session;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderMap;
use axum::routing::{delete, get, post, put};
use common::TraceId;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::services::http::REQUEST_ID_HEADER;
use saga::{
    Adapters, BackgroundTasks, Classifier, Cutter, HttpClassifier, HttpCutter,
    HttpSimilarityScorer, InMemoryClassifier, InMemoryCutter, InMemorySimilarityScorer,
    SimilarityScorer, WorkflowContext, WorkflowError, Workflows,
};
use store::{FsBlobStore, InMemorySessionCache, InMemoryStore, PostgresStore};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::ApiError;

const DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub workflows: Workflows,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(workflows: Workflows, request_timeout: Duration) -> Self {
        Self {
            workflows,
            request_timeout,
        }
    }

    /// Runs one workflow scope for a request.
    ///
    /// The workflow runs on its own task so that a dropped request cancels the
    /// in-flight external calls without skipping the unwind of what already
    /// succeeded. The trace id is taken from `X-Request-ID` when it holds one.
    pub async fn run<T, F, Fut>(&self, headers: &HeaderMap, work: F) -> Result<T, ApiError>
    where
        F: FnOnce(Workflows, WorkflowContext) -> Fut,
        Fut: Future<Output = Result<T, WorkflowError>> + Send + 'static,
        T: Send + 'static,
    {
        let trace_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<TraceId>().ok())
            .unwrap_or_default();

        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();
        let ctx = WorkflowContext::new(trace_id)
            .with_cancellation(cancel)
            .with_timeout(self.request_timeout);

        let result = tokio::spawn(work(self.workflows.clone(), ctx)).await?;
        Ok(result?)
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    use routes::{accounts, garments, outfits, posts};

    // JSON bodies carry base64 images, a third larger than the raw upload.
    let body_limit = state.workflows.settings().max_upload_bytes.saturating_mul(2);

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/accounts/signup", post(accounts::sign_up))
        .route("/accounts/login", post(accounts::login))
        .route("/accounts/logout", delete(accounts::logout))
        .route(
            "/accounts/me",
            get(accounts::me)
                .put(accounts::update)
                .delete(accounts::delete),
        )
        .route(
            "/accounts/me/avatar",
            put(accounts::update_avatar).delete(accounts::delete_avatar),
        )
        .route("/profiles/{nickname}", get(accounts::profile))
        .route("/garments", post(garments::upload).get(garments::list))
        .route("/garments/mine", get(garments::list_mine))
        .route(
            "/garments/{id}",
            get(garments::get)
                .put(garments::update)
                .delete(garments::delete),
        )
        .route("/garments/{id}/similar", post(garments::scan))
        .route("/outfits", post(outfits::compose))
        .route(
            "/outfits/{id}",
            get(outfits::get).put(outfits::update).delete(outfits::delete),
        )
        .route("/posts", post(posts::create).get(posts::list))
        .route("/posts/mine", get(posts::list_mine))
        .route("/posts/{id}", get(posts::get).delete(posts::delete))
        .with_state(state)
        .merge(metrics_router)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the resource adapters described by `config`.
///
/// PostgreSQL is used when `DATABASE_URL` is set, in-memory rows otherwise.
/// Each inference service without a URL gets its in-process stand-in.
pub async fn build_adapters(
    config: &Config,
) -> Result<Adapters, Box<dyn std::error::Error + Send + Sync>> {
    let blobs = Arc::new(FsBlobStore::new(&config.media_root));
    let sessions = Arc::new(InMemorySessionCache::new());

    let cutter: Arc<dyn Cutter> = match &config.cutter_url {
        Some(url) => Arc::new(HttpCutter::new(url.clone(), config.inference_timeout)?),
        None => {
            tracing::warn!("CUTTER_URL not set, using in-process cutter");
            Arc::new(InMemoryCutter::new())
        }
    };
    let classifier: Arc<dyn Classifier> = match &config.classifier_url {
        Some(url) => Arc::new(HttpClassifier::new(url.clone(), config.inference_timeout)?),
        None => {
            tracing::warn!("CLASSIFIER_URL not set, using in-process classifier");
            Arc::new(InMemoryClassifier::new())
        }
    };
    let similarity: Arc<dyn SimilarityScorer> = match &config.similarity_url {
        Some(url) => Arc::new(HttpSimilarityScorer::new(
            url.clone(),
            config.inference_timeout,
        )?),
        None => {
            tracing::warn!("SIMILARITY_URL not set, using in-process similarity scorer");
            Arc::new(InMemorySimilarityScorer::new())
        }
    };

    let adapters = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, DATABASE_MAX_CONNECTIONS).await?;
            store.run_migrations().await?;
            tracing::info!("Using PostgreSQL repositories");
            Adapters::from_store(store, blobs, sessions, cutter, classifier, similarity)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, rows are kept in memory");
            Adapters::from_store(
                InMemoryStore::new(),
                blobs,
                sessions,
                cutter,
                classifier,
                similarity,
            )
        }
    };
    Ok(adapters)
}

/// Creates an application state whose adapters all live in memory.
pub fn create_in_memory_state(config: &Config) -> AppState {
    let adapters = Adapters::from_store(
        InMemoryStore::new(),
        Arc::new(store::InMemoryBlobStore::new()),
        Arc::new(InMemorySessionCache::new()),
        Arc::new(InMemoryCutter::new()),
        Arc::new(InMemoryClassifier::new()),
        Arc::new(InMemorySimilarityScorer::new()),
    );
    let workflows = Workflows::new(adapters, config.workflow_settings(), BackgroundTasks::new());
    AppState::new(workflows, config.request_timeout)
}
