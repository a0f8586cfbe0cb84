//! Compensation-based workflows for the wardrobe backend.
//!
//! No transaction spans the file store, the database, the session cache and
//! the inference services. Multi-step operations stay approximately atomic by
//! registering an undo action after every successful side effect:
//!
//! 1. A [`WorkflowContext`] is created once per inbound operation
//! 2. Each side effect runs through [`WorkflowContext::commit`] and, on
//!    success, registers its compensator on the context's [`CompensationStack`].
//!    Reads and inference calls run through [`WorkflowContext::step`], which
//!    races them against cancellation and the deadline
//! 3. The first failing step unwinds the stack in reverse order and the
//!    original cause is returned as a [`WorkflowError`]
//!
//! A stack that is never unwound is a successful workflow.
//!
//! The orchestrators live on [`Workflows`]: garment ingestion, update and
//! deletion, outfit compose/update/delete, post create/delete and the account
//! operations. The similarity rescan after a garment update runs detached on
//! [`BackgroundTasks`] once the updating scope has succeeded.

pub mod background;
pub mod compensation;
pub mod context;
pub mod error;
pub mod services;
pub mod state;
pub mod workflows;

pub use background::{BackgroundTasks, TaskOutcome};
pub use compensation::{CompensationFuture, CompensationStack, UnwindReport};
pub use context::WorkflowContext;
pub use error::{CompensationFailure, ErrorKind, SagaError, WorkflowError};
pub use services::{
    Classifier, Cutter, HttpClassifier, HttpCutter, HttpSimilarityScorer, InMemoryClassifier,
    InMemoryCutter, InMemorySimilarityScorer, InferenceClient, InferenceError, ScoreRequest,
    Segmented, SimilarityScorer,
};
pub use state::StackState;
pub use workflows::{
    Adapters, ComposeOutfit, CreatePost, DEFAULT_SESSION_TTL, DEFAULT_SIMILARITY_THRESHOLD,
    ImageUpload, MIN_PASSWORD_LEN, OutfitView, SignUp, UpdateOutfit, WorkflowSettings, Workflows,
    hash_password, verify_password,
};
