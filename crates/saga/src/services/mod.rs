//! Inference service contracts, HTTP clients and in-memory implementations.

pub mod classifier;
pub mod cutter;
pub mod http;
pub mod similarity;

pub use classifier::{Classifier, HttpClassifier, InMemoryClassifier};
pub use cutter::{Cutter, HttpCutter, InMemoryCutter, Segmented};
pub use http::{InferenceClient, InferenceError};
pub use similarity::{
    HttpSimilarityScorer, InMemorySimilarityScorer, ScoreRequest, SimilarityScorer,
};
