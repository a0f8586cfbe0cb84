//! Shared identifier types used across the wardrobe workspace.

mod types;

pub use types::{
    AccountId, GarmentId, OutfitId, PlacementId, PostId, SimilarityId, StackId, TraceId,
};
