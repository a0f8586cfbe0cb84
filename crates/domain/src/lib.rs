//! Domain layer for the wardrobe backend.
//!
//! This crate holds the plain records the workflows move around:
//! - Accounts and session tokens
//! - Garments and garment-to-garment similarity bindings
//! - Outfits with their garment placements
//! - Posts referencing exactly one garment or outfit
//!
//! It also owns the media rules (allowed upload types, preview extensions,
//! folder and file naming) so every adapter agrees on them.

pub mod account;
pub mod error;
pub mod garment;
pub mod media;
pub mod outfit;
pub mod post;

pub use account::{Account, ProfilePatch, SessionToken};
pub use error::DomainError;
pub use garment::{Garment, GarmentPatch, SimilarityBinding};
pub use media::{BlobPath, ImageFormat, MediaKind};
pub use outfit::{Coords, Outfit, PlacedGarment, Placement, PlacementSpec};
pub use post::{Post, PostElement, PostKind};
