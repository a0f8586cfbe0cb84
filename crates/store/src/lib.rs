//! Resource adapters consumed by the workflow orchestrators.
//!
//! - Row repositories per entity (accounts, garments, similarity bindings,
//!   outfits and placements, posts)
//! - Blob store for image files
//! - Session cache mapping opaque tokens to logins
//!
//! Every adapter has an in-memory implementation with fault injection for
//! tests. Production uses PostgreSQL repositories and the filesystem blob store.

pub mod blob;
pub mod error;
pub mod faults;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod session;

pub use blob::{BlobStore, FsBlobStore, InMemoryBlobStore};
pub use error::{Result, StoreError};
pub use faults::{FaultPlan, Operation};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::{
    AccountRepository, GarmentRepository, MAX_PAGE_SIZE, OutfitRepository, Page, PostRepository,
    SimilarityRepository,
};
pub use session::{InMemorySessionCache, SessionCache};
