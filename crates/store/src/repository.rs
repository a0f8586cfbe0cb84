//! Row repository contracts, one trait per entity.
//!
//! Inserts take fully built records (ids and timestamps included) so that a
//! record captured before a delete can be re-inserted verbatim by a
//! compensator. Deletes return the row they removed.

use async_trait::async_trait;
use common::{AccountId, GarmentId, OutfitId, PlacementId, PostId, SimilarityId};
use domain::{Account, Garment, Outfit, Placement, Post, SimilarityBinding};

use crate::error::Result;

/// Hard cap on page size for list queries.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Limit/offset pagination, clamped to [`MAX_PAGE_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: limit.clamp(1, MAX_PAGE_SIZE),
            offset,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: MAX_PAGE_SIZE,
            offset: 0,
        }
    }
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Inserts an account. Fails with `Conflict` if login or nickname is taken.
    async fn insert_account(&self, account: &Account) -> Result<()>;

    async fn get_account(&self, id: AccountId) -> Result<Account>;

    async fn find_account_by_login(&self, login: &str) -> Result<Option<Account>>;

    /// Finds an account whose login or nickname matches either argument.
    async fn find_account_by_login_or_nickname(
        &self,
        login: &str,
        nickname: &str,
    ) -> Result<Option<Account>>;

    async fn find_account_by_nickname(&self, nickname: &str) -> Result<Option<Account>>;

    /// Replaces the profile fields and avatar path of an existing account.
    /// Fails with `Conflict` if the new nickname belongs to another account.
    async fn update_account(&self, account: &Account) -> Result<Account>;

    async fn delete_account(&self, id: AccountId) -> Result<Account>;
}

#[async_trait]
pub trait GarmentRepository: Send + Sync {
    async fn insert_garment(&self, garment: &Garment) -> Result<()>;

    async fn get_garment(&self, id: GarmentId) -> Result<Garment>;

    /// Overwrites every mutable column of an existing garment.
    async fn update_garment(&self, garment: &Garment) -> Result<Garment>;

    async fn delete_garment(&self, id: GarmentId) -> Result<Garment>;

    async fn list_garments(&self, page: Page) -> Result<Vec<Garment>>;

    async fn list_garments_by_owner(&self, owner: AccountId, page: Page) -> Result<Vec<Garment>>;

    /// Garments sharing a label and sex, used as similarity candidates.
    async fn find_garments_by_label_and_sex(
        &self,
        label: &str,
        sex: Option<&str>,
    ) -> Result<Vec<Garment>>;
}

#[async_trait]
pub trait SimilarityRepository: Send + Sync {
    async fn insert_binding(&self, binding: &SimilarityBinding) -> Result<()>;

    async fn delete_binding(&self, id: SimilarityId) -> Result<SimilarityBinding>;

    /// Bindings where `garment` is on either side.
    async fn bindings_for(&self, garment: GarmentId) -> Result<Vec<SimilarityBinding>>;

    /// Removes and returns every binding involving `garment`.
    async fn delete_bindings_for(&self, garment: GarmentId) -> Result<Vec<SimilarityBinding>>;
}

#[async_trait]
pub trait OutfitRepository: Send + Sync {
    async fn insert_outfit(&self, outfit: &Outfit) -> Result<()>;

    async fn get_outfit(&self, id: OutfitId) -> Result<Outfit>;

    async fn update_outfit(&self, outfit: &Outfit) -> Result<Outfit>;

    async fn delete_outfit(&self, id: OutfitId) -> Result<Outfit>;

    async fn insert_placement(&self, placement: &Placement) -> Result<()>;

    async fn delete_placement(&self, id: PlacementId) -> Result<Placement>;

    /// Placements of an outfit ordered by position.
    async fn placements_for(&self, outfit: OutfitId) -> Result<Vec<Placement>>;

    /// Removes and returns every placement of an outfit, ordered by position.
    async fn delete_placements_for(&self, outfit: OutfitId) -> Result<Vec<Placement>>;
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn insert_post(&self, post: &Post) -> Result<()>;

    async fn get_post(&self, id: PostId) -> Result<Post>;

    async fn delete_post(&self, id: PostId) -> Result<Post>;

    async fn list_posts(&self, page: Page) -> Result<Vec<Post>>;

    async fn list_posts_by_creator(&self, creator: AccountId, page: Page) -> Result<Vec<Post>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_is_clamped() {
        assert_eq!(Page::new(5000, 3), Page { limit: 1000, offset: 3 });
        assert_eq!(Page::new(0, 0).limit, 1);
        assert_eq!(Page::default().limit, MAX_PAGE_SIZE);
    }
}
