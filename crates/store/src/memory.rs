use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AccountId, GarmentId, OutfitId, PlacementId, PostId, SimilarityId};
use domain::{Account, Garment, Outfit, Placement, Post, SimilarityBinding};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::faults::{FaultPlan, Operation};
use crate::repository::{
    AccountRepository, GarmentRepository, OutfitRepository, Page, PostRepository,
    SimilarityRepository,
};

#[derive(Debug, Default)]
struct InMemoryState {
    accounts: HashMap<AccountId, Account>,
    garments: HashMap<GarmentId, Garment>,
    bindings: HashMap<SimilarityId, SimilarityBinding>,
    outfits: HashMap<OutfitId, Outfit>,
    placements: HashMap<PlacementId, Placement>,
    posts: HashMap<PostId, Post>,
    faults: FaultPlan,
}

/// In-memory implementation of every row repository, for testing.
///
/// Provides the same semantics as the PostgreSQL implementation (unique
/// logins and nicknames, not-found on missing rows) plus fault injection.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the `nth` call (1-based) of `op` from now on.
    pub async fn fail_on(&self, op: Operation, nth: u32) {
        self.state.write().await.faults.fail_on(op, nth);
    }

    /// Fails every call of `op` until [`clear_faults`](Self::clear_faults).
    pub async fn fail_always(&self, op: Operation) {
        self.state.write().await.faults.fail_always(op);
    }

    /// Disarms all injected faults.
    pub async fn clear_faults(&self) {
        self.state.write().await.faults.clear();
    }

    pub async fn account_count(&self) -> usize {
        self.state.read().await.accounts.len()
    }

    pub async fn garment_count(&self) -> usize {
        self.state.read().await.garments.len()
    }

    pub async fn binding_count(&self) -> usize {
        self.state.read().await.bindings.len()
    }

    pub async fn outfit_count(&self) -> usize {
        self.state.read().await.outfits.len()
    }

    pub async fn placement_count(&self) -> usize {
        self.state.read().await.placements.len()
    }

    pub async fn post_count(&self) -> usize {
        self.state.read().await.posts.len()
    }
}

fn paged<T>(mut rows: Vec<T>, page: Page) -> Vec<T> {
    rows.drain(..page.offset.min(rows.len()));
    rows.truncate(page.limit);
    rows
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn insert_account(&self, account: &Account) -> Result<()> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::InsertAccount)?;

        if state.accounts.contains_key(&account.id) {
            return Err(StoreError::Conflict(format!("account {}", account.id)));
        }
        if state
            .accounts
            .values()
            .any(|a| a.login == account.login || a.nickname == account.nickname)
        {
            return Err(StoreError::Conflict(
                "login or nickname already taken".to_string(),
            ));
        }

        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Account> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::GetAccount)?;
        state
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", id))
    }

    async fn find_account_by_login(&self, login: &str) -> Result<Option<Account>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::GetAccount)?;
        Ok(state.accounts.values().find(|a| a.login == login).cloned())
    }

    async fn find_account_by_login_or_nickname(
        &self,
        login: &str,
        nickname: &str,
    ) -> Result<Option<Account>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::GetAccount)?;
        Ok(state
            .accounts
            .values()
            .find(|a| a.login == login || a.nickname == nickname)
            .cloned())
    }

    async fn find_account_by_nickname(&self, nickname: &str) -> Result<Option<Account>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::GetAccount)?;
        Ok(state.accounts.values().find(|a| a.nickname == nickname).cloned())
    }

    async fn update_account(&self, account: &Account) -> Result<Account> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::UpdateAccount)?;

        if state
            .accounts
            .values()
            .any(|a| a.id != account.id && a.nickname == account.nickname)
        {
            return Err(StoreError::Conflict("nickname already taken".to_string()));
        }
        let row = state
            .accounts
            .get_mut(&account.id)
            .ok_or_else(|| StoreError::not_found("account", account.id))?;
        row.nickname = account.nickname.clone();
        row.name = account.name.clone();
        row.description = account.description.clone();
        row.avatar_path = account.avatar_path.clone();
        Ok(row.clone())
    }

    async fn delete_account(&self, id: AccountId) -> Result<Account> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::DeleteAccount)?;
        state
            .accounts
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("account", id))
    }
}

#[async_trait]
impl GarmentRepository for InMemoryStore {
    async fn insert_garment(&self, garment: &Garment) -> Result<()> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::InsertGarment)?;
        if state.garments.contains_key(&garment.id) {
            return Err(StoreError::Conflict(format!("garment {}", garment.id)));
        }
        state.garments.insert(garment.id, garment.clone());
        Ok(())
    }

    async fn get_garment(&self, id: GarmentId) -> Result<Garment> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::GetGarment)?;
        state
            .garments
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("garment", id))
    }

    async fn update_garment(&self, garment: &Garment) -> Result<Garment> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::UpdateGarment)?;
        let slot = state
            .garments
            .get_mut(&garment.id)
            .ok_or_else(|| StoreError::not_found("garment", garment.id))?;
        *slot = garment.clone();
        Ok(garment.clone())
    }

    async fn delete_garment(&self, id: GarmentId) -> Result<Garment> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::DeleteGarment)?;
        state
            .garments
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("garment", id))
    }

    async fn list_garments(&self, page: Page) -> Result<Vec<Garment>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::ListGarments)?;
        let mut rows: Vec<_> = state.garments.values().cloned().collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(paged(rows, page))
    }

    async fn list_garments_by_owner(&self, owner: AccountId, page: Page) -> Result<Vec<Garment>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::ListGarments)?;
        let mut rows: Vec<_> = state
            .garments
            .values()
            .filter(|g| g.owner_id == owner)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(paged(rows, page))
    }

    async fn find_garments_by_label_and_sex(
        &self,
        label: &str,
        sex: Option<&str>,
    ) -> Result<Vec<Garment>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::ListGarments)?;
        let mut rows: Vec<_> = state
            .garments
            .values()
            .filter(|g| g.label == label && g.sex.as_deref() == sex)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }
}

#[async_trait]
impl SimilarityRepository for InMemoryStore {
    async fn insert_binding(&self, binding: &SimilarityBinding) -> Result<()> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::InsertBinding)?;
        for side in [binding.subject_id, binding.candidate_id] {
            if !state.garments.contains_key(&side) {
                return Err(StoreError::not_found("garment", side));
            }
        }
        state.bindings.insert(binding.id, binding.clone());
        Ok(())
    }

    async fn delete_binding(&self, id: SimilarityId) -> Result<SimilarityBinding> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::DeleteBinding)?;
        state
            .bindings
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("similarity binding", id))
    }

    async fn bindings_for(&self, garment: GarmentId) -> Result<Vec<SimilarityBinding>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::ListBindings)?;
        let mut rows: Vec<_> = state
            .bindings
            .values()
            .filter(|b| b.involves(garment))
            .cloned()
            .collect();
        rows.sort_by_key(|b| b.id);
        Ok(rows)
    }

    async fn delete_bindings_for(&self, garment: GarmentId) -> Result<Vec<SimilarityBinding>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::DeleteBinding)?;
        let ids: Vec<_> = state
            .bindings
            .values()
            .filter(|b| b.involves(garment))
            .map(|b| b.id)
            .collect();
        let mut removed: Vec<_> = ids
            .into_iter()
            .filter_map(|id| state.bindings.remove(&id))
            .collect();
        removed.sort_by_key(|b| b.id);
        Ok(removed)
    }
}

#[async_trait]
impl OutfitRepository for InMemoryStore {
    async fn insert_outfit(&self, outfit: &Outfit) -> Result<()> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::InsertOutfit)?;
        if state.outfits.contains_key(&outfit.id) {
            return Err(StoreError::Conflict(format!("outfit {}", outfit.id)));
        }
        state.outfits.insert(outfit.id, outfit.clone());
        Ok(())
    }

    async fn get_outfit(&self, id: OutfitId) -> Result<Outfit> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::GetOutfit)?;
        state
            .outfits
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("outfit", id))
    }

    async fn update_outfit(&self, outfit: &Outfit) -> Result<Outfit> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::UpdateOutfit)?;
        let slot = state
            .outfits
            .get_mut(&outfit.id)
            .ok_or_else(|| StoreError::not_found("outfit", outfit.id))?;
        *slot = outfit.clone();
        Ok(outfit.clone())
    }

    async fn delete_outfit(&self, id: OutfitId) -> Result<Outfit> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::DeleteOutfit)?;
        if state.placements.values().any(|p| p.outfit_id == id) {
            return Err(StoreError::Conflict(format!(
                "outfit {id} still has placements"
            )));
        }
        state
            .outfits
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("outfit", id))
    }

    async fn insert_placement(&self, placement: &Placement) -> Result<()> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::InsertPlacement)?;
        if !state.outfits.contains_key(&placement.outfit_id) {
            return Err(StoreError::not_found("outfit", placement.outfit_id));
        }
        state.placements.insert(placement.id, *placement);
        Ok(())
    }

    async fn delete_placement(&self, id: PlacementId) -> Result<Placement> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::DeletePlacement)?;
        state
            .placements
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("placement", id))
    }

    async fn placements_for(&self, outfit: OutfitId) -> Result<Vec<Placement>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::ListPlacements)?;
        let mut rows: Vec<_> = state
            .placements
            .values()
            .filter(|p| p.outfit_id == outfit)
            .copied()
            .collect();
        rows.sort_by_key(|p| p.position);
        Ok(rows)
    }

    async fn delete_placements_for(&self, outfit: OutfitId) -> Result<Vec<Placement>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::DeletePlacement)?;
        let ids: Vec<_> = state
            .placements
            .values()
            .filter(|p| p.outfit_id == outfit)
            .map(|p| p.id)
            .collect();
        let mut removed: Vec<_> = ids
            .into_iter()
            .filter_map(|id| state.placements.remove(&id))
            .collect();
        removed.sort_by_key(|p| p.position);
        Ok(removed)
    }
}

#[async_trait]
impl PostRepository for InMemoryStore {
    async fn insert_post(&self, post: &Post) -> Result<()> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::InsertPost)?;
        if state.posts.contains_key(&post.id) {
            return Err(StoreError::Conflict(format!("post {}", post.id)));
        }
        state.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn get_post(&self, id: PostId) -> Result<Post> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::GetPost)?;
        state
            .posts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("post", id))
    }

    async fn delete_post(&self, id: PostId) -> Result<Post> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::DeletePost)?;
        state
            .posts
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("post", id))
    }

    async fn list_posts(&self, page: Page) -> Result<Vec<Post>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::ListPosts)?;
        let mut rows: Vec<_> = state.posts.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(paged(rows, page))
    }

    async fn list_posts_by_creator(&self, creator: AccountId, page: Page) -> Result<Vec<Post>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::ListPosts)?;
        let mut rows: Vec<_> = state
            .posts
            .values()
            .filter(|p| p.creator_id == creator)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(paged(rows, page))
    }
}
