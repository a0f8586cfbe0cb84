use async_trait::async_trait;
use common::{AccountId, GarmentId, OutfitId, PlacementId, PostId, SimilarityId};
use domain::{
    Account, BlobPath, Coords, Garment, Outfit, Placement, Post, PostElement, PostKind,
    SimilarityBinding,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::repository::{
    AccountRepository, GarmentRepository, OutfitRepository, Page, PostRepository,
    SimilarityRepository,
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgreSQL-backed implementation of every row repository.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_account(row: &PgRow) -> Result<Account> {
        Ok(Account {
            id: AccountId::from_uuid(row.try_get::<Uuid, _>("id")?),
            login: row.try_get("login")?,
            nickname: row.try_get("nickname")?,
            password_hash: row.try_get("password_hash")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            avatar_path: row
                .try_get::<Option<String>, _>("avatar_path")?
                .map(BlobPath::new),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_garment(row: &PgRow) -> Result<Garment> {
        Ok(Garment {
            id: GarmentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            owner_id: AccountId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
            label: row.try_get("label")?,
            brand: row.try_get("brand")?,
            color: row.try_get("color")?,
            sex: row.try_get("sex")?,
            image_path: BlobPath::new(row.try_get::<String, _>("image_path")?),
            mask_path: BlobPath::new(row.try_get::<String, _>("mask_path")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_binding(row: &PgRow) -> Result<SimilarityBinding> {
        Ok(SimilarityBinding {
            id: SimilarityId::from_uuid(row.try_get::<Uuid, _>("id")?),
            subject_id: GarmentId::from_uuid(row.try_get::<Uuid, _>("subject_id")?),
            candidate_id: GarmentId::from_uuid(row.try_get::<Uuid, _>("candidate_id")?),
            score: row.try_get("score")?,
        })
    }

    fn row_to_outfit(row: &PgRow) -> Result<Outfit> {
        Ok(Outfit {
            id: OutfitId::from_uuid(row.try_get::<Uuid, _>("id")?),
            creator_id: AccountId::from_uuid(row.try_get::<Uuid, _>("creator_id")?),
            description: row.try_get("description")?,
            image_path: BlobPath::new(row.try_get::<String, _>("image_path")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_placement(row: &PgRow) -> Result<Placement> {
        let position: i32 = row.try_get("position")?;
        Ok(Placement {
            id: PlacementId::from_uuid(row.try_get::<Uuid, _>("id")?),
            outfit_id: OutfitId::from_uuid(row.try_get::<Uuid, _>("outfit_id")?),
            garment_id: GarmentId::from_uuid(row.try_get::<Uuid, _>("garment_id")?),
            coords: Coords {
                x: row.try_get("x")?,
                y: row.try_get("y")?,
            },
            rotation: row.try_get("rotation")?,
            scale: row.try_get("scale")?,
            position: u32::try_from(position).unwrap_or_default(),
        })
    }

    fn row_to_post(row: &PgRow) -> Result<Post> {
        let kind: String = row.try_get("element_type")?;
        let kind: PostKind = kind
            .parse()
            .map_err(|e: domain::DomainError| StoreError::Unavailable(e.to_string()))?;
        let element_id: Uuid = row.try_get("element_id")?;
        let previews: Vec<String> = row.try_get("preview_paths")?;

        Ok(Post {
            id: PostId::from_uuid(row.try_get::<Uuid, _>("id")?),
            creator_id: AccountId::from_uuid(row.try_get::<Uuid, _>("creator_id")?),
            description: row.try_get("description")?,
            element: PostElement::from_parts(kind, element_id),
            preview_paths: previews.into_iter().map(BlobPath::new).collect(),
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Maps constraint violations to adapter errors; everything else stays a database error.
fn classify(err: sqlx::Error, on_foreign_key: impl FnOnce() -> StoreError) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => {
                return StoreError::Conflict(
                    db_err.constraint().unwrap_or("unique key").to_string(),
                );
            }
            Some(FOREIGN_KEY_VIOLATION) => return on_foreign_key(),
            _ => {}
        }
    }
    StoreError::Database(err)
}

fn page_args(page: Page) -> (i64, i64) {
    (page.limit as i64, page.offset as i64)
}

#[async_trait]
impl AccountRepository for PostgresStore {
    async fn insert_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, login, nickname, password_hash, name, description, avatar_path, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.login)
        .bind(&account.nickname)
        .bind(&account.password_hash)
        .bind(&account.name)
        .bind(&account.description)
        .bind(account.avatar_path.as_ref().map(BlobPath::as_str))
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, || StoreError::Conflict("account".to_string())))?;
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Account> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("account", id))?;
        Self::row_to_account(&row)
    }

    async fn find_account_by_login(&self, login: &str) -> Result<Option<Account>> {
        sqlx::query("SELECT * FROM accounts WHERE login = $1")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::row_to_account)
            .transpose()
    }

    async fn find_account_by_login_or_nickname(
        &self,
        login: &str,
        nickname: &str,
    ) -> Result<Option<Account>> {
        sqlx::query("SELECT * FROM accounts WHERE login = $1 OR nickname = $2 LIMIT 1")
            .bind(login)
            .bind(nickname)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::row_to_account)
            .transpose()
    }

    async fn find_account_by_nickname(&self, nickname: &str) -> Result<Option<Account>> {
        sqlx::query("SELECT * FROM accounts WHERE nickname = $1")
            .bind(nickname)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::row_to_account)
            .transpose()
    }

    async fn update_account(&self, account: &Account) -> Result<Account> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET nickname = $2, name = $3, description = $4, avatar_path = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.nickname)
        .bind(&account.name)
        .bind(&account.description)
        .bind(account.avatar_path.as_ref().map(BlobPath::as_str))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(e, || StoreError::Conflict("nickname".to_string())))?
        .ok_or_else(|| StoreError::not_found("account", account.id))?;
        Self::row_to_account(&row)
    }

    async fn delete_account(&self, id: AccountId) -> Result<Account> {
        let row = sqlx::query("DELETE FROM accounts WHERE id = $1 RETURNING *")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("account", id))?;
        Self::row_to_account(&row)
    }
}

#[async_trait]
impl GarmentRepository for PostgresStore {
    async fn insert_garment(&self, garment: &Garment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO garments (id, owner_id, label, brand, color, sex, image_path, mask_path, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(garment.id.as_uuid())
        .bind(garment.owner_id.as_uuid())
        .bind(&garment.label)
        .bind(&garment.brand)
        .bind(&garment.color)
        .bind(&garment.sex)
        .bind(garment.image_path.as_str())
        .bind(garment.mask_path.as_str())
        .bind(garment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, || StoreError::Conflict("garment".to_string())))?;
        Ok(())
    }

    async fn get_garment(&self, id: GarmentId) -> Result<Garment> {
        let row = sqlx::query("SELECT * FROM garments WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("garment", id))?;
        Self::row_to_garment(&row)
    }

    async fn update_garment(&self, garment: &Garment) -> Result<Garment> {
        let row = sqlx::query(
            r#"
            UPDATE garments
            SET label = $2, brand = $3, color = $4, sex = $5, image_path = $6, mask_path = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(garment.id.as_uuid())
        .bind(&garment.label)
        .bind(&garment.brand)
        .bind(&garment.color)
        .bind(&garment.sex)
        .bind(garment.image_path.as_str())
        .bind(garment.mask_path.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("garment", garment.id))?;
        Self::row_to_garment(&row)
    }

    async fn delete_garment(&self, id: GarmentId) -> Result<Garment> {
        let row = sqlx::query("DELETE FROM garments WHERE id = $1 RETURNING *")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, || StoreError::Conflict(format!("garment {id} is referenced"))))?
            .ok_or_else(|| StoreError::not_found("garment", id))?;
        Self::row_to_garment(&row)
    }

    async fn list_garments(&self, page: Page) -> Result<Vec<Garment>> {
        let (limit, offset) = page_args(page);
        let rows = sqlx::query("SELECT * FROM garments ORDER BY created_at, id LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_garment).collect()
    }

    async fn list_garments_by_owner(&self, owner: AccountId, page: Page) -> Result<Vec<Garment>> {
        let (limit, offset) = page_args(page);
        let rows = sqlx::query(
            "SELECT * FROM garments WHERE owner_id = $1 ORDER BY created_at, id LIMIT $2 OFFSET $3",
        )
        .bind(owner.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_garment).collect()
    }

    async fn find_garments_by_label_and_sex(
        &self,
        label: &str,
        sex: Option<&str>,
    ) -> Result<Vec<Garment>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM garments
            WHERE label = $1 AND sex IS NOT DISTINCT FROM $2
            ORDER BY created_at, id
            "#,
        )
        .bind(label)
        .bind(sex)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_garment).collect()
    }
}

#[async_trait]
impl SimilarityRepository for PostgresStore {
    async fn insert_binding(&self, binding: &SimilarityBinding) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO similarity_bindings (id, subject_id, candidate_id, score)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(binding.id.as_uuid())
        .bind(binding.subject_id.as_uuid())
        .bind(binding.candidate_id.as_uuid())
        .bind(binding.score)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, || StoreError::not_found("garment", binding.candidate_id)))?;
        Ok(())
    }

    async fn delete_binding(&self, id: SimilarityId) -> Result<SimilarityBinding> {
        let row = sqlx::query("DELETE FROM similarity_bindings WHERE id = $1 RETURNING *")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("similarity binding", id))?;
        Self::row_to_binding(&row)
    }

    async fn bindings_for(&self, garment: GarmentId) -> Result<Vec<SimilarityBinding>> {
        let rows = sqlx::query(
            "SELECT * FROM similarity_bindings WHERE subject_id = $1 OR candidate_id = $1 ORDER BY id",
        )
        .bind(garment.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_binding).collect()
    }

    async fn delete_bindings_for(&self, garment: GarmentId) -> Result<Vec<SimilarityBinding>> {
        let rows = sqlx::query(
            "DELETE FROM similarity_bindings WHERE subject_id = $1 OR candidate_id = $1 RETURNING *",
        )
        .bind(garment.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        let mut removed = rows
            .iter()
            .map(Self::row_to_binding)
            .collect::<Result<Vec<_>>>()?;
        removed.sort_by_key(|b| b.id);
        Ok(removed)
    }
}

#[async_trait]
impl OutfitRepository for PostgresStore {
    async fn insert_outfit(&self, outfit: &Outfit) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outfits (id, creator_id, description, image_path, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(outfit.id.as_uuid())
        .bind(outfit.creator_id.as_uuid())
        .bind(&outfit.description)
        .bind(outfit.image_path.as_str())
        .bind(outfit.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, || StoreError::Conflict("outfit".to_string())))?;
        Ok(())
    }

    async fn get_outfit(&self, id: OutfitId) -> Result<Outfit> {
        let row = sqlx::query("SELECT * FROM outfits WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("outfit", id))?;
        Self::row_to_outfit(&row)
    }

    async fn update_outfit(&self, outfit: &Outfit) -> Result<Outfit> {
        let row = sqlx::query(
            r#"
            UPDATE outfits SET description = $2, image_path = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(outfit.id.as_uuid())
        .bind(&outfit.description)
        .bind(outfit.image_path.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("outfit", outfit.id))?;
        Self::row_to_outfit(&row)
    }

    async fn delete_outfit(&self, id: OutfitId) -> Result<Outfit> {
        let row = sqlx::query("DELETE FROM outfits WHERE id = $1 RETURNING *")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                classify(e, || {
                    StoreError::Conflict(format!("outfit {id} still has placements"))
                })
            })?
            .ok_or_else(|| StoreError::not_found("outfit", id))?;
        Self::row_to_outfit(&row)
    }

    async fn insert_placement(&self, placement: &Placement) -> Result<()> {
        let position = i32::try_from(placement.position)
            .map_err(|_| StoreError::Conflict(format!("placement position {}", placement.position)))?;
        sqlx::query(
            r#"
            INSERT INTO outfit_placements (id, outfit_id, garment_id, x, y, rotation, scale, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(placement.id.as_uuid())
        .bind(placement.outfit_id.as_uuid())
        .bind(placement.garment_id.as_uuid())
        .bind(placement.coords.x)
        .bind(placement.coords.y)
        .bind(placement.rotation)
        .bind(placement.scale)
        .bind(position)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, || StoreError::not_found("outfit", placement.outfit_id)))?;
        Ok(())
    }

    async fn delete_placement(&self, id: PlacementId) -> Result<Placement> {
        let row = sqlx::query("DELETE FROM outfit_placements WHERE id = $1 RETURNING *")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("placement", id))?;
        Self::row_to_placement(&row)
    }

    async fn placements_for(&self, outfit: OutfitId) -> Result<Vec<Placement>> {
        let rows =
            sqlx::query("SELECT * FROM outfit_placements WHERE outfit_id = $1 ORDER BY position")
                .bind(outfit.as_uuid())
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(Self::row_to_placement).collect()
    }

    async fn delete_placements_for(&self, outfit: OutfitId) -> Result<Vec<Placement>> {
        let rows = sqlx::query("DELETE FROM outfit_placements WHERE outfit_id = $1 RETURNING *")
            .bind(outfit.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        let mut removed = rows
            .iter()
            .map(Self::row_to_placement)
            .collect::<Result<Vec<_>>>()?;
        removed.sort_by_key(|p| p.position);
        Ok(removed)
    }
}

#[async_trait]
impl PostRepository for PostgresStore {
    async fn insert_post(&self, post: &Post) -> Result<()> {
        let previews: Vec<&str> = post.preview_paths.iter().map(BlobPath::as_str).collect();
        sqlx::query(
            r#"
            INSERT INTO posts (id, creator_id, description, element_type, element_id, preview_paths, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(post.id.as_uuid())
        .bind(post.creator_id.as_uuid())
        .bind(&post.description)
        .bind(post.element.kind().as_str())
        .bind(post.element.element_uuid())
        .bind(&previews)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, || StoreError::Conflict("post".to_string())))?;
        Ok(())
    }

    async fn get_post(&self, id: PostId) -> Result<Post> {
        let row = sqlx::query("SELECT * FROM posts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("post", id))?;
        Self::row_to_post(&row)
    }

    async fn delete_post(&self, id: PostId) -> Result<Post> {
        let row = sqlx::query("DELETE FROM posts WHERE id = $1 RETURNING *")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("post", id))?;
        Self::row_to_post(&row)
    }

    async fn list_posts(&self, page: Page) -> Result<Vec<Post>> {
        let (limit, offset) = page_args(page);
        let rows =
            sqlx::query("SELECT * FROM posts ORDER BY created_at DESC, id LIMIT $1 OFFSET $2")
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(Self::row_to_post).collect()
    }

    async fn list_posts_by_creator(&self, creator: AccountId, page: Page) -> Result<Vec<Post>> {
        let (limit, offset) = page_args(page);
        let rows = sqlx::query(
            r#"
            SELECT * FROM posts WHERE creator_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(creator.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_post).collect()
    }
}
