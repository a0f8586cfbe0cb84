//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, SubsecRound, Utc};
use common::{AccountId, GarmentId, OutfitId, PlacementId, PostId, SimilarityId};
use domain::{
    Account, BlobPath, Coords, Garment, Outfit, Placement, Post, PostElement, SimilarityBinding,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    AccountRepository, GarmentRepository, OutfitRepository, Page, PostRepository, PostgresStore,
    SimilarityRepository, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_wardrobe_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE similarity_bindings, outfit_placements, outfits, posts, garments, accounts",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

// Postgres keeps microseconds, so fixtures truncate before comparing rows.
fn account(login: &str, nickname: &str) -> Account {
    Account {
        id: AccountId::new(),
        login: login.to_string(),
        nickname: nickname.to_string(),
        password_hash: "$argon2id$stub".to_string(),
        name: "Name".to_string(),
        description: String::new(),
        avatar_path: None,
        created_at: Utc::now().trunc_subsecs(6),
    }
}

fn garment(owner: AccountId, label: &str, sex: Option<&str>) -> Garment {
    Garment {
        id: GarmentId::new(),
        owner_id: owner,
        label: label.to_string(),
        brand: "Brand".to_string(),
        color: "black".to_string(),
        sex: sex.map(String::from),
        image_path: BlobPath::new(format!("garments/f/{}.webp", uuid::Uuid::new_v4())),
        mask_path: BlobPath::new(format!("masks/f/{}.webp", uuid::Uuid::new_v4())),
        created_at: Utc::now().trunc_subsecs(6),
    }
}

#[tokio::test]
#[serial]
async fn test_account_round_trip_and_uniqueness() {
    let store = get_test_store().await;
    let alice = account("alice@example.com", "alice");

    store.insert_account(&alice).await.unwrap();
    assert_eq!(store.get_account(alice.id).await.unwrap(), alice);

    let dup = account("alice@example.com", "other");
    assert!(matches!(
        store.insert_account(&dup).await,
        Err(StoreError::Conflict(_))
    ));

    let found = store
        .find_account_by_login_or_nickname("nobody", "alice")
        .await
        .unwrap();
    assert_eq!(found.map(|a| a.id), Some(alice.id));

    let removed = store.delete_account(alice.id).await.unwrap();
    assert_eq!(removed, alice);

    // A captured row re-inserts verbatim
    store.insert_account(&removed).await.unwrap();
    assert_eq!(store.get_account(alice.id).await.unwrap(), alice);
}

#[tokio::test]
#[serial]
async fn test_account_profile_and_avatar_update() {
    let store = get_test_store().await;
    let alice = account("alice@example.com", "alice");
    let bob = account("bob@example.com", "bob");
    store.insert_account(&alice).await.unwrap();
    store.insert_account(&bob).await.unwrap();

    let mut next = alice.clone();
    next.nickname = "bob".to_string();
    assert!(matches!(
        store.update_account(&next).await,
        Err(StoreError::Conflict(_))
    ));

    next.nickname = "ally".to_string();
    next.avatar_path = Some(BlobPath::new("avatars/a/avatar_1.webp"));
    let updated = store.update_account(&next).await.unwrap();
    assert_eq!(updated, next);
    assert_eq!(
        store.find_account_by_nickname("ally").await.unwrap(),
        Some(next.clone())
    );

    next.avatar_path = None;
    assert_eq!(store.update_account(&next).await.unwrap().avatar_path, None);
}

#[tokio::test]
#[serial]
async fn test_garment_update_and_candidates() {
    let store = get_test_store().await;
    let owner = AccountId::new();
    let mut tee = garment(owner, "Tee", Some("female"));
    store.insert_garment(&tee).await.unwrap();
    store
        .insert_garment(&garment(owner, "Tee", None))
        .await
        .unwrap();

    tee.color = "white".to_string();
    let updated = store.update_garment(&tee).await.unwrap();
    assert_eq!(updated.color, "white");

    let female = store
        .find_garments_by_label_and_sex("Tee", Some("female"))
        .await
        .unwrap();
    assert_eq!(female.len(), 1);
    let unset = store
        .find_garments_by_label_and_sex("Tee", None)
        .await
        .unwrap();
    assert_eq!(unset.len(), 1);

    let mine = store
        .list_garments_by_owner(owner, Page::default())
        .await
        .unwrap();
    assert_eq!(mine.len(), 2);
}

#[tokio::test]
#[serial]
async fn test_bindings_block_garment_delete_until_removed() {
    let store = get_test_store().await;
    let owner = AccountId::new();
    let a = garment(owner, "Tee", None);
    let b = garment(owner, "Tee", None);
    store.insert_garment(&a).await.unwrap();
    store.insert_garment(&b).await.unwrap();

    let binding = SimilarityBinding {
        id: SimilarityId::new(),
        subject_id: b.id,
        candidate_id: a.id,
        score: 88,
    };
    store.insert_binding(&binding).await.unwrap();
    assert_eq!(store.bindings_for(a.id).await.unwrap(), vec![binding.clone()]);

    assert!(matches!(
        store.delete_garment(a.id).await,
        Err(StoreError::Conflict(_))
    ));

    let removed = store.delete_bindings_for(a.id).await.unwrap();
    assert_eq!(removed, vec![binding]);
    assert_eq!(store.delete_garment(a.id).await.unwrap(), a);
}

#[tokio::test]
#[serial]
async fn test_outfit_with_placements() {
    let store = get_test_store().await;
    let outfit = Outfit {
        id: OutfitId::new(),
        creator_id: AccountId::new(),
        description: "evening".to_string(),
        image_path: BlobPath::new("outfits/d/look.png"),
        created_at: Utc::now().trunc_subsecs(6),
    };
    store.insert_outfit(&outfit).await.unwrap();

    for position in [1u32, 0] {
        let placement = Placement {
            id: PlacementId::new(),
            outfit_id: outfit.id,
            garment_id: GarmentId::new(),
            coords: Coords { x: 10, y: 20 },
            rotation: 15.0,
            scale: 0.5,
            position,
        };
        store.insert_placement(&placement).await.unwrap();
    }

    let placements = store.placements_for(outfit.id).await.unwrap();
    assert_eq!(
        placements.iter().map(|p| p.position).collect::<Vec<_>>(),
        vec![0, 1]
    );

    assert!(store.delete_outfit(outfit.id).await.is_err());
    store.delete_placements_for(outfit.id).await.unwrap();
    assert_eq!(store.delete_outfit(outfit.id).await.unwrap(), outfit);
}

#[tokio::test]
#[serial]
async fn test_posts_round_trip_with_previews() {
    let store = get_test_store().await;
    let creator = AccountId::new();
    let now = Utc::now().trunc_subsecs(6);

    let older = Post {
        id: PostId::new(),
        creator_id: creator,
        description: "first".to_string(),
        element: PostElement::Outfit(OutfitId::new()),
        preview_paths: vec![BlobPath::new("posts/a/1.png"), BlobPath::new("posts/a/2.png")],
        created_at: now - Duration::seconds(10),
    };
    let newer = Post {
        id: PostId::new(),
        creator_id: creator,
        description: "second".to_string(),
        element: PostElement::Garment(GarmentId::new()),
        preview_paths: vec![],
        created_at: now,
    };
    store.insert_post(&older).await.unwrap();
    store.insert_post(&newer).await.unwrap();

    assert_eq!(store.get_post(older.id).await.unwrap(), older);

    let listed = store
        .list_posts_by_creator(creator, Page::new(10, 0))
        .await
        .unwrap();
    assert_eq!(listed, vec![newer.clone(), older.clone()]);

    let removed = store.delete_post(older.id).await.unwrap();
    assert_eq!(removed, older);
    assert!(store.get_post(older.id).await.unwrap_err().is_not_found());
}
