//! Post endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use common::PostId;
use domain::{Post, PostElement, PostKind};
use saga::CreatePost;
use serde::Deserialize;
use uuid::Uuid;

use super::{EncodedImage, PageQuery};
use crate::AppState;
use crate::error::ApiError;
use crate::session::Session;

#[derive(Deserialize)]
pub struct CreatePostRequest {
    #[serde(rename = "type")]
    pub kind: PostKind,
    pub element_id: Uuid,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub previews: Vec<EncodedImage>,
}

/// POST /posts: publishes one of the caller's garments or outfits.
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    Json(body): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let previews = body
        .previews
        .into_iter()
        .map(EncodedImage::decode)
        .collect::<Result<Vec<_>, _>>()?;
    let request = CreatePost {
        element: PostElement::from_parts(body.kind, body.element_id),
        description: body.description,
        previews,
    };
    let post = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows
                .create_post(&mut ctx, &session.account, request)
                .await
        })
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /posts
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let page = query.page();
    let posts = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.list_posts(&mut ctx, page).await
        })
        .await?;
    Ok(Json(posts))
}

/// GET /posts/mine
pub async fn list_mine(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let page = query.page();
    let creator = session.account.id;
    let posts = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.list_posts_by_creator(&mut ctx, creator, page).await
        })
        .await?;
    Ok(Json(posts))
}

/// GET /posts/{id}
pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<PostId>,
) -> Result<Json<Post>, ApiError> {
    let post = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.get_post(&mut ctx, id).await
        })
        .await?;
    Ok(Json(post))
}

/// DELETE /posts/{id}
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    Path(id): Path<PostId>,
) -> Result<Json<Post>, ApiError> {
    let caller = session.account.id;
    let post = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.delete_post(&mut ctx, caller, id).await
        })
        .await?;
    Ok(Json(post))
}
