//! Garment upload, catalogue and owner edit endpoints.

use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use common::GarmentId;
use domain::{Garment, GarmentPatch, SimilarityBinding};

use super::{PageQuery, read_upload};
use crate::AppState;
use crate::error::ApiError;
use crate::session::Session;

/// POST /garments: multipart photo upload, segmented and classified.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Garment>), ApiError> {
    let upload = read_upload(multipart).await?;
    let garment = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows
                .ingest_garment(&mut ctx, &session.account, upload)
                .await
        })
        .await?;
    Ok((StatusCode::CREATED, Json(garment)))
}

/// GET /garments
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Garment>>, ApiError> {
    let page = query.page();
    let garments = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.list_garments(&mut ctx, page).await
        })
        .await?;
    Ok(Json(garments))
}

/// GET /garments/mine
pub async fn list_mine(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Garment>>, ApiError> {
    let page = query.page();
    let owner = session.account.id;
    let garments = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.list_garments_by_owner(&mut ctx, owner, page).await
        })
        .await?;
    Ok(Json(garments))
}

/// GET /garments/{id}
pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<GarmentId>,
) -> Result<Json<Garment>, ApiError> {
    let garment = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.get_garment(&mut ctx, id).await
        })
        .await?;
    Ok(Json(garment))
}

/// PUT /garments/{id}: owner edit; similarity is rescanned in the background.
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    Path(id): Path<GarmentId>,
    Json(patch): Json<GarmentPatch>,
) -> Result<Json<Garment>, ApiError> {
    let caller = session.account.id;
    let garment = state
        .run(&headers, move |workflows, mut ctx| async move {
            let garment = workflows.update_garment(&mut ctx, caller, id, patch).await?;
            workflows.schedule_similarity_scan(ctx, garment.clone());
            Ok(garment)
        })
        .await?;
    Ok(Json(garment))
}

/// POST /garments/{id}/similar: scans the owner's garment for look-alikes now.
pub async fn scan(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    Path(id): Path<GarmentId>,
) -> Result<Json<Vec<SimilarityBinding>>, ApiError> {
    let caller = session.account.id;
    let bindings = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.rescan_garment(&mut ctx, caller, id).await
        })
        .await?;
    Ok(Json(bindings))
}

/// DELETE /garments/{id}
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    Path(id): Path<GarmentId>,
) -> Result<Json<Garment>, ApiError> {
    let caller = session.account.id;
    let garment = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.delete_garment(&mut ctx, caller, id).await
        })
        .await?;
    Ok(Json(garment))
}
