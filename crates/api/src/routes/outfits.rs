//! Outfit composition endpoints. Images travel base64 encoded in the JSON body.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::OutfitId;
use domain::{Outfit, PlacementSpec};
use saga::{ComposeOutfit, OutfitView, UpdateOutfit};
use serde::Deserialize;

use super::EncodedImage;
use crate::AppState;
use crate::error::ApiError;
use crate::session::Session;

#[derive(Deserialize)]
pub struct ComposeOutfitRequest {
    #[serde(default)]
    pub description: String,
    pub image: EncodedImage,
    #[serde(default)]
    pub placements: Vec<PlacementSpec>,
}

#[derive(Deserialize)]
pub struct UpdateOutfitRequest {
    pub description: Option<String>,
    pub image: EncodedImage,
    #[serde(default)]
    pub placements: Vec<PlacementSpec>,
}

/// POST /outfits
pub async fn compose(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    Json(body): Json<ComposeOutfitRequest>,
) -> Result<(StatusCode, Json<OutfitView>), ApiError> {
    let request = ComposeOutfit {
        description: body.description,
        image: body.image.decode()?,
        placements: body.placements,
    };
    let view = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows
                .compose_outfit(&mut ctx, &session.account, request)
                .await
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /outfits/{id}: only visible to the creator.
pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    Path(id): Path<OutfitId>,
) -> Result<Json<OutfitView>, ApiError> {
    let caller = session.account.id;
    let view = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.get_outfit(&mut ctx, caller, id).await
        })
        .await?;
    Ok(Json(view))
}

/// PUT /outfits/{id}: replaces image and placements.
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    Path(id): Path<OutfitId>,
    Json(body): Json<UpdateOutfitRequest>,
) -> Result<Json<OutfitView>, ApiError> {
    let request = UpdateOutfit {
        description: body.description,
        image: body.image.decode()?,
        placements: body.placements,
    };
    let view = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows
                .update_outfit(&mut ctx, &session.account, id, request)
                .await
        })
        .await?;
    Ok(Json(view))
}

/// DELETE /outfits/{id}
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    Path(id): Path<OutfitId>,
) -> Result<Json<Outfit>, ApiError> {
    let caller = session.account.id;
    let outfit = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.delete_outfit(&mut ctx, caller, id).await
        })
        .await?;
    Ok(Json(outfit))
}
