//! Outfit composition, update, deletion and reads.

use std::sync::Arc;

use chrono::Utc;
use common::{AccountId, OutfitId};
use domain::media;
use domain::{Account, BlobPath, MediaKind, Outfit, PlacedGarment, Placement, PlacementSpec};
use serde::Serialize;
use store::{OutfitRepository, StoreError};

use super::garment::{delete_replaced_blob, register_blob_delete};
use super::{ImageUpload, Workflows, observe};
use crate::context::WorkflowContext;
use crate::error::{SagaError, WorkflowError};

/// Input of [`Workflows::compose_outfit`].
#[derive(Debug, Clone)]
pub struct ComposeOutfit {
    pub description: String,
    pub image: ImageUpload,
    pub placements: Vec<PlacementSpec>,
}

/// Input of [`Workflows::update_outfit`]. Placements are fully replaced.
#[derive(Debug, Clone)]
pub struct UpdateOutfit {
    /// New description, or `None` to keep the current one.
    pub description: Option<String>,
    pub image: ImageUpload,
    pub placements: Vec<PlacementSpec>,
}

/// An outfit with its placements enriched by garment display fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutfitView {
    #[serde(flatten)]
    pub outfit: Outfit,
    pub garments: Vec<PlacedGarment>,
}

impl Workflows {
    /// Stores the outfit image, inserts the outfit row and one placement per garment.
    #[tracing::instrument(skip(self, ctx, creator, request), fields(trace_id = %ctx.trace_id(), creator_id = %creator.id))]
    pub async fn compose_outfit(
        &self,
        ctx: &mut WorkflowContext,
        creator: &Account,
        request: ComposeOutfit,
    ) -> Result<OutfitView, WorkflowError> {
        observe("compose_outfit", async {
            let a = &self.adapters;
            let image_path = self.store_outfit_image(ctx, &request.image).await?;

            let outfit = Outfit {
                id: OutfitId::new(),
                creator_id: creator.id,
                description: request.description,
                image_path,
                created_at: Utc::now(),
            };
            ctx.commit(a.outfits.insert_outfit(&outfit)).await?;
            {
                let outfits = a.outfits.clone();
                let id = outfit.id;
                ctx.register(format!("delete outfit row {id}"), move || async move {
                    outfits.delete_outfit(id).await.map(|_| ()).map_err(SagaError::from)
                });
            }

            let garments = self
                .insert_placements(ctx, outfit.id, &request.placements)
                .await?;

            tracing::info!(outfit_id = %outfit.id, garments = garments.len(), "Outfit composed");
            Ok(OutfitView { outfit, garments })
        })
        .await
    }

    /// Replaces an outfit's image, description and placements.
    ///
    /// The previous image file is deleted last and has no compensator: after a
    /// failure the rows and the new file are rolled back, the old file is not
    /// touched, and once this returns successfully the old file is gone for good.
    #[tracing::instrument(skip(self, ctx, caller, request), fields(trace_id = %ctx.trace_id(), caller_id = %caller.id))]
    pub async fn update_outfit(
        &self,
        ctx: &mut WorkflowContext,
        caller: &Account,
        outfit_id: OutfitId,
        request: UpdateOutfit,
    ) -> Result<OutfitView, WorkflowError> {
        observe("update_outfit", async {
            let a = &self.adapters;

            let previous = self.load_own_outfit(ctx, caller.id, outfit_id).await?;
            let image_path = self.store_outfit_image(ctx, &request.image).await?;

            let next = Outfit {
                description: request
                    .description
                    .unwrap_or_else(|| previous.description.clone()),
                image_path,
                ..previous.clone()
            };
            let updated = ctx.commit(a.outfits.update_outfit(&next)).await?;
            {
                let outfits = a.outfits.clone();
                let previous = previous.clone();
                ctx.register(format!("restore outfit row {outfit_id}"), move || async move {
                    outfits.update_outfit(&previous).await.map(|_| ()).map_err(SagaError::from)
                });
            }

            let old_placements = ctx.commit(a.outfits.delete_placements_for(outfit_id)).await?;
            register_placements_restore(ctx, a.outfits.clone(), outfit_id, old_placements);

            let garments = self
                .insert_placements(ctx, outfit_id, &request.placements)
                .await?;

            delete_replaced_blob(ctx, self, "outfit image", &previous.image_path).await?;

            tracing::info!(%outfit_id, garments = garments.len(), "Outfit updated");
            Ok(OutfitView {
                outfit: updated,
                garments,
            })
        })
        .await
    }

    /// Deletes an outfit's placements and row. The image file is kept.
    #[tracing::instrument(skip(self, ctx), fields(trace_id = %ctx.trace_id()))]
    pub async fn delete_outfit(
        &self,
        ctx: &mut WorkflowContext,
        caller: AccountId,
        outfit_id: OutfitId,
    ) -> Result<Outfit, WorkflowError> {
        observe("delete_outfit", async {
            let a = &self.adapters;
            self.load_own_outfit(ctx, caller, outfit_id).await?;

            let placements = ctx.commit(a.outfits.delete_placements_for(outfit_id)).await?;
            register_placements_restore(ctx, a.outfits.clone(), outfit_id, placements);

            let row = ctx.commit(a.outfits.delete_outfit(outfit_id)).await?;
            {
                let outfits = a.outfits.clone();
                let row = row.clone();
                ctx.register(format!("restore outfit row {outfit_id}"), move || async move {
                    outfits.insert_outfit(&row).await.map_err(SagaError::from)
                });
            }

            Ok(row)
        })
        .await
    }

    /// Reads one of the caller's outfits with its placements.
    ///
    /// Placements whose garment has since been deleted are left out.
    pub async fn get_outfit(
        &self,
        ctx: &mut WorkflowContext,
        caller: AccountId,
        outfit_id: OutfitId,
    ) -> Result<OutfitView, WorkflowError> {
        let a = &self.adapters;
        let outfit = self.load_own_outfit(ctx, caller, outfit_id).await?;
        let placements = ctx.step(a.outfits.placements_for(outfit_id)).await?;

        let mut garments = Vec::with_capacity(placements.len());
        for placement in placements {
            let garment = match ctx.guard(a.garments.get_garment(placement.garment_id)).await {
                Ok(garment) => garment,
                Err(SagaError::Store(e)) if e.is_not_found() => {
                    tracing::warn!(
                        %outfit_id,
                        garment_id = %placement.garment_id,
                        "Placed garment no longer exists"
                    );
                    continue;
                }
                Err(cause) => return Err(ctx.fail(cause).await),
            };
            garments.push(PlacedGarment {
                garment_id: garment.id,
                label: garment.display_label(),
                placement,
            });
        }
        Ok(OutfitView { outfit, garments })
    }

    /// Loads an outfit and rejects callers other than its creator.
    async fn load_own_outfit(
        &self,
        ctx: &mut WorkflowContext,
        caller: AccountId,
        outfit_id: OutfitId,
    ) -> Result<Outfit, WorkflowError> {
        let outfit = ctx.step(self.adapters.outfits.get_outfit(outfit_id)).await?;
        if !outfit.is_created_by(caller) {
            return Err(ctx
                .fail(SagaError::Forbidden(format!(
                    "outfit {outfit_id} belongs to another account"
                )))
                .await);
        }
        Ok(outfit)
    }

    /// Validates and writes an outfit image into today's folder.
    async fn store_outfit_image(
        &self,
        ctx: &mut WorkflowContext,
        image: &ImageUpload,
    ) -> Result<BlobPath, WorkflowError> {
        let ext = ctx.check(media::validate_image_name(&image.file_name)).await?;
        ctx.check(media::validate_size(image.bytes.len(), self.settings.max_upload_bytes))
            .await?;

        let now = Utc::now();
        let path = BlobPath::join(
            MediaKind::Outfits,
            &media::dated_folder(now.date_naive()),
            &media::generate_file_name("outfit", &ext, now),
        );
        ctx.commit(self.adapters.blobs.write(&path, &image.bytes)).await?;
        register_blob_delete(ctx, self, "outfit image", path.clone());
        Ok(path)
    }

    /// Inserts one placement per spec, in order, each with its own delete compensator.
    async fn insert_placements(
        &self,
        ctx: &mut WorkflowContext,
        outfit_id: OutfitId,
        specs: &[PlacementSpec],
    ) -> Result<Vec<PlacedGarment>, WorkflowError> {
        let a = &self.adapters;
        let mut placed = Vec::with_capacity(specs.len());

        for (position, spec) in (0u32..).zip(specs) {
            let placement = Placement::from_spec(outfit_id, position, spec);
            ctx.commit(a.outfits.insert_placement(&placement)).await?;
            {
                let outfits = a.outfits.clone();
                let id = placement.id;
                ctx.register(format!("delete placement {id}"), move || async move {
                    outfits.delete_placement(id).await.map(|_| ()).map_err(SagaError::from)
                });
            }

            let garment = ctx.step(a.garments.get_garment(spec.garment_id)).await?;
            placed.push(PlacedGarment {
                garment_id: garment.id,
                label: garment.display_label(),
                placement,
            });
        }
        Ok(placed)
    }
}

/// Registers "re-insert these exact placements" for placements just deleted.
fn register_placements_restore(
    ctx: &mut WorkflowContext,
    outfits: Arc<dyn OutfitRepository>,
    outfit_id: OutfitId,
    placements: Vec<Placement>,
) {
    if placements.is_empty() {
        return;
    }
    ctx.register(
        format!("restore {} placements of outfit {outfit_id}", placements.len()),
        move || async move {
            let mut first_error: Option<StoreError> = None;
            for placement in &placements {
                if let Err(e) = outfits.insert_placement(placement).await {
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), |e| Err(SagaError::from(e)))
        },
    );
}
