//! Garment ingestion, update, deletion and the similarity scan.

use std::collections::HashSet;

use chrono::Utc;
use common::{AccountId, GarmentId, SimilarityId};
use domain::media::{self, STORED_IMAGE_EXT};
use domain::{
    Account, BlobPath, Garment, GarmentPatch, ImageFormat, MediaKind, SimilarityBinding,
};
use store::Page;

use super::{ImageUpload, Workflows, observe};
use crate::context::WorkflowContext;
use crate::error::{SagaError, WorkflowError};

impl Workflows {
    /// Uploads a garment photo: cut, store image and mask, classify, insert the row.
    ///
    /// Either the full garment exists afterwards (plus any similarity bindings when
    /// the scan runs on ingest) or nothing does.
    #[tracing::instrument(skip(self, ctx, owner, upload), fields(trace_id = %ctx.trace_id(), owner_id = %owner.id))]
    pub async fn ingest_garment(
        &self,
        ctx: &mut WorkflowContext,
        owner: &Account,
        upload: ImageUpload,
    ) -> Result<Garment, WorkflowError> {
        observe("ingest_garment", self.run_ingest_garment(ctx, owner, upload)).await
    }

    async fn run_ingest_garment(
        &self,
        ctx: &mut WorkflowContext,
        owner: &Account,
        upload: ImageUpload,
    ) -> Result<Garment, WorkflowError> {
        let a = &self.adapters;
        let trace_id = ctx.trace_id();

        let format = ctx
            .check(ImageFormat::from_content_type(&upload.content_type))
            .await?;
        ctx.check(media::validate_size(upload.bytes.len(), self.settings.max_upload_bytes))
            .await?;

        let segmented = ctx
            .step(a.cutter.segment(trace_id, &upload.bytes, &upload.file_name, format))
            .await?;

        let now = Utc::now();
        let folder = media::account_folder(&owner.login);

        let image_path = BlobPath::join(
            MediaKind::Garments,
            &folder,
            &media::generate_file_name("garment", STORED_IMAGE_EXT, now),
        );
        ctx.commit(a.blobs.write(&image_path, &segmented.image)).await?;
        register_blob_delete(ctx, self, "garment image", image_path.clone());

        let mask_path = BlobPath::join(
            MediaKind::Masks,
            &folder,
            &media::generate_file_name("mask", STORED_IMAGE_EXT, now),
        );
        ctx.commit(a.blobs.write(&mask_path, &segmented.mask)).await?;
        register_blob_delete(ctx, self, "garment mask", mask_path.clone());

        let label = ctx.step(a.classifier.classify(trace_id, &upload.bytes)).await?;

        let garment = Garment {
            id: GarmentId::new(),
            owner_id: owner.id,
            label,
            brand: String::new(),
            color: String::new(),
            sex: None,
            image_path,
            mask_path,
            created_at: now,
        };
        ctx.commit(a.garments.insert_garment(&garment)).await?;
        {
            let garments = a.garments.clone();
            let id = garment.id;
            ctx.register(format!("delete garment row {id}"), move || async move {
                garments.delete_garment(id).await.map(|_| ()).map_err(SagaError::from)
            });
        }

        if self.settings.scan_on_ingest {
            self.scan_similar(ctx, &garment).await?;
        }

        tracing::info!(garment_id = %garment.id, label = %garment.label, "Garment ingested");
        Ok(garment)
    }

    /// Scores `subject` against garments sharing its label and sex, and binds
    /// every candidate at or above the threshold.
    ///
    /// Registers one delete compensator per binding on the caller's scope.
    /// The subject itself and candidates it is already bound to are skipped.
    #[tracing::instrument(skip(self, ctx, subject), fields(trace_id = %ctx.trace_id(), garment_id = %subject.id))]
    pub async fn scan_similar(
        &self,
        ctx: &mut WorkflowContext,
        subject: &Garment,
    ) -> Result<Vec<SimilarityBinding>, WorkflowError> {
        let a = &self.adapters;

        let same_type = ctx
            .step(
                a.garments
                    .find_garments_by_label_and_sex(&subject.label, subject.sex.as_deref()),
            )
            .await?;
        let already_bound: HashSet<GarmentId> = ctx
            .step(a.similarities.bindings_for(subject.id))
            .await?
            .iter()
            .filter_map(|b| b.other(subject.id))
            .collect();

        let candidates: Vec<(GarmentId, BlobPath)> = same_type
            .into_iter()
            .filter(|g| g.id != subject.id && !already_bound.contains(&g.id))
            .map(|g| (g.id, g.mask_path))
            .collect();
        if candidates.is_empty() {
            tracing::debug!("No similarity candidates");
            return Ok(Vec::new());
        }

        let trace_id = ctx.trace_id();
        let scores = ctx
            .step(a.similarity.score(trace_id, &subject.mask_path, &candidates))
            .await?;

        let mut created = Vec::new();
        for (candidate_id, _) in &candidates {
            let Some(&score) = scores.get(candidate_id) else {
                continue;
            };
            if score < self.settings.similarity_threshold {
                continue;
            }

            let binding = SimilarityBinding {
                id: SimilarityId::new(),
                subject_id: subject.id,
                candidate_id: *candidate_id,
                score,
            };
            ctx.commit(a.similarities.insert_binding(&binding)).await?;
            {
                let similarities = a.similarities.clone();
                let id = binding.id;
                ctx.register(format!("delete similarity binding {id}"), move || async move {
                    similarities.delete_binding(id).await.map(|_| ()).map_err(SagaError::from)
                });
            }
            metrics::counter!("similarity_bindings_created_total").increment(1);
            created.push(binding);
        }

        tracing::info!(bindings = created.len(), "Similarity scan finished");
        Ok(created)
    }

    /// Rescans one of the caller's garments for look-alikes in the foreground.
    #[tracing::instrument(skip(self, ctx), fields(trace_id = %ctx.trace_id()))]
    pub async fn rescan_garment(
        &self,
        ctx: &mut WorkflowContext,
        caller: AccountId,
        garment_id: GarmentId,
    ) -> Result<Vec<SimilarityBinding>, WorkflowError> {
        observe("rescan_garment", async {
            let garment = self.load_own_garment(ctx, caller, garment_id).await?;
            self.scan_similar(ctx, &garment).await
        })
        .await
    }

    /// Applies owner edits to a garment.
    ///
    /// Does not rescan similarity: the update may still be unwound by a later
    /// step of the caller's scope. Once the scope has succeeded, hand it to
    /// [`schedule_similarity_scan`](Self::schedule_similarity_scan).
    #[tracing::instrument(skip(self, ctx, patch), fields(trace_id = %ctx.trace_id()))]
    pub async fn update_garment(
        &self,
        ctx: &mut WorkflowContext,
        caller: AccountId,
        garment_id: GarmentId,
        patch: GarmentPatch,
    ) -> Result<Garment, WorkflowError> {
        observe("update_garment", async {
            let a = &self.adapters;

            let previous = self.load_own_garment(ctx, caller, garment_id).await?;
            let updated = ctx
                .commit(a.garments.update_garment(&previous.patched(&patch)))
                .await?;
            {
                let garments = a.garments.clone();
                ctx.register(format!("restore garment row {garment_id}"), move || async move {
                    garments.update_garment(&previous).await.map(|_| ()).map_err(SagaError::from)
                });
            }

            Ok(updated)
        })
        .await
    }

    /// Ends a successful scope by rescanning `garment` in the background.
    ///
    /// Takes the finished context by value so no later step can unwind the
    /// edit the scan reads. The scan runs on a detached context and stack;
    /// its outcome is only published on [`BackgroundTasks`](crate::BackgroundTasks).
    /// Returns false if the scan was skipped because shutdown has begun.
    pub fn schedule_similarity_scan(&self, ctx: WorkflowContext, garment: Garment) -> bool {
        let workflows = self.clone();
        let trace_id = ctx.trace_id();
        let garment_id = garment.id;

        let spawned = self.background.spawn("similarity_scan", trace_id, |token| {
            let mut scan_ctx = ctx.detached(token);
            async move {
                observe("similarity_scan", workflows.scan_similar(&mut scan_ctx, &garment))
                    .await
                    .map(|_| ())
            }
        });
        if !spawned {
            tracing::warn!(%trace_id, %garment_id, "Similarity scan skipped");
        }
        spawned
    }

    /// Loads a garment and rejects callers other than its owner.
    async fn load_own_garment(
        &self,
        ctx: &mut WorkflowContext,
        caller: AccountId,
        garment_id: GarmentId,
    ) -> Result<Garment, WorkflowError> {
        let garment = ctx.step(self.adapters.garments.get_garment(garment_id)).await?;
        if !garment.is_owned_by(caller) {
            return Err(ctx
                .fail(SagaError::Forbidden(format!(
                    "garment {garment_id} belongs to another account"
                )))
                .await);
        }
        Ok(garment)
    }

    /// Deletes a garment with its similarity bindings, row and files.
    ///
    /// Bindings, the row and both files are captured before they are destroyed
    /// so a later failure can put everything back.
    #[tracing::instrument(skip(self, ctx), fields(trace_id = %ctx.trace_id()))]
    pub async fn delete_garment(
        &self,
        ctx: &mut WorkflowContext,
        caller: AccountId,
        garment_id: GarmentId,
    ) -> Result<Garment, WorkflowError> {
        observe("delete_garment", async {
            let a = &self.adapters;

            self.load_own_garment(ctx, caller, garment_id).await?;
            let bindings = ctx
                .commit(a.similarities.delete_bindings_for(garment_id))
                .await?;
            if !bindings.is_empty() {
                let similarities = a.similarities.clone();
                ctx.register(
                    format!("restore {} similarity bindings of {garment_id}", bindings.len()),
                    move || async move {
                        let mut first_error = None;
                        for binding in &bindings {
                            if let Err(e) = similarities.insert_binding(binding).await {
                                first_error.get_or_insert(e);
                            }
                        }
                        first_error.map_or(Ok(()), |e| Err(SagaError::from(e)))
                    },
                );
            }

            let row = ctx.commit(a.garments.delete_garment(garment_id)).await?;
            {
                let garments = a.garments.clone();
                let row = row.clone();
                ctx.register(format!("restore garment row {garment_id}"), move || async move {
                    garments.insert_garment(&row).await.map_err(SagaError::from)
                });
            }

            for path in [row.image_path.clone(), row.mask_path.clone()] {
                self.destroy_blob(ctx, path).await?;
            }

            Ok(row)
        })
        .await
    }

    pub async fn get_garment(
        &self,
        ctx: &mut WorkflowContext,
        garment_id: GarmentId,
    ) -> Result<Garment, WorkflowError> {
        ctx.step(self.adapters.garments.get_garment(garment_id)).await
    }

    pub async fn list_garments(
        &self,
        ctx: &mut WorkflowContext,
        page: Page,
    ) -> Result<Vec<Garment>, WorkflowError> {
        ctx.step(self.adapters.garments.list_garments(page)).await
    }

    pub async fn list_garments_by_owner(
        &self,
        ctx: &mut WorkflowContext,
        owner: AccountId,
        page: Page,
    ) -> Result<Vec<Garment>, WorkflowError> {
        ctx.step(self.adapters.garments.list_garments_by_owner(owner, page))
            .await
    }

    /// Reads a file, deletes it and registers a compensator that rewrites the
    /// captured bytes to the same path.
    pub(super) async fn destroy_blob(
        &self,
        ctx: &mut WorkflowContext,
        path: BlobPath,
    ) -> Result<(), WorkflowError> {
        let blobs = self.adapters.blobs.clone();

        let bytes = ctx.step(blobs.read(&path)).await?;
        ctx.commit(blobs.delete(&path)).await?;
        ctx.register(format!("rewrite file {path}"), move || async move {
            blobs.write(&path, &bytes).await.map_err(SagaError::from)
        });
        Ok(())
    }
}

/// Registers "delete this file" for a freshly written blob.
/// Deletes a file that a committed row no longer references.
///
/// Runs as the last step and registers no compensator. A file that is already
/// gone is logged and skipped.
pub(super) async fn delete_replaced_blob(
    ctx: &mut WorkflowContext,
    workflows: &Workflows,
    what: &str,
    path: &BlobPath,
) -> Result<(), WorkflowError> {
    if let Some(cause) = ctx.interruption() {
        return Err(ctx.fail(cause).await);
    }
    match workflows.adapters.blobs.delete(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => {
            tracing::warn!(%path, file = what, "Replaced file already gone");
            Ok(())
        }
        Err(e) => Err(ctx.fail(e).await),
    }
}

pub(super) fn register_blob_delete(
    ctx: &mut WorkflowContext,
    workflows: &Workflows,
    what: &str,
    path: BlobPath,
) {
    let blobs = workflows.adapters.blobs.clone();
    ctx.register(format!("delete {what} {path}"), move || async move {
        blobs.delete(&path).await.map_err(SagaError::from)
    });
}
