//! Post creation, deletion and reads.

use chrono::Utc;
use common::{AccountId, PostId};
use domain::media;
use domain::{Account, BlobPath, MediaKind, Post, PostElement};
use store::Page;

use super::garment::register_blob_delete;
use super::{ImageUpload, Workflows, observe};
use crate::context::WorkflowContext;
use crate::error::{SagaError, WorkflowError};

/// Input of [`Workflows::create_post`].
#[derive(Debug, Clone)]
pub struct CreatePost {
    pub element: PostElement,
    pub description: String,
    pub previews: Vec<ImageUpload>,
}

impl Workflows {
    /// Publishes a post about one of the creator's garments or outfits.
    #[tracing::instrument(skip(self, ctx, creator, request), fields(trace_id = %ctx.trace_id(), creator_id = %creator.id))]
    pub async fn create_post(
        &self,
        ctx: &mut WorkflowContext,
        creator: &Account,
        request: CreatePost,
    ) -> Result<Post, WorkflowError> {
        observe("create_post", async {
            let a = &self.adapters;

            let owner = match request.element {
                PostElement::Garment(id) => ctx.step(a.garments.get_garment(id)).await?.owner_id,
                PostElement::Outfit(id) => ctx.step(a.outfits.get_outfit(id)).await?.creator_id,
            };
            if owner != creator.id {
                return Err(ctx
                    .fail(SagaError::Forbidden(format!(
                        "{} {} belongs to another account",
                        request.element.kind().as_str(),
                        request.element.element_uuid()
                    )))
                    .await);
            }

            let folder = media::dated_folder(Utc::now().date_naive());
            let mut preview_paths = Vec::with_capacity(request.previews.len());
            for preview in &request.previews {
                let ext = ctx.check(media::validate_image_name(&preview.file_name)).await?;
                ctx.check(media::validate_size(
                    preview.bytes.len(),
                    self.settings.max_upload_bytes,
                ))
                .await?;

                let path = BlobPath::join(
                    MediaKind::Posts,
                    &folder,
                    &media::generate_file_name("preview", &ext, Utc::now()),
                );
                ctx.commit(a.blobs.write(&path, &preview.bytes)).await?;
                register_blob_delete(ctx, self, "post preview", path.clone());
                preview_paths.push(path);
            }

            let post = Post {
                id: PostId::new(),
                creator_id: creator.id,
                description: request.description,
                element: request.element,
                preview_paths,
                created_at: Utc::now(),
            };
            ctx.commit(a.posts.insert_post(&post)).await?;
            {
                let posts = a.posts.clone();
                let id = post.id;
                ctx.register(format!("delete post row {id}"), move || async move {
                    posts.delete_post(id).await.map(|_| ()).map_err(SagaError::from)
                });
            }

            tracing::info!(post_id = %post.id, previews = post.preview_paths.len(), "Post created");
            Ok(post)
        })
        .await
    }

    /// Deletes a post and its preview files.
    ///
    /// The row and every preview's bytes are captured first, so an unwind
    /// restores the post exactly as it was.
    #[tracing::instrument(skip(self, ctx), fields(trace_id = %ctx.trace_id()))]
    pub async fn delete_post(
        &self,
        ctx: &mut WorkflowContext,
        caller: AccountId,
        post_id: PostId,
    ) -> Result<Post, WorkflowError> {
        observe("delete_post", async {
            let a = &self.adapters;

            let post = ctx.step(a.posts.get_post(post_id)).await?;
            if !post.is_created_by(caller) {
                return Err(ctx
                    .fail(SagaError::Forbidden(format!(
                        "post {post_id} belongs to another account"
                    )))
                    .await);
            }

            let row = ctx.commit(a.posts.delete_post(post_id)).await?;
            {
                let posts = a.posts.clone();
                let row = row.clone();
                ctx.register(format!("restore post row {post_id}"), move || async move {
                    posts.insert_post(&row).await.map_err(SagaError::from)
                });
            }

            for path in &row.preview_paths {
                self.destroy_blob(ctx, path.clone()).await?;
            }

            Ok(row)
        })
        .await
    }

    pub async fn get_post(
        &self,
        ctx: &mut WorkflowContext,
        post_id: PostId,
    ) -> Result<Post, WorkflowError> {
        ctx.step(self.adapters.posts.get_post(post_id)).await
    }

    /// All posts, newest first.
    pub async fn list_posts(
        &self,
        ctx: &mut WorkflowContext,
        page: Page,
    ) -> Result<Vec<Post>, WorkflowError> {
        ctx.step(self.adapters.posts.list_posts(page)).await
    }

    pub async fn list_posts_by_creator(
        &self,
        ctx: &mut WorkflowContext,
        creator: AccountId,
        page: Page,
    ) -> Result<Vec<Post>, WorkflowError> {
        ctx.step(self.adapters.posts.list_posts_by_creator(creator, page))
            .await
    }
}
