use async_graphql::{Context, Object, Result, ResultExt};
use gixat_core::graphql::{store, tenant};
use gixat_core::models::{JobCardComment, JobCardCommentMention, NewComment};
use gixat_core::workflow::validate_comment_content;
use uuid::Uuid;

use super::current_user;

#[derive(Default)]
pub struct CommentQuery;

#[Object]
impl CommentQuery {
    /// Oldest first, deleted comments hidden
    async fn job_card_comments(
        &self,
        ctx: &Context<'_>,
        job_card_id: Uuid,
    ) -> Result<Vec<JobCardComment>> {
        store(ctx)?
            .job_card_comments(tenant(ctx)?, job_card_id)
            .await
            .extend()
    }

    async fn job_item_comments(
        &self,
        ctx: &Context<'_>,
        job_item_id: Uuid,
    ) -> Result<Vec<JobCardComment>> {
        store(ctx)?
            .job_item_comments(tenant(ctx)?, job_item_id)
            .await
            .extend()
    }

    async fn comment_by_id(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<JobCardComment>> {
        store(ctx)?.get_comment(tenant(ctx)?, id).await.extend()
    }

    async fn my_unread_mentions(&self, ctx: &Context<'_>) -> Result<Vec<JobCardCommentMention>> {
        let user_id = current_user(ctx)?;
        store(ctx)?
            .unread_mentions(tenant(ctx)?, user_id)
            .await
            .extend()
    }

    async fn unread_mention_count(&self, ctx: &Context<'_>) -> Result<i64> {
        let user_id = current_user(ctx)?;
        store(ctx)?
            .unread_mention_count(tenant(ctx)?, user_id)
            .await
            .extend()
    }

    /// Newest comments across the organization's job cards
    async fn recent_job_card_activity(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 20)] take: i64,
    ) -> Result<Vec<JobCardComment>> {
        store(ctx)?
            .recent_comments(tenant(ctx)?, take.clamp(1, 100))
            .await
            .extend()
    }
}

#[derive(Default)]
pub struct CommentMutation;

#[Object]
impl CommentMutation {
    async fn add_job_card_comment(
        &self,
        ctx: &Context<'_>,
        job_card_id: Uuid,
        content: String,
        job_item_id: Option<Uuid>,
        parent_comment_id: Option<Uuid>,
    ) -> Result<JobCardComment> {
        let author_id = current_user(ctx)?;
        let org = tenant(ctx)?;
        let content = validate_comment_content(&content).extend()?;
        store(ctx)?
            .add_comment(
                org,
                NewComment {
                    job_card_id,
                    job_item_id,
                    parent_comment_id,
                    author_id,
                    content,
                },
            )
            .await
            .extend()
    }

    async fn edit_job_card_comment(
        &self,
        ctx: &Context<'_>,
        comment_id: Uuid,
        content: String,
    ) -> Result<JobCardComment> {
        let author_id = current_user(ctx)?;
        let org = tenant(ctx)?;
        let content = validate_comment_content(&content).extend()?;
        store(ctx)?
            .edit_comment(org, comment_id, author_id, content)
            .await
            .extend()
    }

    async fn delete_job_card_comment(&self, ctx: &Context<'_>, comment_id: Uuid) -> Result<bool> {
        let author_id = current_user(ctx)?;
        store(ctx)?
            .delete_comment(tenant(ctx)?, comment_id, author_id)
            .await
            .extend()
    }

    async fn mark_mentions_as_read(
        &self,
        ctx: &Context<'_>,
        mention_ids: Vec<Uuid>,
    ) -> Result<bool> {
        let user_id = current_user(ctx)?;
        store(ctx)?
            .mark_mentions_read(tenant(ctx)?, user_id, &mention_ids)
            .await
            .extend()
    }
}
