use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use gixat_core::models::{JobCardComment, JobCardCommentMention, NewComment};
use gixat_core::store::CommentStore;
use gixat_core::workflow;
use gixat_core::{Error, OrganizationId, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Sqlite, SqliteExecutor, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::job_cards::{fetch_job_card, fetch_job_item};
use crate::store::{
    SqliteGarageStore, db_err, flag, int, opt_timestamp, opt_uuid, org_text, text, timestamp, uuid,
};
use crate::users::tenant_users;

const SELECT_COMMENT: &str = r#"
    SELECT m.id, m.job_card_id, m.job_item_id, m.author_id, m.content, m.parent_comment_id,
           m.is_edited, m.edited_at, m.is_deleted, m.deleted_at, m.created_at, m.updated_at
    FROM job_card_comments m
    JOIN job_cards c ON c.id = m.job_card_id
"#;

const SELECT_MENTION: &str = r#"
    SELECT n.id, n.comment_id, n.mentioned_user_id, n.is_read, n.read_at, n.created_at
    FROM job_card_comment_mentions n
    JOIN job_card_comments m ON m.id = n.comment_id
    JOIN job_cards c ON c.id = m.job_card_id
"#;

fn comment_from_row(row: &SqliteRow) -> Result<JobCardComment> {
    Ok(JobCardComment {
        id: uuid(row, "id")?,
        job_card_id: uuid(row, "job_card_id")?,
        job_item_id: opt_uuid(row, "job_item_id")?,
        author_id: uuid(row, "author_id")?,
        content: text(row, "content")?,
        parent_comment_id: opt_uuid(row, "parent_comment_id")?,
        is_edited: flag(row, "is_edited")?,
        edited_at: opt_timestamp(row, "edited_at")?,
        is_deleted: flag(row, "is_deleted")?,
        deleted_at: opt_timestamp(row, "deleted_at")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn mention_from_row(row: &SqliteRow) -> Result<JobCardCommentMention> {
    Ok(JobCardCommentMention {
        id: uuid(row, "id")?,
        comment_id: uuid(row, "comment_id")?,
        mentioned_user_id: uuid(row, "mentioned_user_id")?,
        is_read: flag(row, "is_read")?,
        read_at: opt_timestamp(row, "read_at")?,
        created_at: timestamp(row, "created_at")?,
    })
}

async fn fetch_comment<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<Option<JobCardComment>> {
    let row = sqlx::query(&format!(
        "{} WHERE m.id = ? AND c.organization_id = ?",
        SELECT_COMMENT
    ))
    .bind(id.to_string())
    .bind(org_text(org))
    .fetch_optional(ex)
    .await
    .map_err(db_err)?;
    row.as_ref().map(comment_from_row).transpose()
}

/// Tenant users addressed by the `@handles` in `content`
async fn mentioned_users(
    tx: &mut Transaction<'_, Sqlite>,
    org: OrganizationId,
    content: &str,
) -> Result<HashSet<Uuid>> {
    let handles = workflow::extract_mentions(content);
    if handles.is_empty() {
        return Ok(HashSet::new());
    }
    let users = tenant_users(&mut **tx, org).await?;
    Ok(users
        .into_iter()
        .filter(|u| workflow::mention_matches(&handles, &u.email))
        .map(|u| u.id)
        .collect())
}

async fn insert_mentions(
    tx: &mut Transaction<'_, Sqlite>,
    comment_id: Uuid,
    users: impl IntoIterator<Item = Uuid>,
) -> Result<()> {
    let now = Utc::now();
    for user_id in users {
        sqlx::query(
            r#"
            INSERT INTO job_card_comment_mentions (id, comment_id, mentioned_user_id, is_read, created_at)
            VALUES (?, ?, ?, 0, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(comment_id.to_string())
        .bind(user_id.to_string())
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    }
    Ok(())
}

/// Load a comment and check `author_id` wrote it
async fn owned_comment<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    comment_id: Uuid,
    author_id: Uuid,
    action: &str,
) -> Result<JobCardComment> {
    let comment = fetch_comment(ex, org, comment_id)
        .await?
        .filter(|c| !c.is_deleted)
        .ok_or_else(|| Error::not_found("Comment", comment_id))?;
    if comment.author_id != author_id {
        return Err(Error::Forbidden(format!(
            "You can only {} your own comments",
            action
        )));
    }
    Ok(comment)
}

impl SqliteGarageStore {
    async fn comments_where(
        &self,
        org: OrganizationId,
        clause: &str,
        value: String,
    ) -> Result<Vec<JobCardComment>> {
        let rows = sqlx::query(&format!(
            "{} WHERE c.organization_id = ? AND m.is_deleted = 0 AND {}",
            SELECT_COMMENT, clause
        ))
        .bind(org_text(org))
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(comment_from_row).collect()
    }

    async fn mentions_where(
        &self,
        org: OrganizationId,
        clause: &str,
        value: String,
    ) -> Result<Vec<JobCardCommentMention>> {
        let rows = sqlx::query(&format!(
            "{} WHERE c.organization_id = ? AND {}",
            SELECT_MENTION, clause
        ))
        .bind(org_text(org))
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(mention_from_row).collect()
    }
}

#[async_trait]
impl CommentStore for SqliteGarageStore {
    async fn add_comment(
        &self,
        org: OrganizationId,
        input: NewComment,
    ) -> Result<JobCardComment> {
        let content = workflow::validate_comment_content(&input.content)?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if fetch_job_card(&mut *tx, org, input.job_card_id).await?.is_none() {
            return Err(Error::not_found("Job card", input.job_card_id));
        }
        if let Some(item_id) = input.job_item_id {
            let on_card = fetch_job_item(&mut *tx, org, item_id)
                .await?
                .is_some_and(|item| item.job_card_id == input.job_card_id);
            if !on_card {
                return Err(Error::not_found("Job item", item_id));
            }
        }
        if let Some(parent_id) = input.parent_comment_id {
            let on_card = fetch_comment(&mut *tx, org, parent_id)
                .await?
                .is_some_and(|parent| parent.job_card_id == input.job_card_id);
            if !on_card {
                return Err(Error::not_found("Parent comment", parent_id));
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO job_card_comments (
                id, job_card_id, job_item_id, author_id, content, parent_comment_id,
                is_edited, is_deleted, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.job_card_id.to_string())
        .bind(input.job_item_id.map(|v| v.to_string()))
        .bind(input.author_id.to_string())
        .bind(&content)
        .bind(input.parent_comment_id.map(|v| v.to_string()))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let mentioned = mentioned_users(&mut tx, org, &content).await?;
        debug!("Comment {} mentions {} users", id, mentioned.len());
        insert_mentions(&mut tx, id, mentioned).await?;

        let comment = fetch_comment(&mut *tx, org, id)
            .await?
            .ok_or_else(|| Error::not_found("Comment", id))?;
        tx.commit().await.map_err(db_err)?;
        info!("Comment {} added to job card {}", id, input.job_card_id);
        Ok(comment)
    }

    async fn edit_comment(
        &self,
        org: OrganizationId,
        comment_id: Uuid,
        author_id: Uuid,
        content: String,
    ) -> Result<JobCardComment> {
        let content = workflow::validate_comment_content(&content)?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        owned_comment(&mut *tx, org, comment_id, author_id, "edit").await?;

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE job_card_comments
            SET content = ?, is_edited = 1, edited_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&content)
        .bind(now)
        .bind(now)
        .bind(comment_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let wanted = mentioned_users(&mut tx, org, &content).await?;
        let existing: HashSet<Uuid> = sqlx::query_scalar::<_, String>(
            "SELECT mentioned_user_id FROM job_card_comment_mentions WHERE comment_id = ?",
        )
        .bind(comment_id.to_string())
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?
        .iter()
        .filter_map(|v| Uuid::parse_str(v).ok())
        .collect();

        for stale in existing.difference(&wanted) {
            sqlx::query(
                "DELETE FROM job_card_comment_mentions WHERE comment_id = ? AND mentioned_user_id = ?",
            )
            .bind(comment_id.to_string())
            .bind(stale.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        insert_mentions(&mut tx, comment_id, wanted.difference(&existing).copied()).await?;

        let comment = fetch_comment(&mut *tx, org, comment_id)
            .await?
            .ok_or_else(|| Error::not_found("Comment", comment_id))?;
        tx.commit().await.map_err(db_err)?;
        Ok(comment)
    }

    async fn delete_comment(
        &self,
        org: OrganizationId,
        comment_id: Uuid,
        author_id: Uuid,
    ) -> Result<bool> {
        owned_comment(&self.pool, org, comment_id, author_id, "delete").await?;

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE job_card_comments SET is_deleted = 1, deleted_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(comment_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_mentions_read(
        &self,
        org: OrganizationId,
        user_id: Uuid,
        mention_ids: &[Uuid],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let now = Utc::now();
        let mut touched = 0;
        for mention_id in mention_ids {
            let result = sqlx::query(
                r#"
                UPDATE job_card_comment_mentions SET is_read = 1, read_at = ?
                WHERE id = ? AND mentioned_user_id = ? AND comment_id IN (
                    SELECT m.id FROM job_card_comments m
                    JOIN job_cards c ON c.id = m.job_card_id
                    WHERE c.organization_id = ?
                )
                "#,
            )
            .bind(now)
            .bind(mention_id.to_string())
            .bind(user_id.to_string())
            .bind(org_text(org))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            touched += result.rows_affected();
        }
        tx.commit().await.map_err(db_err)?;
        Ok(touched > 0)
    }

    async fn get_comment(&self, org: OrganizationId, id: Uuid) -> Result<Option<JobCardComment>> {
        Ok(fetch_comment(&self.pool, org, id)
            .await?
            .filter(|c| !c.is_deleted))
    }

    async fn job_card_comments(
        &self,
        org: OrganizationId,
        job_card_id: Uuid,
    ) -> Result<Vec<JobCardComment>> {
        self.comments_where(
            org,
            "m.job_card_id = ? ORDER BY m.created_at, m.rowid",
            job_card_id.to_string(),
        )
        .await
    }

    async fn job_item_comments(
        &self,
        org: OrganizationId,
        job_item_id: Uuid,
    ) -> Result<Vec<JobCardComment>> {
        self.comments_where(
            org,
            "m.job_item_id = ? ORDER BY m.created_at, m.rowid",
            job_item_id.to_string(),
        )
        .await
    }

    async fn comment_replies(
        &self,
        org: OrganizationId,
        comment_id: Uuid,
    ) -> Result<Vec<JobCardComment>> {
        self.comments_where(
            org,
            "m.parent_comment_id = ? ORDER BY m.created_at, m.rowid",
            comment_id.to_string(),
        )
        .await
    }

    async fn comment_mentions(
        &self,
        org: OrganizationId,
        comment_id: Uuid,
    ) -> Result<Vec<JobCardCommentMention>> {
        self.mentions_where(
            org,
            "n.comment_id = ? ORDER BY n.created_at, n.rowid",
            comment_id.to_string(),
        )
        .await
    }

    async fn unread_mentions(
        &self,
        org: OrganizationId,
        user_id: Uuid,
    ) -> Result<Vec<JobCardCommentMention>> {
        self.mentions_where(
            org,
            "n.mentioned_user_id = ? AND n.is_read = 0 AND m.is_deleted = 0 \
             ORDER BY n.created_at DESC, n.rowid DESC",
            user_id.to_string(),
        )
        .await
    }

    async fn unread_mention_count(&self, org: OrganizationId, user_id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS unread
            FROM job_card_comment_mentions n
            JOIN job_card_comments m ON m.id = n.comment_id
            JOIN job_cards c ON c.id = m.job_card_id
            WHERE c.organization_id = ? AND n.mentioned_user_id = ?
              AND n.is_read = 0 AND m.is_deleted = 0
            "#,
        )
        .bind(org_text(org))
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        int(&row, "unread")
    }

    async fn recent_comments(
        &self,
        org: OrganizationId,
        take: i64,
    ) -> Result<Vec<JobCardComment>> {
        let rows = sqlx::query(&format!(
            "{} WHERE c.organization_id = ? AND m.is_deleted = 0 \
             ORDER BY m.created_at DESC, m.rowid DESC LIMIT ?",
            SELECT_COMMENT
        ))
        .bind(org_text(org))
        .bind(take.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(comment_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer_with_car, member, store, tenant};
    use gixat_core::models::{IntakeUpdate, JobCard, User};
    use gixat_core::store::{GarageSessionStore, JobCardStore};

    async fn job_card(store: &SqliteGarageStore, org: OrganizationId) -> JobCard {
        let (customer, car) = customer_with_car(store, org, "20-2").await;
        let session = store.create_session(org, car.id, customer.id).await.unwrap();
        store
            .update_intake(
                org,
                session.id,
                IntakeUpdate {
                    customer_requests: Some("Check the AC".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .generate_initial_report(org, session.id, "ok".into())
            .await
            .unwrap();
        store
            .create_job_card_from_session(org, session.id)
            .await
            .unwrap()
    }

    fn comment(card: &JobCard, author: &User, content: &str) -> NewComment {
        NewComment {
            job_card_id: card.id,
            job_item_id: None,
            parent_comment_id: None,
            author_id: author.id,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_mentions_follow_content() {
        let store = store().await;
        let (org, admin) = tenant(&store, "a").await;
        let sam = member(&store, org, "sam@a.test").await;
        let rana = member(&store, org, "rana@a.test").await;
        let (other_org, _) = tenant(&store, "b").await;
        member(&store, other_org, "sam@b.test").await;
        let card = job_card(&store, org).await;

        let added = store
            .add_comment(org, comment(&card, &admin, "  @Sam please check the compressor  "))
            .await
            .unwrap();
        assert_eq!(added.content, "@Sam please check the compressor");

        let mentions = store.comment_mentions(org, added.id).await.unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].mentioned_user_id, sam.id);
        assert_eq!(store.unread_mention_count(org, sam.id).await.unwrap(), 1);

        let edited = store
            .edit_comment(org, added.id, admin.id, "@rana can you take this?".into())
            .await
            .unwrap();
        assert!(edited.is_edited);
        assert!(edited.edited_at.is_some());

        let mentions = store.comment_mentions(org, added.id).await.unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].mentioned_user_id, rana.id);
        assert_eq!(store.unread_mention_count(org, sam.id).await.unwrap(), 0);

        // Someone else's mention ids are ignored
        let ids: Vec<Uuid> = mentions.iter().map(|m| m.id).collect();
        assert!(!store.mark_mentions_read(org, sam.id, &ids).await.unwrap());
        assert!(store.mark_mentions_read(org, rana.id, &ids).await.unwrap());
        assert!(store.unread_mentions(org, rana.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_author_rules_and_soft_delete() {
        let store = store().await;
        let (org, admin) = tenant(&store, "a").await;
        let sam = member(&store, org, "sam@a.test").await;
        let card = job_card(&store, org).await;

        let first = store
            .add_comment(org, comment(&card, &admin, "Waiting on parts"))
            .await
            .unwrap();
        let mut reply = comment(&card, &sam, "Parts arrive Monday");
        reply.parent_comment_id = Some(first.id);
        let reply = store.add_comment(org, reply).await.unwrap();
        assert_eq!(store.comment_replies(org, first.id).await.unwrap().len(), 1);

        let err = store
            .edit_comment(org, first.id, sam.id, "hijack".into())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "You can only edit your own comments");
        let err = store.delete_comment(org, first.id, sam.id).await.unwrap_err();
        assert_eq!(err.to_string(), "You can only delete your own comments");

        assert!(store.delete_comment(org, reply.id, sam.id).await.unwrap());
        let thread = store.job_card_comments(org, card.id).await.unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].id, first.id);
        assert!(store.get_comment(org, reply.id).await.unwrap().is_none());
        assert_eq!(store.recent_comments(org, 20).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_comment_validation() {
        let store = store().await;
        let (org, admin) = tenant(&store, "a").await;
        let card = job_card(&store, org).await;

        let err = store
            .add_comment(org, comment(&card, &admin, "   "))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Comment content cannot be empty");

        let too_long = "x".repeat(5001);
        assert!(store.add_comment(org, comment(&card, &admin, &too_long)).await.is_err());

        let mut stray = comment(&card, &admin, "Reply to nothing");
        stray.parent_comment_id = Some(Uuid::new_v4());
        let err = store.add_comment(org, stray).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // Another tenant cannot see the card
        let (other_org, other_admin) = tenant(&store, "b").await;
        let err = store
            .add_comment(other_org, comment(&card, &other_admin, "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
