use async_trait::async_trait;
use chrono::Utc;
use gixat_core::models::{
    JobCardMedia, JobCardMediaType, JobItemMedia, Media, MediaOwner, NewMedia, SessionMedia,
    SessionStage,
};
use gixat_core::store::MediaStore;
use gixat_core::{Error, OrganizationId, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Sqlite, SqliteExecutor, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::job_cards::{fetch_job_card, fetch_job_item};
use crate::sessions::fetch_session;
use crate::store::{
    SqliteGarageStore, db_err, opt_text, opt_uuid, org_text, parsed, text, timestamp, uuid,
};

const SELECT_MEDIA: &str = "SELECT id, organization_id, key, alt, media_type, created_at FROM media";

fn media_from_row(row: &SqliteRow) -> Result<Media> {
    Ok(Media {
        id: uuid(row, "id")?,
        organization_id: opt_uuid(row, "organization_id")?,
        key: text(row, "key")?,
        alt: opt_text(row, "alt")?,
        media_type: parsed(row, "media_type")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn session_media_from_row(row: &SqliteRow) -> Result<SessionMedia> {
    Ok(SessionMedia {
        id: uuid(row, "id")?,
        session_id: uuid(row, "session_id")?,
        media_id: uuid(row, "media_id")?,
        stage: parsed(row, "stage")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn job_card_media_from_row(row: &SqliteRow) -> Result<JobCardMedia> {
    Ok(JobCardMedia {
        job_card_id: uuid(row, "job_card_id")?,
        media_id: uuid(row, "media_id")?,
        media_type: parsed(row, "media_type")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn job_item_media_from_row(row: &SqliteRow) -> Result<JobItemMedia> {
    Ok(JobItemMedia {
        job_item_id: uuid(row, "job_item_id")?,
        media_id: uuid(row, "media_id")?,
        media_type: parsed(row, "media_type")?,
        created_at: timestamp(row, "created_at")?,
    })
}

async fn fetch_media<'e>(ex: impl SqliteExecutor<'e>, id: Uuid) -> Result<Option<Media>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_MEDIA))
        .bind(id.to_string())
        .fetch_optional(ex)
        .await
        .map_err(db_err)?;
    row.as_ref().map(media_from_row).transpose()
}

async fn insert_media(
    tx: &mut Transaction<'_, Sqlite>,
    org: Option<OrganizationId>,
    media: &NewMedia,
) -> Result<Media> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO media (id, organization_id, key, alt, media_type, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(org.map(org_text))
    .bind(&media.key)
    .bind(&media.alt)
    .bind(media.media_type.as_str())
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;

    debug!("Stored media {} at {}", id, media.key);
    Ok(Media {
        id,
        organization_id: org.map(|o| *o.as_uuid()),
        key: media.key.clone(),
        alt: media.alt.clone(),
        media_type: media.media_type,
        created_at: now,
    })
}

async fn fetch_session_media_by_key<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    session_id: Uuid,
    key: &str,
) -> Result<Option<SessionMedia>> {
    let row = sqlx::query(
        r#"
        SELECT sm.id, sm.session_id, sm.media_id, sm.stage, sm.created_at
        FROM session_media sm
        JOIN media m ON m.id = sm.media_id
        JOIN garage_sessions s ON s.id = sm.session_id
        WHERE sm.session_id = ? AND m.key = ? AND s.organization_id = ?
        ORDER BY sm.rowid
        LIMIT 1
        "#,
    )
    .bind(session_id.to_string())
    .bind(key)
    .bind(org_text(org))
    .fetch_optional(ex)
    .await
    .map_err(db_err)?;
    row.as_ref().map(session_media_from_row).transpose()
}

fn session_media_not_found() -> Error {
    Error::NotFound("Session media not found or access denied".to_string())
}

#[async_trait]
impl MediaStore for SqliteGarageStore {
    async fn create_media(&self, org: Option<OrganizationId>, media: NewMedia) -> Result<Media> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let created = insert_media(&mut tx, org, &media).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(created)
    }

    async fn get_media(&self, id: Uuid) -> Result<Option<Media>> {
        fetch_media(&self.pool, id).await
    }

    async fn attach_session_media(
        &self,
        org: OrganizationId,
        session_id: Uuid,
        media: NewMedia,
        stage: SessionStage,
    ) -> Result<SessionMedia> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if fetch_session(&mut *tx, org, session_id).await?.is_none() {
            return Err(Error::not_found("Session", session_id));
        }
        if let Some(existing) =
            fetch_session_media_by_key(&mut *tx, org, session_id, &media.key).await?
        {
            debug!("{} is already attached to session {}", media.key, session_id);
            return Ok(existing);
        }
        let stored = insert_media(&mut tx, Some(org), &media).await?;

        let link = SessionMedia {
            id: Uuid::new_v4(),
            session_id,
            media_id: stored.id,
            stage,
            created_at: stored.created_at,
        };
        sqlx::query(
            "INSERT INTO session_media (id, session_id, media_id, stage, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(link.id.to_string())
        .bind(session_id.to_string())
        .bind(stored.id.to_string())
        .bind(stage.as_str())
        .bind(link.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        info!("Attached media {} to session {} ({})", stored.id, session_id, stage);
        Ok(link)
    }

    async fn session_media(
        &self,
        org: OrganizationId,
        session_id: Uuid,
    ) -> Result<Vec<SessionMedia>> {
        let rows = sqlx::query(
            r#"
            SELECT sm.id, sm.session_id, sm.media_id, sm.stage, sm.created_at
            FROM session_media sm
            JOIN garage_sessions s ON s.id = sm.session_id
            WHERE sm.session_id = ? AND s.organization_id = ?
            ORDER BY sm.created_at, sm.rowid
            "#,
        )
        .bind(session_id.to_string())
        .bind(org_text(org))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(session_media_from_row).collect()
    }

    async fn session_media_by_key(
        &self,
        org: OrganizationId,
        session_id: Uuid,
        key: &str,
    ) -> Result<Option<SessionMedia>> {
        fetch_session_media_by_key(&self.pool, org, session_id, key).await
    }

    async fn delete_session_media(
        &self,
        org: OrganizationId,
        media_id: Uuid,
    ) -> Result<Option<Media>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let linked: Option<String> = sqlx::query_scalar(
            r#"
            SELECT sm.id FROM session_media sm
            JOIN garage_sessions s ON s.id = sm.session_id
            WHERE sm.media_id = ? AND s.organization_id = ?
            "#,
        )
        .bind(media_id.to_string())
        .bind(org_text(org))
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if linked.is_none() {
            return Ok(None);
        }

        let media = fetch_media(&mut *tx, media_id)
            .await?
            .ok_or_else(session_media_not_found)?;
        sqlx::query("DELETE FROM session_media WHERE media_id = ?")
            .bind(media_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM media WHERE id = ?")
            .bind(media_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        info!("Deleted session media {}", media_id);
        Ok(Some(media))
    }

    async fn attach_job_card_media(
        &self,
        org: OrganizationId,
        job_card_id: Uuid,
        media: NewMedia,
        media_type: JobCardMediaType,
    ) -> Result<JobCardMedia> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if fetch_job_card(&mut *tx, org, job_card_id).await?.is_none() {
            return Err(Error::not_found("Job card", job_card_id));
        }
        let stored = insert_media(&mut tx, Some(org), &media).await?;

        sqlx::query(
            "INSERT INTO job_card_media (job_card_id, media_id, media_type, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(job_card_id.to_string())
        .bind(stored.id.to_string())
        .bind(media_type.as_str())
        .bind(stored.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(JobCardMedia {
            job_card_id,
            media_id: stored.id,
            media_type,
            created_at: stored.created_at,
        })
    }

    async fn job_card_media(
        &self,
        org: OrganizationId,
        job_card_id: Uuid,
    ) -> Result<Vec<JobCardMedia>> {
        let rows = sqlx::query(
            r#"
            SELECT m.job_card_id, m.media_id, m.media_type, m.created_at
            FROM job_card_media m
            JOIN job_cards c ON c.id = m.job_card_id
            WHERE m.job_card_id = ? AND c.organization_id = ?
            ORDER BY m.created_at, m.rowid
            "#,
        )
        .bind(job_card_id.to_string())
        .bind(org_text(org))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(job_card_media_from_row).collect()
    }

    async fn attach_job_item_media(
        &self,
        org: OrganizationId,
        job_item_id: Uuid,
        media: NewMedia,
        media_type: JobCardMediaType,
    ) -> Result<JobItemMedia> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if fetch_job_item(&mut *tx, org, job_item_id).await?.is_none() {
            return Err(Error::not_found("Job item", job_item_id));
        }
        let stored = insert_media(&mut tx, Some(org), &media).await?;

        sqlx::query(
            "INSERT INTO job_item_media (job_item_id, media_id, media_type, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(job_item_id.to_string())
        .bind(stored.id.to_string())
        .bind(media_type.as_str())
        .bind(stored.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(JobItemMedia {
            job_item_id,
            media_id: stored.id,
            media_type,
            created_at: stored.created_at,
        })
    }

    async fn job_item_media(
        &self,
        org: OrganizationId,
        job_item_id: Uuid,
    ) -> Result<Vec<JobItemMedia>> {
        let rows = sqlx::query(
            r#"
            SELECT m.job_item_id, m.media_id, m.media_type, m.created_at
            FROM job_item_media m
            JOIN job_items i ON i.id = m.job_item_id
            JOIN job_cards c ON c.id = i.job_card_id
            WHERE m.job_item_id = ? AND c.organization_id = ?
            ORDER BY m.created_at, m.rowid
            "#,
        )
        .bind(job_item_id.to_string())
        .bind(org_text(org))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(job_item_media_from_row).collect()
    }

    async fn media_owner_organization(&self, owner: MediaOwner) -> Result<Option<Uuid>> {
        let (sql, id) = match owner {
            MediaOwner::Avatar(id) => ("SELECT organization_id FROM users WHERE id = ?", id),
            MediaOwner::OrganizationLogo(id) => ("SELECT id FROM organizations WHERE id = ?", id),
            MediaOwner::Session(id) => {
                ("SELECT organization_id FROM garage_sessions WHERE id = ?", id)
            }
            MediaOwner::JobCard(id) => ("SELECT organization_id FROM job_cards WHERE id = ?", id),
        };
        let owner: Option<Option<String>> = sqlx::query_scalar(sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(owner.flatten().and_then(|v| Uuid::parse_str(&v).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer_with_car, member, store, tenant};
    use gixat_core::models::MediaType;
    use gixat_core::store::GarageSessionStore;

    fn photo(key: &str) -> NewMedia {
        NewMedia {
            key: key.to_string(),
            alt: Some("Front bumper".into()),
            media_type: MediaType::Image,
        }
    }

    #[tokio::test]
    async fn test_session_media_is_tenant_scoped() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let (other_org, _) = tenant(&store, "b").await;
        let (customer, car) = customer_with_car(&store, org, "40-4").await;
        let session = store.create_session(org, car.id, customer.id).await.unwrap();

        let link = store
            .attach_session_media(org, session.id, photo("organizations/x/a.jpg"), SessionStage::Intake)
            .await
            .unwrap();
        assert_eq!(store.session_media(org, session.id).await.unwrap().len(), 1);
        assert!(store.session_media(other_org, session.id).await.unwrap().is_empty());

        let err = store
            .attach_session_media(other_org, session.id, photo("b.jpg"), SessionStage::General)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        assert!(store.delete_session_media(other_org, link.media_id).await.unwrap().is_none());
        let deleted = store
            .delete_session_media(org, link.media_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deleted.key, "organizations/x/a.jpg");
        assert!(store.get_media(link.media_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attaching_same_key_twice_keeps_one_row() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let (customer, car) = customer_with_car(&store, org, "40-4").await;
        let session = store.create_session(org, car.id, customer.id).await.unwrap();
        let key = "organizations/x/sessions/y/intake.jpg";

        let first = store
            .attach_session_media(org, session.id, photo(key), SessionStage::Intake)
            .await
            .unwrap();
        let again = store
            .attach_session_media(org, session.id, photo(key), SessionStage::General)
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.media_id, first.media_id);
        assert_eq!(again.stage, SessionStage::Intake);
        assert_eq!(store.session_media(org, session.id).await.unwrap().len(), 1);

        let media_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media WHERE key = ?")
            .bind(key)
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(media_rows, 1);
        assert_eq!(
            store
                .session_media_by_key(org, session.id, key)
                .await
                .unwrap()
                .map(|link| link.id),
            Some(first.id)
        );
    }

    #[tokio::test]
    async fn test_media_owner_organization() {
        let store = store().await;
        let (org, admin) = tenant(&store, "a").await;
        let tech = member(&store, org, "tech@a.test").await;
        let (customer, car) = customer_with_car(&store, org, "40-4").await;
        let session = store.create_session(org, car.id, customer.id).await.unwrap();

        let org_id = *org.as_uuid();
        assert_eq!(
            store
                .media_owner_organization(MediaOwner::Session(session.id))
                .await
                .unwrap(),
            Some(org_id)
        );
        assert_eq!(
            store
                .media_owner_organization(MediaOwner::Avatar(tech.id))
                .await
                .unwrap(),
            Some(org_id)
        );
        assert_eq!(
            store
                .media_owner_organization(MediaOwner::OrganizationLogo(org_id))
                .await
                .unwrap(),
            Some(org_id)
        );
        assert_eq!(
            store
                .media_owner_organization(MediaOwner::JobCard(admin.id))
                .await
                .unwrap(),
            None
        );
    }
}
