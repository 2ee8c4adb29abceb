//! File uploads attached to sessions, job cards and job items
//!
//! Direct uploads arrive as multipart `Upload` values and go through the
//! whole pipeline before anything is written. Presigned uploads are PUT by
//! the client and finished by `processSessionUpload`.

use async_graphql::{
    Context, InputObject, Object, Result, ResultExt, SimpleObject, Upload,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use gixat_core::graphql::{objects, store, tenant};
use gixat_core::models::{
    JobCardMedia, JobCardMediaType, JobItemMedia, NewMedia, SessionMedia, SessionStage,
};
use gixat_core::{Error, OrganizationId};
use gixat_media::keys::{job_card_key, job_item_key, session_key, session_prefix};
use gixat_media::pipeline::check_batch_size;
use gixat_media::{IncomingFile, PresignedUpload, StoredUpload};
use std::io::Read;
use tracing::{info, warn};
use uuid::Uuid;

use super::{found, metrics, pipeline};

/// Read a multipart upload into memory
pub(crate) async fn read_upload(ctx: &Context<'_>, upload: &Upload) -> Result<IncomingFile> {
    let value = upload.value(ctx).map_err(Error::Io).extend()?;
    let file_name = value.filename.clone();
    let content_type = value.content_type.clone();
    let bytes = tokio::task::spawn_blocking(move || {
        let mut buf = Vec::new();
        value.into_read().read_to_end(&mut buf).map(|_| buf)
    })
    .await
    .map_err(|e| Error::Internal(format!("Upload reader failed: {}", e)))
    .extend()?
    .map_err(Error::Io)
    .extend()?;

    Ok(IncomingFile {
        file_name,
        content_type,
        bytes: Bytes::from(bytes),
    })
}

/// Count an upload attempt by stage and outcome
pub(crate) fn record_upload(
    ctx: &Context<'_>,
    stage: &str,
    result: &gixat_core::Result<StoredUpload>,
) {
    if let Ok(metrics) = metrics(ctx) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        metrics.record_upload(stage, outcome);
    }
}

fn new_media(stored: &StoredUpload, alt: Option<String>) -> NewMedia {
    NewMedia {
        key: stored.key.clone(),
        alt,
        media_type: stored.media_type,
    }
}

/// Remove an object whose row could not be written
async fn discard_object(ctx: &Context<'_>, key: &str) {
    if let Ok(objects) = objects(ctx)
        && let Err(e) = objects.delete(key).await
    {
        warn!("Failed to remove orphaned object {}: {}", key, e);
    }
}

async fn require_session(ctx: &Context<'_>, org: OrganizationId, session_id: Uuid) -> Result<()> {
    let session = store(ctx)?.get_session(org, session_id).await.extend()?;
    found(session, "Session", session_id).map(|_| ())
}

#[derive(InputObject)]
pub struct PresignFileInput {
    pub file_name: String,
    pub content_type: String,
}

#[derive(InputObject)]
pub struct ProcessUploadInput {
    pub file_key: String,
    pub stage: SessionStage,
    pub alt: Option<String>,
}

#[derive(SimpleObject)]
pub struct PresignedUploadUrl {
    pub upload_url: String,
    pub file_key: String,
    pub expires_at: DateTime<Utc>,
}

impl From<PresignedUpload> for PresignedUploadUrl {
    fn from(p: PresignedUpload) -> Self {
        Self {
            upload_url: p.upload_url,
            file_key: p.file_key,
            expires_at: p.expires_at,
        }
    }
}

/// Outcome of one file in a bulk operation
#[derive(SimpleObject)]
pub struct BulkSessionUploadResult {
    pub file_key: String,
    pub success: bool,
    pub session_media: Option<SessionMedia>,
    pub error_message: Option<String>,
}

#[derive(Default)]
pub struct MediaMutation;

impl MediaMutation {
    async fn process_one(
        ctx: &Context<'_>,
        org: OrganizationId,
        session_id: Uuid,
        input: ProcessUploadInput,
    ) -> Result<SessionMedia> {
        let store = store(ctx)?;
        if let Some(existing) = store
            .session_media_by_key(org, session_id, &input.file_key)
            .await
            .extend()?
        {
            info!("{} was already processed for session {}", input.file_key, session_id);
            return Ok(existing);
        }

        let prefix = session_prefix(org, session_id);
        let stored = pipeline(ctx)?
            .process_existing(&input.file_key, &prefix)
            .await;
        record_upload(ctx, "session_presigned", &stored);
        let stored = stored.extend()?;

        let attached = store
            .attach_session_media(org, session_id, new_media(&stored, input.alt), input.stage)
            .await;
        // Keep the object if a concurrent call attached it meanwhile
        if attached.is_err()
            && matches!(
                store.session_media_by_key(org, session_id, &stored.key).await,
                Ok(None)
            )
        {
            discard_object(ctx, &stored.key).await;
        }
        attached.extend()
    }
}

#[Object]
impl MediaMutation {
    async fn upload_media_to_session(
        &self,
        ctx: &Context<'_>,
        session_id: Uuid,
        file: Upload,
        stage: SessionStage,
        alt: Option<String>,
    ) -> Result<SessionMedia> {
        let org = tenant(ctx)?;
        require_session(ctx, org, session_id).await?;

        let file = read_upload(ctx, &file).await?;
        let key = session_key(org, session_id, stage, &file.file_name, Utc::now());
        let stored = pipeline(ctx)?.upload(file, key).await;
        record_upload(ctx, "session", &stored);
        let stored = stored.extend()?;

        let attached = store(ctx)?
            .attach_session_media(org, session_id, new_media(&stored, alt), stage)
            .await;
        match attached {
            Ok(media) => {
                info!("📎 Attached {} to session {}", stored.key, session_id);
                Ok(media)
            }
            Err(e) => {
                discard_object(ctx, &stored.key).await;
                Err(e).extend()
            }
        }
    }

    async fn upload_media_to_job_card(
        &self,
        ctx: &Context<'_>,
        job_card_id: Uuid,
        file: Upload,
        #[graphql(name = "type")] media_type: JobCardMediaType,
        alt: Option<String>,
    ) -> Result<JobCardMedia> {
        let org = tenant(ctx)?;
        let card = store(ctx)?.get_job_card(org, job_card_id).await.extend()?;
        found(card, "Job card", job_card_id)?;

        let file = read_upload(ctx, &file).await?;
        let key = job_card_key(org, job_card_id, media_type, &file.file_name, Utc::now());
        let stored = pipeline(ctx)?.upload(file, key).await;
        record_upload(ctx, "job_card", &stored);
        let stored = stored.extend()?;

        let attached = store(ctx)?
            .attach_job_card_media(org, job_card_id, new_media(&stored, alt), media_type)
            .await;
        if attached.is_err() {
            discard_object(ctx, &stored.key).await;
        }
        attached.extend()
    }

    async fn upload_media_to_job_item(
        &self,
        ctx: &Context<'_>,
        job_item_id: Uuid,
        file: Upload,
        #[graphql(name = "type")] media_type: JobCardMediaType,
        alt: Option<String>,
    ) -> Result<JobItemMedia> {
        let org = tenant(ctx)?;
        let item = store(ctx)?.get_job_item(org, job_item_id).await.extend()?;
        let item = found(item, "Job item", job_item_id)?;

        let file = read_upload(ctx, &file).await?;
        let key = job_item_key(
            org,
            item.job_card_id,
            item.id,
            media_type,
            &file.file_name,
            Utc::now(),
        );
        let stored = pipeline(ctx)?.upload(file, key).await;
        record_upload(ctx, "job_item", &stored);
        let stored = stored.extend()?;

        let attached = store(ctx)?
            .attach_job_item_media(org, job_item_id, new_media(&stored, alt), media_type)
            .await;
        if attached.is_err() {
            discard_object(ctx, &stored.key).await;
        }
        attached.extend()
    }

    /// Removes the attachment, the media row and the stored object
    async fn delete_session_media(&self, ctx: &Context<'_>, media_id: Uuid) -> Result<bool> {
        let deleted = store(ctx)?
            .delete_session_media(tenant(ctx)?, media_id)
            .await
            .extend()?;
        let media = deleted
            .ok_or_else(|| {
                Error::NotFound("Session media not found or access denied".to_string())
            })
            .extend()?;
        if let Err(e) = objects(ctx)?.delete(&media.key).await {
            warn!("Failed to delete object {}: {}", media.key, e);
        }
        Ok(true)
    }

    /// Presigned PUT URLs the client uploads to directly
    async fn get_presigned_upload_url(
        &self,
        ctx: &Context<'_>,
        session_id: Uuid,
        stage: SessionStage,
        files: Vec<PresignFileInput>,
    ) -> Result<Vec<PresignedUploadUrl>> {
        check_batch_size(files.len(), "upload").extend()?;
        let org = tenant(ctx)?;
        require_session(ctx, org, session_id).await?;

        let pipeline = pipeline(ctx)?;
        let now = Utc::now();
        let mut urls = Vec::with_capacity(files.len());
        for file in files {
            let key = session_key(org, session_id, stage, &file.file_name, now);
            let presigned = pipeline
                .presign_upload(&file.file_name, &file.content_type, key)
                .await
                .extend()?;
            urls.push(presigned.into());
        }
        Ok(urls)
    }

    /// Scan, compress and attach a file uploaded through a presigned URL
    async fn process_session_upload(
        &self,
        ctx: &Context<'_>,
        session_id: Uuid,
        file_key: String,
        stage: SessionStage,
        alt: Option<String>,
    ) -> Result<SessionMedia> {
        let org = tenant(ctx)?;
        require_session(ctx, org, session_id).await?;
        let input = ProcessUploadInput {
            file_key,
            stage,
            alt,
        };
        Self::process_one(ctx, org, session_id, input).await
    }

    /// Each file is processed independently
    async fn process_bulk_session_uploads(
        &self,
        ctx: &Context<'_>,
        session_id: Uuid,
        files: Vec<ProcessUploadInput>,
    ) -> Result<Vec<BulkSessionUploadResult>> {
        check_batch_size(files.len(), "process").extend()?;
        let org = tenant(ctx)?;
        require_session(ctx, org, session_id).await?;

        let mut results = Vec::with_capacity(files.len());
        for input in files {
            let file_key = input.file_key.clone();
            let result = match Self::process_one(ctx, org, session_id, input).await {
                Ok(media) => BulkSessionUploadResult {
                    file_key,
                    success: true,
                    session_media: Some(media),
                    error_message: None,
                },
                Err(e) => {
                    warn!("Bulk upload of {} failed: {}", file_key, e.message);
                    BulkSessionUploadResult {
                        file_key,
                        success: false,
                        session_media: None,
                        error_message: Some(e.message),
                    }
                }
            };
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            "Processed {}/{} uploads for session {}",
            succeeded,
            results.len(),
            session_id
        );
        Ok(results)
    }
}
