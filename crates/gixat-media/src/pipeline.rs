//! Upload pipeline
//!
//! Direct uploads: validate, scan, compress, store.
//! Presigned uploads: the browser PUTs to a presigned URL, then
//! [`UploadPipeline::process_existing`] downloads the object, scans and
//! compresses it and overwrites the same key.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use gixat_core::models::MediaType;
use gixat_core::object_store::{ObjectStore, UPLOAD_URL_EXPIRY};
use gixat_observability::Metrics;
use std::sync::Arc;
use tracing::{info, warn};

use crate::compression::{Compressed, compress_image};
use crate::error::MediaError;
use crate::keys::file_name_of;
use crate::scanner::{ScanResult, VirusScanner};
use crate::validation::{content_type_for, detect_media_type, validate_metadata, validate_size};

/// Largest number of files accepted by one batch operation
pub const MAX_BATCH_FILES: usize = 50;

/// A file received in a request body
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// An object that passed the pipeline and is now in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub key: String,
    pub media_type: MediaType,
    pub content_type: String,
    pub size: u64,
    pub bytes_saved: u64,
}

#[derive(Debug, Clone)]
pub struct PresignedUpload {
    pub upload_url: String,
    pub file_key: String,
    pub expires_at: DateTime<Utc>,
}

/// Reject empty batches and batches over [`MAX_BATCH_FILES`]
pub fn check_batch_size(count: usize, verb: &str) -> gixat_core::Result<()> {
    if count == 0 {
        return Err(gixat_core::Error::InvalidRequest(
            "At least one file must be provided.".to_string(),
        ));
    }
    if count > MAX_BATCH_FILES {
        return Err(gixat_core::Error::InvalidRequest(format!(
            "Cannot {} more than {} files at once.",
            verb, MAX_BATCH_FILES
        )));
    }
    Ok(())
}

fn threat_suffix(scan: &ScanResult) -> String {
    scan.threat_name
        .as_ref()
        .map(|name| format!(" (Threat: {})", name))
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct UploadPipeline {
    store: Arc<dyn ObjectStore>,
    scanner: Arc<dyn VirusScanner>,
    metrics: Option<Arc<Metrics>>,
}

impl UploadPipeline {
    pub fn new(store: Arc<dyn ObjectStore>, scanner: Arc<dyn VirusScanner>) -> Self {
        Self {
            store,
            scanner,
            metrics: None,
        }
    }

    /// Record scan results and compression savings
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn scan(&self, bytes: &[u8], file_name: &str) -> ScanResult {
        let scan = self.scanner.scan(bytes, file_name).await;
        if let Some(metrics) = &self.metrics {
            let result = if !self.scanner.is_enabled() {
                "disabled"
            } else if scan.is_clean {
                "clean"
            } else {
                "infected"
            };
            metrics.record_virus_scan(result);
        }
        scan
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn scanner(&self) -> &Arc<dyn VirusScanner> {
        &self.scanner
    }

    async fn compress(
        &self,
        media_type: MediaType,
        bytes: Bytes,
        file_name: &str,
        content_type: &str,
    ) -> gixat_core::Result<Compressed> {
        if media_type != MediaType::Image {
            return Ok(Compressed {
                bytes,
                content_type: content_type.to_string(),
                bytes_saved: 0,
            });
        }
        let name = file_name.to_string();
        let content_type = content_type.to_string();
        let compressed =
            tokio::task::spawn_blocking(move || compress_image(bytes, &name, &content_type))
                .await
                .map_err(|e| MediaError::Image(format!("Compression task failed: {}", e)))?;
        if compressed.bytes_saved > 0 {
            if let Some(metrics) = &self.metrics {
                metrics.record_bytes_saved(compressed.bytes_saved);
            }
            info!(
                "Compressed {}: saved {} bytes ({} bytes stored)",
                file_name,
                compressed.bytes_saved,
                compressed.bytes.len()
            );
        }
        Ok(compressed)
    }

    /// Validate, scan, compress and store a file received in the request
    ///
    /// # Errors
    /// - `VALIDATION_ERROR` for rejected names, types, sizes and infected
    ///   files
    /// - `EXTERNAL_SERVICE_ERROR` when the object store fails
    pub async fn upload(&self, file: IncomingFile, key: String) -> gixat_core::Result<StoredUpload> {
        let media_type = validate_metadata(&file.file_name, file.content_type.as_deref())?;
        validate_size(media_type, file.bytes.len())?;

        info!(
            "Scanning upload {} ({} bytes)",
            file.file_name,
            file.bytes.len()
        );
        let scan = self.scan(&file.bytes, &file.file_name).await;
        if !scan.is_clean {
            warn!("Upload {} rejected: {}", file.file_name, scan.message);
            return Err(MediaError::Infected(format!(
                "File failed security scan: {}{}",
                scan.message,
                threat_suffix(&scan)
            ))
            .into());
        }

        let content_type = file
            .content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| content_type_for(&file.file_name).to_string());
        let compressed = self
            .compress(media_type, file.bytes, &file.file_name, &content_type)
            .await?;

        let size = compressed.bytes.len() as u64;
        self.store
            .put(&key, compressed.bytes, &compressed.content_type)
            .await?;
        info!("Stored upload {} at {}", file.file_name, key);

        Ok(StoredUpload {
            key,
            media_type,
            content_type: compressed.content_type,
            size,
            bytes_saved: compressed.bytes_saved,
        })
    }

    /// Finish a presigned upload that already sits at `key`
    ///
    /// # Errors
    /// - `FORBIDDEN` when `key` is outside `allowed_prefix`
    /// - `ENTITY_NOT_FOUND` when nothing was uploaded to `key`
    /// - `VALIDATION_ERROR` for oversized or infected files; infected
    ///   objects are deleted first
    pub async fn process_existing(
        &self,
        key: &str,
        allowed_prefix: &str,
    ) -> gixat_core::Result<StoredUpload> {
        if !key.starts_with(allowed_prefix) || key.contains("..") {
            return Err(MediaError::Forbidden(
                "File key does not belong to this session".to_string(),
            )
            .into());
        }

        info!("Processing uploaded object {}", key);
        let object = self.store.get(key).await?;
        let file_name = file_name_of(key).to_string();
        let media_type = detect_media_type(None, &file_name);
        validate_size(media_type, object.bytes.len())?;

        let scan = self.scan(&object.bytes, &file_name).await;
        if !scan.is_clean {
            warn!("Uploaded object {} rejected, deleting: {}", key, scan.message);
            self.store.delete(key).await?;
            return Err(MediaError::Infected(format!(
                "File failed security scan and has been deleted: {}{}",
                scan.message,
                threat_suffix(&scan)
            ))
            .into());
        }

        let content_type = object
            .content_type
            .filter(|ct| ct != "application/octet-stream" && !ct.is_empty())
            .unwrap_or_else(|| content_type_for(&file_name).to_string());
        let original_size = object.bytes.len() as u64;
        let compressed = self
            .compress(media_type, object.bytes, &file_name, &content_type)
            .await?;

        if compressed.bytes_saved > 0 {
            self.store
                .put(key, compressed.bytes.clone(), &compressed.content_type)
                .await?;
            info!("Replaced {} with compressed version", key);
        }

        Ok(StoredUpload {
            key: key.to_string(),
            media_type,
            content_type: compressed.content_type,
            size: original_size - compressed.bytes_saved,
            bytes_saved: compressed.bytes_saved,
        })
    }

    /// Presigned PUT URL for a file the client will upload itself
    pub async fn presign_upload(
        &self,
        file_name: &str,
        content_type: &str,
        key: String,
    ) -> gixat_core::Result<PresignedUpload> {
        validate_metadata(file_name, Some(content_type))?;
        let upload_url = self
            .store
            .presign_put(&key, content_type, UPLOAD_URL_EXPIRY)
            .await?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(UPLOAD_URL_EXPIRY)
                .unwrap_or_else(|_| chrono::Duration::minutes(15));
        Ok(PresignedUpload {
            upload_url,
            file_key: key,
            expires_at,
        })
    }
}
