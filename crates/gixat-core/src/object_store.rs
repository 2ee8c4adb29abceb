//! Object storage abstraction
//!
//! Files never pass through the database. Media rows keep an object key and
//! callers ask the object store for a time-limited URL when they need one.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::Result;

/// Presigned upload URLs handed to the browser
pub const UPLOAD_URL_EXPIRY: Duration = Duration::from_secs(15 * 60);

/// Presigned download URLs embedded in GraphQL responses
pub const DOWNLOAD_URL_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

/// Presigned URLs issued by the media redirect routes
pub const REDIRECT_URL_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// A downloaded object
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Object store trait
///
/// Implementations:
/// - `S3ObjectStore`: any S3-compatible service, SigV4 presigned requests
/// - `MemoryObjectStore`: in-process map for tests and local development
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// URL the client can `PUT` the object body to
    ///
    /// # Errors
    /// - `Error::Storage` when the URL cannot be signed
    async fn presign_put(&self, key: &str, content_type: &str, expires: Duration)
        -> Result<String>;

    /// URL the client can `GET` the object from
    async fn presign_get(&self, key: &str, expires: Duration) -> Result<String>;

    /// Upload (or overwrite) an object
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()>;

    /// Download an object
    ///
    /// # Errors
    /// - `Error::NotFound` when no object has this key
    /// - `Error::Storage` for transport failures
    async fn get(&self, key: &str) -> Result<StoredObject>;

    /// Delete an object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Verify the backend is reachable
    async fn health_check(&self) -> Result<()>;
}
