//! In-process object store for tests and local development

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use gixat_core::object_store::{ObjectStore, StoredObject};
use std::time::Duration;

use crate::error::MediaError;

pub struct MemoryObjectStore {
    objects: DashMap<String, StoredObject>,
    base_url: String,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_base_url("memory://gixat")
    }

    /// URLs are `{base_url}/{key}?...`; useful when a local file server
    /// fronts the store
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            objects: DashMap::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn url(&self, method: &str, key: &str, expires: Duration) -> String {
        format!(
            "{}/{}?method={}&expires={}",
            self.base_url,
            key.trim_start_matches('/'),
            method,
            expires.as_secs()
        )
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn presign_put(
        &self,
        key: &str,
        _content_type: &str,
        expires: Duration,
    ) -> gixat_core::Result<String> {
        Ok(self.url("PUT", key, expires))
    }

    async fn presign_get(&self, key: &str, expires: Duration) -> gixat_core::Result<String> {
        Ok(self.url("GET", key, expires))
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> gixat_core::Result<()> {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: Some(content_type.to_string()),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> gixat_core::Result<StoredObject> {
        self.objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| MediaError::NotFound(key.to_string()).into())
    }

    async fn delete(&self, key: &str) -> gixat_core::Result<()> {
        self.objects.remove(key);
        Ok(())
    }

    async fn health_check(&self) -> gixat_core::Result<()> {
        Ok(())
    }
}
