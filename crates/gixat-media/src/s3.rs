//! S3-compatible object store
//!
//! Every request, browser-facing or server-side, goes through a SigV4
//! presigned URL. Works against AWS S3 as well as MinIO and other
//! S3-compatible services through a custom endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use gixat_core::object_store::{ObjectStore, StoredObject};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::sigv4::{self, Credentials, PresignRequest};

/// Validity of URLs the server signs for its own requests
const INTERNAL_URL_EXPIRY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint such as `http://localhost:9000`; AWS when unset
    pub endpoint: Option<String>,
    pub credentials: Credentials,
    /// Address objects as `/{bucket}/{key}` instead of `{bucket}.{host}`
    pub path_style: bool,
    pub timeout_secs: u64,
}

/// Scheme, host and unencoded path of one object
#[derive(Debug, Clone, PartialEq, Eq)]
struct Location {
    scheme: String,
    host: String,
    path: String,
}

pub struct S3ObjectStore {
    config: S3Config,
    client: Client,
}

impl S3ObjectStore {
    pub fn new(config: S3Config) -> MediaResult<Self> {
        if config.bucket.trim().is_empty() {
            return Err(MediaError::Storage("S3 bucket name is required".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(format!("Gixat/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MediaError::Storage(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn endpoint(&self) -> (String, String) {
        match &self.config.endpoint {
            Some(endpoint) => {
                let (scheme, rest) = endpoint
                    .split_once("://")
                    .unwrap_or(("https", endpoint.as_str()));
                (scheme.to_string(), rest.trim_end_matches('/').to_string())
            }
            None if self.config.region == "us-east-1" => {
                ("https".to_string(), "s3.amazonaws.com".to_string())
            }
            None => (
                "https".to_string(),
                format!("s3.{}.amazonaws.com", self.config.region),
            ),
        }
    }

    fn location(&self, key: &str) -> Location {
        let (scheme, host) = self.endpoint();
        let key = key.trim_start_matches('/');
        if self.config.path_style {
            Location {
                scheme,
                host,
                path: format!("/{}/{}", self.config.bucket, key),
            }
        } else {
            Location {
                scheme,
                host: format!("{}.{}", self.config.bucket, host),
                path: format!("/{}", key),
            }
        }
    }

    fn presign(&self, method: &str, key: &str, expires: Duration) -> String {
        let location = self.location(key);
        sigv4::presign_url(
            &self.config.credentials,
            &PresignRequest {
                method,
                scheme: &location.scheme,
                host: &location.host,
                path: &location.path,
                region: &self.config.region,
                expires,
                timestamp: Utc::now(),
            },
        )
    }

    fn unexpected(action: &str, key: &str, status: StatusCode) -> MediaError {
        MediaError::Storage(format!(
            "S3 {} of '{}' failed with status {}",
            action, key, status
        ))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn presign_put(
        &self,
        key: &str,
        _content_type: &str,
        expires: Duration,
    ) -> gixat_core::Result<String> {
        Ok(self.presign("PUT", key, expires))
    }

    async fn presign_get(&self, key: &str, expires: Duration) -> gixat_core::Result<String> {
        Ok(self.presign("GET", key, expires))
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> gixat_core::Result<()> {
        let size = bytes.len();
        let url = self.presign("PUT", key, INTERNAL_URL_EXPIRY);
        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(MediaError::from)?;

        if !response.status().is_success() {
            return Err(Self::unexpected("upload", key, response.status()).into());
        }
        debug!("Uploaded {} bytes to s3://{}/{}", size, self.config.bucket, key);
        Ok(())
    }

    async fn get(&self, key: &str) -> gixat_core::Result<StoredObject> {
        let url = self.presign("GET", key, INTERNAL_URL_EXPIRY);
        let response = self.client.get(url).send().await.map_err(MediaError::from)?;

        match response.status() {
            status if status.is_success() => {
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let bytes = response.bytes().await.map_err(MediaError::from)?;
                Ok(StoredObject {
                    bytes,
                    content_type,
                })
            }
            StatusCode::NOT_FOUND => Err(MediaError::NotFound(key.to_string()).into()),
            status => Err(Self::unexpected("download", key, status).into()),
        }
    }

    async fn delete(&self, key: &str) -> gixat_core::Result<()> {
        let url = self.presign("DELETE", key, INTERNAL_URL_EXPIRY);
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(MediaError::from)?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!("Deleted s3://{}/{}", self.config.bucket, key);
            Ok(())
        } else {
            Err(Self::unexpected("delete", key, status).into())
        }
    }

    async fn health_check(&self) -> gixat_core::Result<()> {
        // HEAD on the bucket root
        let url = self.presign("HEAD", "", INTERNAL_URL_EXPIRY);
        let response = self.client.head(url).send().await.map_err(MediaError::from)?;
        if response.status().is_success() {
            Ok(())
        } else {
            warn!(
                "S3 bucket {} health check returned {}",
                self.config.bucket,
                response.status()
            );
            Err(Self::unexpected("health check", &self.config.bucket, response.status()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: Option<String>, path_style: bool) -> S3Config {
        S3Config {
            bucket: "gixat-media".to_string(),
            region: "eu-west-1".to_string(),
            endpoint,
            credentials: Credentials {
                access_key_id: "test-key".to_string(),
                secret_access_key: "test-secret".to_string(),
            },
            path_style,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_addressing_styles() {
        let store = S3ObjectStore::new(config(None, false)).unwrap();
        let location = store.location("organizations/a/b.jpg");
        assert_eq!(location.host, "gixat-media.s3.eu-west-1.amazonaws.com");
        assert_eq!(location.path, "/organizations/a/b.jpg");

        let store =
            S3ObjectStore::new(config(Some("http://localhost:9000/".to_string()), true)).unwrap();
        let location = store.location("a/b.jpg");
        assert_eq!(location.scheme, "http");
        assert_eq!(location.host, "localhost:9000");
        assert_eq!(location.path, "/gixat-media/a/b.jpg");
    }

    #[test]
    fn test_requires_bucket() {
        let mut cfg = config(None, false);
        cfg.bucket = " ".to_string();
        assert!(S3ObjectStore::new(cfg).is_err());
    }

    #[tokio::test]
    async fn test_presigned_urls_carry_signature() {
        let store = S3ObjectStore::new(config(None, false)).unwrap();
        let url = store
            .presign_get("avatars/u/photo 1.png", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(url.starts_with("https://gixat-media.s3.eu-west-1.amazonaws.com/avatars/u/photo%201.png?"));
        assert!(url.contains("X-Amz-Expires=3600"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    async fn test_put_get_delete_against_s3_api() {
        let server = MockServer::start().await;
        let store = S3ObjectStore::new(config(Some(server.uri()), true)).unwrap();

        Mock::given(method("PUT"))
            .and(path("/gixat-media/sessions/a.jpg"))
            .and(header("content-type", "image/jpeg"))
            .and(query_param("X-Amz-Algorithm", "AWS4-HMAC-SHA256"))
            .and(body_bytes(b"jpeg-bytes".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gixat-media/sessions/a.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(b"jpeg-bytes".to_vec()),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/gixat-media/sessions/a.jpg"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        store
            .put("sessions/a.jpg", Bytes::from_static(b"jpeg-bytes"), "image/jpeg")
            .await
            .unwrap();
        let object = store.get("sessions/a.jpg").await.unwrap();
        assert_eq!(object.bytes.as_ref(), b"jpeg-bytes");
        assert_eq!(object.content_type.as_deref(), Some("image/jpeg"));
        store.delete("sessions/a.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_object_and_failures() {
        let server = MockServer::start().await;
        let store = S3ObjectStore::new(config(Some(server.uri()), true)).unwrap();

        Mock::given(method("GET"))
            .and(path("/gixat-media/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/gixat-media/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = store.get("missing.png").await.unwrap_err();
        assert!(matches!(err, gixat_core::Error::NotFound(_)));

        let err = store
            .put("x.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EXTERNAL_SERVICE_ERROR");

        store.health_check().await.unwrap();
    }
}
