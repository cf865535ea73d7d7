//! HTTP object storage for Plotbook property images.
//!
//! [`HttpObjectStorage`] implements [`ObjectStorage`] against a
//! storage service that exposes buckets under `/storage/v1/object`:
//!
//! - upload: `POST {base}/storage/v1/object/{bucket}/{path}`
//! - remove: `DELETE {base}/storage/v1/object/{bucket}/{path}`
//! - public URL: `{base}/storage/v1/object/public/{bucket}/{path}`
//!
//! # Example
//!
//! ```ignore
//! use plotbook_storage::HttpObjectStorage;
//!
//! let storage = HttpObjectStorage::new("https://storage.example.com", Some(api_key));
//! let url = storage.upload("property-images", "owner/PROP-TN-1/photo.jpg", bytes, "image/jpeg").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use plotbook_core::config::StorageConfig;
use plotbook_core::storage::{ObjectStorage, StorageError, StorageFuture, validate_object_path};
use reqwest::{Client, RequestBuilder, Response};

const OBJECT_PREFIX: &str = "storage/v1/object";

/// Object storage client over HTTP.
#[derive(Clone)]
pub struct HttpObjectStorage {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpObjectStorage {
    /// Create a client for the service at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client: Client::new(), base_url, api_key }
    }

    /// Create a client from configuration, or `None` if no URL is configured.
    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Option<Self> {
        config.url.as_ref().map(|url| Self::new(url.clone(), config.api_key.clone()))
    }

    /// Public URL of an object.
    #[must_use]
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{OBJECT_PREFIX}/public/{bucket}/{path}", self.base_url)
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{OBJECT_PREFIX}/{bucket}/{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

async fn check(response: Response) -> Result<(), StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let message = response.text().await.unwrap_or_default();
    Err(StorageError::Rejected { status: status.as_u16(), message })
}

impl ObjectStorage for HttpObjectStorage {
    fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> StorageFuture<'_, String> {
        let bucket = bucket.to_string();
        let path = path.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            validate_object_path(&path)?;
            let size = bytes.len();
            let response = self
                .authorized(self.client.post(self.object_url(&bucket, &path)))
                .header("content-type", content_type)
                .header("x-upsert", "false")
                .body(bytes)
                .send()
                .await
                .map_err(|e| StorageError::Transport(e.to_string()))?;
            check(response).await?;
            tracing::debug!(bucket = %bucket, path = %path, size, "Object uploaded");
            Ok(self.public_url(&bucket, &path))
        })
    }

    fn remove(&self, bucket: &str, path: &str) -> StorageFuture<'_, ()> {
        let bucket = bucket.to_string();
        let path = path.to_string();
        Box::pin(async move {
            validate_object_path(&path)?;
            let response = self
                .authorized(self.client.delete(self.object_url(&bucket, &path)))
                .send()
                .await
                .map_err(|e| StorageError::Transport(e.to_string()))?;
            check(response).await?;
            tracing::debug!(bucket = %bucket, path = %path, "Object removed");
            Ok(())
        })
    }

    fn object_path(&self, bucket: &str, public_url: &str) -> Option<String> {
        let prefix = format!("{}/{OBJECT_PREFIX}/public/{bucket}/", self.base_url);
        public_url
            .strip_prefix(&prefix)
            .filter(|path| validate_object_path(path).is_ok())
            .map(ToString::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_from_the_base() {
        let storage = HttpObjectStorage::new("https://storage.example.com/", None);
        assert_eq!(
            storage.public_url("property-images", "u/PROP-TN-1/1-a.jpg"),
            "https://storage.example.com/storage/v1/object/public/property-images/u/PROP-TN-1/1-a.jpg"
        );
        assert_eq!(
            storage.object_url("property-images", "u/a.jpg"),
            "https://storage.example.com/storage/v1/object/property-images/u/a.jpg"
        );
    }

    #[test]
    fn public_urls_map_back_to_paths() {
        let storage = HttpObjectStorage::new("https://storage.example.com", None);
        let url = storage.public_url("property-images", "u/PROP-TN-1/1-a.jpg");
        assert_eq!(storage.object_path("property-images", &url).as_deref(), Some("u/PROP-TN-1/1-a.jpg"));
        assert_eq!(storage.object_path("avatars", &url), None);
        assert_eq!(storage.object_path("property-images", "https://elsewhere.example.com/x.jpg"), None);
        assert_eq!(
            storage.object_path(
                "property-images",
                "https://storage.example.com/storage/v1/object/public/property-images/../secret"
            ),
            None
        );
    }

    #[test]
    fn from_config_requires_a_url() {
        assert!(HttpObjectStorage::from_config(&StorageConfig { url: None, api_key: None }).is_none());
        let storage = HttpObjectStorage::from_config(&StorageConfig {
            url: Some("http://localhost:54321".to_string()),
            api_key: Some("key".to_string()),
        });
        assert!(storage.is_some());
    }
}
