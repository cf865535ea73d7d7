//! Object storage for property images.
//!
//! Uploaded objects are addressed by `(bucket, path)` and exposed through a
//! public URL that is stored on the property.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`ObjectStorage`] methods.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Errors that can occur during object storage operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The object path is empty or escapes its bucket.
    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    /// The backend rejected the request.
    #[error("Storage request rejected with status {status}: {message}")]
    Rejected {
        /// HTTP-like status code reported by the backend
        status: u16,
        /// Backend message
        message: String,
    },

    /// The backend could not be reached.
    #[error("Storage transport error: {0}")]
    Transport(String),
}

/// Object storage abstraction.
pub trait ObjectStorage: Send + Sync {
    /// Upload `bytes` to `bucket/path` and return the object's public URL.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the path is invalid or the upload fails.
    fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StorageFuture<'_, String>;

    /// Remove the object at `bucket/path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the removal fails.
    fn remove(&self, bucket: &str, path: &str) -> StorageFuture<'_, ()>;

    /// Map a public URL produced by [`ObjectStorage::upload`] back onto its
    /// object path within `bucket`, if it belongs to this storage.
    fn object_path(&self, bucket: &str, public_url: &str) -> Option<String>;
}

/// Check that an object path is relative, non-empty and free of `..` segments.
///
/// # Errors
///
/// Returns [`StorageError::InvalidPath`] otherwise.
pub fn validate_object_path(path: &str) -> Result<(), StorageError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|segment| segment.is_empty() || segment == "..");
    if invalid {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_paths() {
        assert!(validate_object_path("owner/PROP-TN-1/photo.jpg").is_ok());
        assert!(validate_object_path("").is_err());
        assert!(validate_object_path("/abs/path.jpg").is_err());
        assert!(validate_object_path("owner//photo.jpg").is_err());
        assert!(validate_object_path("owner/../secret").is_err());
    }
}
