use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Opaque ciphertext store addressed by location only
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write bytes under `location`. Either the whole payload becomes
    /// visible or nothing does.
    async fn put(&self, location: &str, data: Bytes) -> Result<()>;

    /// Read bytes; `AppError::NotFound` when nothing is stored there
    async fn get(&self, location: &str) -> Result<Bytes>;

    /// Remove bytes. Deleting a missing location succeeds.
    async fn delete(&self, location: &str) -> Result<()>;

    /// Check if bytes exist
    async fn exists(&self, location: &str) -> Result<bool>;

    /// Get the storage type name
    fn storage_type(&self) -> &'static str;
}
