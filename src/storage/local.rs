use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::BlobStore;

/// Local file system blob store
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn get_full_path(&self, location: &str) -> Result<PathBuf> {
        let relative = Path::new(location);
        let clean = !location.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(AppError::Storage(format!(
                "Refusing blob location {:?}",
                location
            )));
        }
        Ok(self.base_path.join(relative))
    }
}

/// Removes a half-written file unless the write was committed
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to discard partial blob {:?}: {}", self.path, e);
                }
            } else {
                tracing::debug!("Discarded partial blob {:?}", self.path);
            }
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, location: &str, data: Bytes) -> Result<()> {
        let full_path = self.get_full_path(location)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut partial_name = full_path.clone().into_os_string();
        partial_name.push(".partial");
        let mut partial = PartialFile {
            path: PathBuf::from(partial_name),
            committed: false,
        };

        // A dropped future (aborted upload) leaves only the guarded partial file behind
        let mut file = fs::File::create(&partial.path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&partial.path, &full_path).await?;
        partial.committed = true;

        tracing::debug!("Saved {} bytes to {:?}", data.len(), full_path);
        Ok(())
    }

    async fn get(&self, location: &str) -> Result<Bytes> {
        let full_path = self.get_full_path(location)?;

        let data = fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound("File not found".to_string())
            } else {
                AppError::Storage(format!("Failed to read {:?}: {}", full_path, e))
            }
        })?;

        Ok(Bytes::from(data))
    }

    async fn delete(&self, location: &str) -> Result<()> {
        let full_path = self.get_full_path(location)?;

        match fs::remove_file(&full_path).await {
            Ok(()) => tracing::debug!("Deleted blob {:?}", full_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Blob {:?} already gone", full_path);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        // Try to remove empty parent directories
        let mut current_dir = full_path.parent().map(|p| p.to_path_buf());
        while let Some(dir) = current_dir {
            if dir == self.base_path {
                break;
            }
            match fs::read_dir(&dir).await {
                Ok(mut entries) => {
                    if entries.next_entry().await?.is_some() {
                        break; // Not empty
                    }
                    let _ = fs::remove_dir(&dir).await;
                }
                Err(_) => break,
            }
            current_dir = dir.parent().map(|p| p.to_path_buf());
        }

        Ok(())
    }

    async fn exists(&self, location: &str) -> Result<bool> {
        let full_path = self.get_full_path(location)?;
        Ok(fs::try_exists(&full_path).await?)
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}
