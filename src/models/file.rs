use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata for one encrypted blob. Only `download_count` ever changes.
#[derive(Debug, Clone, FromRow)]
pub struct FileRecord {
    pub id: String,
    pub owner_id: String,
    pub blob_location: String,
    pub iv: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub created_at: String,
    pub expiry_at: String,
    pub download_count: i64,
}

/// Fields supplied by the uploader
#[derive(Debug, Clone, Default)]
pub struct NewFile {
    pub iv: String,
    pub filename: String,
    pub mime_type: String,
    pub ttl_hours: Option<u32>,
}

/// Result of a successful upload
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: String,
    pub expiry_at: String,
}

/// Public metadata view. `exists = false` and `expired = true` never occur together.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileMetadata {
    pub exists: bool,
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_count: Option<i64>,
}

impl FileMetadata {
    pub fn found(record: FileRecord, expired: bool) -> Self {
        Self {
            exists: true,
            expired,
            filename: Some(record.filename),
            mime_type: Some(record.mime_type),
            size_bytes: Some(record.size_bytes),
            created_at: Some(record.created_at),
            expiry_at: Some(record.expiry_at),
            download_count: Some(record.download_count),
        }
    }

    pub fn missing() -> Self {
        Self {
            exists: false,
            expired: false,
            filename: None,
            mime_type: None,
            size_bytes: None,
            created_at: None,
            expiry_at: None,
            download_count: None,
        }
    }
}

/// Ciphertext plus what the client needs to decrypt it, minus the key
#[derive(Debug, Serialize, Deserialize)]
pub struct BlobResponse {
    /// Standard base64
    pub ciphertext: String,
    pub iv: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

/// Owner-facing listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResponse {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub created_at: String,
    pub expiry_at: String,
    pub download_count: i64,
}

impl From<FileRecord> for FileResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename,
            mime_type: record.mime_type,
            size_bytes: record.size_bytes,
            created_at: record.created_at,
            expiry_at: record.expiry_at,
            download_count: record.download_count,
        }
    }
}
