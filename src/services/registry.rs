use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use bytes::Bytes;
use chrono::{Datelike, Duration};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::FilesConfig;
use crate::db::{self, Database};
use crate::error::{AppError, Result};
use crate::models::{FileRecord, NewFile};
use crate::storage::{new_blob_location, BlobStore};

pub const IV_LEN: usize = 12;
const MAX_FILENAME_LEN: usize = 255;
const MAX_MIME_LEN: usize = 127;

const IV_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Result of one sweep pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Records removed
    pub removed: usize,
    /// Records that could not be removed this pass
    pub failed: usize,
    /// Blob deletions that failed; the record was removed anyway
    pub orphaned_blobs: usize,
}

/// Lifecycle of encrypted file records: Active -> Expired -> Deleted
pub struct FileRegistry {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    default_ttl_hours: u32,
    max_ttl_hours: u32,
}

/// Reject ids that are not a hyphenated lowercase UUID before touching the store
pub fn validate_file_id(id: &str) -> Result<()> {
    let well_formed = id.len() == 36
        && Uuid::parse_str(id)
            .map(|uuid| uuid.hyphenated().to_string() == id)
            .unwrap_or(false);
    if well_formed {
        Ok(())
    } else {
        Err(AppError::InvalidInput("Malformed file id".to_string()))
    }
}

/// Decode a textual IV and return its canonical unpadded form
fn canonical_iv(iv: &str) -> Result<String> {
    let trimmed = iv.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("IV is required".to_string()));
    }
    let raw = IV_ENGINE
        .decode(trimmed)
        .map_err(|_| AppError::InvalidInput("IV is not valid URL-safe base64".to_string()))?;
    if raw.len() != IV_LEN {
        return Err(AppError::InvalidInput(format!(
            "IV must be {} bytes, got {}",
            IV_LEN,
            raw.len()
        )));
    }
    Ok(IV_ENGINE.encode(raw))
}

impl FileRegistry {
    pub fn new(
        db: Database,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        files: &FilesConfig,
    ) -> Self {
        Self {
            db,
            blobs,
            clock,
            default_ttl_hours: files.default_ttl_hours,
            max_ttl_hours: files.max_ttl_hours,
        }
    }

    fn validate(&self, new: &NewFile) -> Result<(String, u32)> {
        let iv = canonical_iv(&new.iv)?;

        let filename = new.filename.trim();
        if filename.is_empty() {
            return Err(AppError::InvalidInput("Filename is required".to_string()));
        }
        if filename.chars().count() > MAX_FILENAME_LEN {
            return Err(AppError::InvalidInput("Filename is too long".to_string()));
        }

        let mime_type = new.mime_type.trim();
        if mime_type.is_empty() {
            return Err(AppError::InvalidInput("MIME type is required".to_string()));
        }
        if mime_type.len() > MAX_MIME_LEN {
            return Err(AppError::InvalidInput("MIME type is too long".to_string()));
        }

        let ttl_hours = new.ttl_hours.unwrap_or(self.default_ttl_hours);
        if ttl_hours > self.max_ttl_hours {
            return Err(AppError::InvalidInput(format!(
                "ttl_hours must be at most {}",
                self.max_ttl_hours
            )));
        }

        Ok((iv, ttl_hours))
    }

    /// Commit a record for bytes already written at `blob_location`
    pub async fn create(
        &self,
        owner_id: &str,
        blob_location: &str,
        new: &NewFile,
        size_bytes: i64,
    ) -> Result<FileRecord> {
        let (iv, ttl_hours) = self.validate(new)?;

        let now = self.clock.now();
        // Four-digit years keep stored timestamps ordered as strings
        let expiry_at = now
            .checked_add_signed(Duration::hours(i64::from(ttl_hours)))
            .filter(|at| at.year() <= 9999)
            .ok_or_else(|| AppError::InvalidInput("ttl_hours is out of range".to_string()))?;
        let record = FileRecord {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            blob_location: blob_location.to_string(),
            iv,
            filename: new.filename.trim().to_string(),
            mime_type: new.mime_type.trim().to_string(),
            size_bytes,
            created_at: db::timestamp(now),
            expiry_at: db::timestamp(expiry_at),
            download_count: 0,
        };

        sqlx::query(
            r#"
            INSERT INTO files (id, owner_id, blob_location, iv, filename, mime_type, size_bytes, created_at, expiry_at, download_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(&record.blob_location)
        .bind(&record.iv)
        .bind(&record.filename)
        .bind(&record.mime_type)
        .bind(record.size_bytes)
        .bind(&record.created_at)
        .bind(&record.expiry_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e, "files.iv") {
                AppError::InvalidInput("IV has already been used; generate a fresh IV".to_string())
            } else {
                AppError::Database(e)
            }
        })?;

        tracing::info!(
            file_id = %record.id,
            owner_id = %record.owner_id,
            size = record.size_bytes,
            expiry_at = %record.expiry_at,
            "File record created"
        );
        Ok(record)
    }

    /// Persist ciphertext, then commit its record
    pub async fn store_upload(
        &self,
        owner_id: &str,
        new: &NewFile,
        data: Bytes,
    ) -> Result<FileRecord> {
        if data.is_empty() {
            return Err(AppError::InvalidInput("No file provided".to_string()));
        }
        // Fail fast on bad metadata before any bytes hit the store
        self.validate(new)?;

        let location = new_blob_location();
        let size = data.len() as i64;
        self.blobs.put(&location, data).await?;

        match self.create(owner_id, &location, new, size).await {
            Ok(record) => Ok(record),
            Err(e) => {
                // Unreferenced bytes are harmless, but there is no reason to keep them
                if let Err(cleanup) = self.blobs.delete(&location).await {
                    tracing::warn!("Failed to remove orphan blob {}: {}", location, cleanup);
                }
                Err(e)
            }
        }
    }

    pub async fn get_metadata(&self, id: &str) -> Result<FileRecord> {
        sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }

    /// Whether the record has reached its expiry instant
    pub fn is_expired(&self, record: &FileRecord) -> Result<bool> {
        let expiry_at = db::parse_timestamp(&record.expiry_at)?;
        Ok(expiry_at <= self.clock.now())
    }

    /// Expiry is checked here, before any sweep has physically removed the record
    pub async fn resolve_for_download(&self, id: &str) -> Result<FileRecord> {
        let record = self.get_metadata(id).await?;
        if self.is_expired(&record)? {
            return Err(AppError::Expired("File has expired".to_string()));
        }
        Ok(record)
    }

    pub async fn record_download(&self, id: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE files SET download_count = download_count + 1 WHERE id = ?")
                .bind(id)
                .execute(self.db.pool())
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("File not found".to_string()));
        }
        Ok(())
    }

    /// Resolve, read the ciphertext, then count the download.
    /// A sweep landing between the check and the read surfaces as `NotFound`.
    pub async fn read_blob(&self, id: &str) -> Result<(FileRecord, Bytes)> {
        let record = self.resolve_for_download(id).await?;
        let data = self.blobs.get(&record.blob_location).await?;
        self.record_download(id).await?;
        Ok((record, data))
    }

    /// Newest first
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<FileRecord>> {
        let records = sqlx::query_as(
            "SELECT * FROM files WHERE owner_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(records)
    }

    /// Remove the record, then the bytes. Byte removal is best effort.
    pub async fn delete_owned(&self, id: &str, requester_id: &str) -> Result<()> {
        validate_file_id(id)?;
        let record = self.get_metadata(id).await?;
        if record.owner_id != requester_id {
            return Err(AppError::Forbidden("Access denied".to_string()));
        }

        let result = sqlx::query("DELETE FROM files WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(requester_id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("File not found".to_string()));
        }

        if let Err(e) = self.blobs.delete(&record.blob_location).await {
            tracing::warn!(file_id = %id, "Failed to delete blob {}: {}", record.blob_location, e);
        }

        tracing::info!(file_id = %id, owner_id = %requester_id, "File deleted by owner");
        Ok(())
    }

    /// Purge every record whose expiry has passed, one record at a time
    pub async fn sweep_expired(&self) -> Result<SweepOutcome> {
        let now = db::timestamp(self.clock.now());
        let expired: Vec<(String, String)> =
            sqlx::query_as("SELECT id, blob_location FROM files WHERE expiry_at < ?")
                .bind(&now)
                .fetch_all(self.db.pool())
                .await?;

        let mut outcome = SweepOutcome::default();
        for (id, location) in expired {
            if let Err(e) = self.blobs.delete(&location).await {
                tracing::warn!(file_id = %id, "Sweep could not delete blob {}: {}", location, e);
                outcome.orphaned_blobs += 1;
            }

            let result = sqlx::query("DELETE FROM files WHERE id = ? AND expiry_at < ?")
                .bind(&id)
                .bind(&now)
                .execute(self.db.pool())
                .await;
            match result {
                Ok(r) if r.rows_affected() > 0 => outcome.removed += 1,
                Ok(_) => tracing::debug!(file_id = %id, "Already removed before sweep reached it"),
                Err(e) => {
                    tracing::error!(file_id = %id, "Sweep could not delete record: {}", e);
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::LocalBlobStore;
    use chrono::Utc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        registry: Arc<FileRegistry>,
        clock: Arc<ManualClock>,
        blobs: Arc<LocalBlobStore>,
        db: Database,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("reg.db").to_str().unwrap())
            .await
            .unwrap();
        db.run_migrations().await.unwrap();
        let blobs = Arc::new(LocalBlobStore::new(dir.path().join("blobs")));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = Arc::new(FileRegistry::new(
            db.clone(),
            blobs.clone(),
            clock.clone(),
            &FilesConfig::default(),
        ));
        Fixture {
            _dir: dir,
            registry,
            clock,
            blobs,
            db,
        }
    }

    fn iv(seed: u8) -> String {
        IV_ENGINE.encode([seed; IV_LEN])
    }

    fn new_file(seed: u8, ttl_hours: Option<u32>) -> NewFile {
        NewFile {
            iv: iv(seed),
            filename: format!("report-{}.pdf", seed),
            mime_type: "application/pdf".to_string(),
            ttl_hours,
        }
    }

    async fn upload(f: &Fixture, owner: &str, seed: u8, ttl_hours: Option<u32>) -> FileRecord {
        f.registry
            .store_upload(owner, &new_file(seed, ttl_hours), Bytes::from(vec![seed; 10]))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_sets_expiry_from_ttl() {
        let f = fixture().await;
        let start = f.clock.now();
        let record = upload(&f, "alice", 1, Some(3)).await;

        assert_eq!(record.created_at, db::timestamp(start));
        assert_eq!(record.expiry_at, db::timestamp(start + Duration::hours(3)));
        assert_eq!(record.download_count, 0);
        assert_eq!(record.size_bytes, 10);
        validate_file_id(&record.id).unwrap();

        let stored = f.registry.get_metadata(&record.id).await.unwrap();
        assert_eq!(stored.filename, "report-1.pdf");
        assert!(f.blobs.exists(&stored.blob_location).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_ttl_uses_configured_default() {
        let f = fixture().await;
        let start = f.clock.now();
        let record = upload(&f, "alice", 1, None).await;
        assert_eq!(record.expiry_at, db::timestamp(start + Duration::hours(24)));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let f = fixture().await;
        let cases = [
            NewFile {
                iv: String::new(),
                ..new_file(1, None)
            },
            NewFile {
                iv: IV_ENGINE.encode([1u8; 16]),
                ..new_file(1, None)
            },
            NewFile {
                iv: "not base64!".to_string(),
                ..new_file(1, None)
            },
            NewFile {
                filename: "   ".to_string(),
                ..new_file(1, None)
            },
            NewFile {
                mime_type: String::new(),
                ..new_file(1, None)
            },
            NewFile {
                ttl_hours: Some(169),
                ..new_file(1, None)
            },
        ];
        for case in cases {
            let err = f.registry.create("alice", "aa/x", &case, 1).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)), "{:?}", case);
        }
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_invalid_input() {
        let f = fixture().await;
        let files = FilesConfig {
            max_ttl_hours: u32::MAX,
            ..FilesConfig::default()
        };
        let registry = FileRegistry::new(f.db.clone(), f.blobs.clone(), f.clock.clone(), &files);

        // Past chrono's range, then past four-digit years
        for (seed, hours) in [(1, u32::MAX), (2, 24 * 365 * 9000)] {
            let err = registry
                .create("alice", "aa/x", &new_file(seed, Some(hours)), 1)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)), "{}", hours);
        }
    }

    #[tokio::test]
    async fn test_reused_iv_is_rejected_and_bytes_discarded() {
        let f = fixture().await;
        upload(&f, "alice", 7, None).await;

        let err = f
            .registry
            .store_upload("bob", &new_file(7, None), Bytes::from_static(b"other"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        // Only the first upload's blob is left on disk
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
            .fetch_one(f.db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
        let shards = std::fs::read_dir(f._dir.path().join("blobs")).unwrap().count();
        assert_eq!(shards, 1);
    }

    #[tokio::test]
    async fn test_padded_iv_is_stored_canonically() {
        let f = fixture().await;
        let padded = base64::engine::general_purpose::URL_SAFE.encode([9u8; IV_LEN]);
        let record = f
            .registry
            .create("alice", "aa/x", &NewFile { iv: padded, ..new_file(9, None) }, 1)
            .await
            .unwrap();
        assert_eq!(record.iv, iv(9));
    }

    #[tokio::test]
    async fn test_zero_ttl_is_expired_immediately() {
        let f = fixture().await;
        let record = upload(&f, "alice", 1, Some(0)).await;

        let err = f.registry.resolve_for_download(&record.id).await.unwrap_err();
        assert!(matches!(err, AppError::Expired(_)));
        // Metadata is still readable until the sweep removes it
        let stored = f.registry.get_metadata(&record.id).await.unwrap();
        assert!(f.registry.is_expired(&stored).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let f = fixture().await;
        let id = Uuid::new_v4().to_string();
        assert!(matches!(
            f.registry.resolve_for_download(&id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.registry.record_download(&id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_downloads_are_all_counted() {
        let f = fixture().await;
        let record = upload(&f, "alice", 1, None).await;

        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let registry = f.registry.clone();
                let id = record.id.clone();
                tokio::spawn(async move { registry.record_download(&id).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = f.registry.get_metadata(&record.id).await.unwrap();
        assert_eq!(stored.download_count, 25);
    }

    #[tokio::test]
    async fn test_read_blob_counts_and_returns_bytes() {
        let f = fixture().await;
        let record = upload(&f, "alice", 4, None).await;

        let (resolved, data) = f.registry.read_blob(&record.id).await.unwrap();
        assert_eq!(resolved.id, record.id);
        assert_eq!(data, Bytes::from(vec![4u8; 10]));
        let (_, _) = f.registry.read_blob(&record.id).await.unwrap();

        let stored = f.registry.get_metadata(&record.id).await.unwrap();
        assert_eq!(stored.download_count, 2);
    }

    #[tokio::test]
    async fn test_read_blob_after_bytes_vanish_is_not_found() {
        let f = fixture().await;
        let record = upload(&f, "alice", 4, None).await;
        f.blobs.delete(&record.blob_location).await.unwrap();

        assert!(matches!(
            f.registry.read_blob(&record.id).await,
            Err(AppError::NotFound(_))
        ));
        let stored = f.registry.get_metadata(&record.id).await.unwrap();
        assert_eq!(stored.download_count, 0);
    }

    #[tokio::test]
    async fn test_list_by_owner_newest_first() {
        let f = fixture().await;
        let first = upload(&f, "alice", 1, None).await;
        f.clock.advance(Duration::seconds(5));
        upload(&f, "bob", 2, None).await;
        f.clock.advance(Duration::seconds(5));
        let third = upload(&f, "alice", 3, None).await;

        let listed = f.registry.list_by_owner("alice").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![third.id.as_str(), first.id.as_str()]);
    }

    #[tokio::test]
    async fn test_delete_by_non_owner_is_forbidden() {
        let f = fixture().await;
        let record = upload(&f, "bob", 1, None).await;

        let err = f.registry.delete_owned(&record.id, "alice").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(f.registry.get_metadata(&record.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_rejects_malformed_id_before_lookup() {
        let f = fixture().await;
        let record = upload(&f, "bob", 1, None).await;

        let upper = record.id.to_uppercase();
        for bad in ["not-a-uuid", "", upper.as_str()] {
            let err = f.registry.delete_owned(bad, "bob").await.unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)), "{:?}", bad);
        }
        assert!(f.registry.get_metadata(&record.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_owner_delete_removes_record_and_bytes() {
        let f = fixture().await;
        let record = upload(&f, "bob", 1, None).await;

        f.registry.delete_owned(&record.id, "bob").await.unwrap();
        assert!(matches!(
            f.registry.get_metadata(&record.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(!f.blobs.exists(&record.blob_location).await.unwrap());
    }

    #[tokio::test]
    async fn test_owner_delete_tolerates_missing_bytes() {
        let f = fixture().await;
        let record = upload(&f, "bob", 1, None).await;
        f.blobs.delete(&record.blob_location).await.unwrap();

        f.registry.delete_owned(&record.id, "bob").await.unwrap();
        assert!(f.registry.get_metadata(&record.id).await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_and_is_idempotent() {
        let f = fixture().await;
        let short_a = upload(&f, "alice", 1, Some(1)).await;
        let short_b = upload(&f, "bob", 2, Some(1)).await;
        let long = upload(&f, "alice", 3, Some(48)).await;

        f.clock.advance(Duration::hours(2));
        let outcome = f.registry.sweep_expired().await.unwrap();
        assert_eq!(outcome.removed, 2);
        assert_eq!(outcome.failed, 0);

        for gone in [&short_a, &short_b] {
            assert!(f.registry.get_metadata(&gone.id).await.is_err());
            assert!(!f.blobs.exists(&gone.blob_location).await.unwrap());
        }
        assert!(f.registry.resolve_for_download(&long.id).await.is_ok());

        let again = f.registry.sweep_expired().await.unwrap();
        assert_eq!(again, SweepOutcome::default());
    }

    #[tokio::test]
    async fn test_sweep_tolerates_bytes_already_gone() {
        let f = fixture().await;
        let record = upload(&f, "alice", 1, Some(1)).await;
        f.blobs.delete(&record.blob_location).await.unwrap();

        f.clock.advance(Duration::hours(1) + Duration::seconds(1));
        let outcome = f.registry.sweep_expired().await.unwrap();
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.orphaned_blobs, 0);
    }

    #[test]
    fn test_validate_file_id() {
        validate_file_id("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap();
        for bad in [
            "",
            "../etc/passwd",
            "0F8FAD5B-D9CB-469F-A165-70867728950E",
            "0f8fad5bd9cb469fa16570867728950e",
            "{0f8fad5b-d9cb-469f-a165-70867728950e}",
            "0f8fad5b-d9cb-469f-a165-70867728950",
        ] {
            assert!(validate_file_id(bad).is_err(), "{:?} accepted", bad);
        }
    }
}
