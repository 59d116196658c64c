use async_trait::async_trait;

use crate::db::{self, Database};
use crate::models::AuditEvent;

/// Best-effort, append-only audit sink. `append` cannot fail from the
/// caller's point of view; a broken sink must never fail a request.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: AuditEvent);
}

/// Writes events to the `audit_events` table
pub struct SqliteAuditSink {
    db: Database,
}

impl SqliteAuditSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn append(&self, event: AuditEvent) {
        let detail = event.detail.as_ref().map(|d| d.to_string());
        let result = sqlx::query(
            r#"
            INSERT INTO audit_events (timestamp, source_address, client_signature, file_id, kind, detail)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(db::timestamp(event.timestamp))
        .bind(&event.source_address)
        .bind(&event.client_signature)
        .bind(&event.file_id)
        .bind(event.kind.as_str())
        .bind(&detail)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => tracing::debug!(
                kind = event.kind.as_str(),
                source = %event.source_address,
                file_id = ?event.file_id,
                "audit event recorded"
            ),
            Err(e) => tracing::warn!(
                kind = event.kind.as_str(),
                source = %event.source_address,
                file_id = ?event.file_id,
                "Failed to write audit event: {}",
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditEventKind, ClientInfo};
    use chrono::Utc;

    fn client() -> ClientInfo {
        ClientInfo {
            address: "203.0.113.9".to_string(),
            user_agent: "curl/8.0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_append_persists_event() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("a.db").to_str().unwrap()).await.unwrap();
        db.run_migrations().await.unwrap();
        let sink = SqliteAuditSink::new(db.clone());

        sink.append(
            AuditEvent::new(AuditEventKind::Expired, &client(), Utc::now())
                .with_file("f-1")
                .with_detail(serde_json::json!({ "reason": "ttl" })),
        )
        .await;

        let row: (String, String, String, Option<String>, Option<String>) = sqlx::query_as(
            "SELECT kind, source_address, client_signature, file_id, detail FROM audit_events",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(row.0, "EXPIRED");
        assert_eq!(row.1, "203.0.113.9");
        assert_eq!(row.2, "curl/8.0");
        assert_eq!(row.3.as_deref(), Some("f-1"));
        assert_eq!(row.4.as_deref(), Some(r#"{"reason":"ttl"}"#));
    }

    #[tokio::test]
    async fn test_append_swallows_write_failures() {
        let dir = tempfile::tempdir().unwrap();
        // No migrations: the table does not exist
        let db = Database::new(dir.path().join("b.db").to_str().unwrap()).await.unwrap();
        let sink = SqliteAuditSink::new(db);

        sink.append(AuditEvent::new(AuditEventKind::AuthFailed, &client(), Utc::now()))
            .await;
    }
}
