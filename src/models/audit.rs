use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventKind {
    DownloadOk,
    NotFound,
    Expired,
    RateLimited,
    AuthFailed,
    UploadOk,
    UploadFailed,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventKind::DownloadOk => "DOWNLOAD_OK",
            AuditEventKind::NotFound => "NOT_FOUND",
            AuditEventKind::Expired => "EXPIRED",
            AuditEventKind::RateLimited => "RATE_LIMITED",
            AuditEventKind::AuthFailed => "AUTH_FAILED",
            AuditEventKind::UploadOk => "UPLOAD_OK",
            AuditEventKind::UploadFailed => "UPLOAD_FAILED",
        }
    }
}

/// Where a request came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub address: String,
    pub user_agent: String,
}

/// Write-once security event
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub source_address: String,
    pub client_signature: String,
    pub file_id: Option<String>,
    pub kind: AuditEventKind,
    pub detail: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(kind: AuditEventKind, client: &ClientInfo, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            source_address: client.address.clone(),
            client_signature: client.user_agent.clone(),
            file_id: None,
            kind,
            detail: None,
        }
    }

    pub fn with_file(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}
