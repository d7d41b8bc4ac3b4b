use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use uuid::Uuid;

use super::backup::BackupRecord;

/// Kind of event recorded in the audit log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    DatabaseRestored,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::DatabaseRestored => "DATABASE_RESTORED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub actor_id: String,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Entry written after the database was restored from `backup`.
    pub fn database_restored(actor_id: &str, backup: &BackupRecord, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actor_id: actor_id.to_string(),
            action: AuditAction::DatabaseRestored,
            entity_type: "DatabaseBackup".to_string(),
            entity_id: backup.id.clone(),
            details: json!({
                "backupId": backup.id,
                "filename": backup.filename,
                "timestamp": at.to_rfc3339(),
                "operation": AuditAction::DatabaseRestored.as_str(),
            }),
            created_at: at,
        }
    }
}
