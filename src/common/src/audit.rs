use async_trait::async_trait;
use sqlx::{Row, query};

use crate::catalog::{CatalogError, SqlCatalog, decode_ts, encode_ts};
use crate::model::{AuditAction, AuditLogEntry};

/// Append-only audit sink.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), CatalogError>;
}

#[async_trait]
impl AuditLog for SqlCatalog {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), CatalogError> {
        let details = entry.details.to_string();
        match self {
            SqlCatalog::Sqlite(pool) => {
                query(
                    "INSERT INTO audit_log \
                     (id, actor_id, action, entity_type, entity_id, details, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&entry.id)
                .bind(&entry.actor_id)
                .bind(entry.action.as_str())
                .bind(&entry.entity_type)
                .bind(&entry.entity_id)
                .bind(details)
                .bind(encode_ts(&entry.created_at))
                .execute(pool)
                .await?;
            }
            SqlCatalog::Postgres(pool) => {
                query(
                    "INSERT INTO audit_log \
                     (id, actor_id, action, entity_type, entity_id, details, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(&entry.id)
                .bind(&entry.actor_id)
                .bind(entry.action.as_str())
                .bind(&entry.entity_type)
                .bind(&entry.entity_id)
                .bind(details)
                .bind(entry.created_at)
                .execute(pool)
                .await?;
            }
        }

        tracing::debug!(
            action = %entry.action,
            entity_id = %entry.entity_id,
            actor_id = %entry.actor_id,
            "Audit entry recorded"
        );
        Ok(())
    }
}

fn parse_action(raw: &str) -> Result<AuditAction, CatalogError> {
    match raw {
        "DATABASE_RESTORED" => Ok(AuditAction::DatabaseRestored),
        other => Err(CatalogError::Decode(format!("unknown audit action '{other}'"))),
    }
}

fn parse_details(raw: &str) -> Result<serde_json::Value, CatalogError> {
    serde_json::from_str(raw).map_err(|e| CatalogError::Decode(format!("audit details: {e}")))
}

impl SqlCatalog {
    /// Audit history for one entity, oldest first.
    pub async fn audit_entries_for(
        &self,
        entity_id: &str,
    ) -> Result<Vec<AuditLogEntry>, CatalogError> {
        let columns = "id, actor_id, action, entity_type, entity_id, details, created_at";
        match self {
            SqlCatalog::Sqlite(pool) => {
                let sql = format!(
                    "SELECT {columns} FROM audit_log WHERE entity_id = ? ORDER BY created_at ASC"
                );
                let rows = query(&sql).bind(entity_id).fetch_all(pool).await?;
                rows.iter()
                    .map(|row| {
                        Ok(AuditLogEntry {
                            id: row.try_get("id")?,
                            actor_id: row.try_get("actor_id")?,
                            action: parse_action(row.try_get("action")?)?,
                            entity_type: row.try_get("entity_type")?,
                            entity_id: row.try_get("entity_id")?,
                            details: parse_details(row.try_get("details")?)?,
                            created_at: decode_ts(row.try_get("created_at")?)?,
                        })
                    })
                    .collect()
            }
            SqlCatalog::Postgres(pool) => {
                let sql = format!(
                    "SELECT {columns} FROM audit_log WHERE entity_id = $1 ORDER BY created_at ASC"
                );
                let rows = query(&sql).bind(entity_id).fetch_all(pool).await?;
                rows.iter()
                    .map(|row| {
                        Ok(AuditLogEntry {
                            id: row.try_get("id")?,
                            actor_id: row.try_get("actor_id")?,
                            action: parse_action(row.try_get("action")?)?,
                            entity_type: row.try_get("entity_type")?,
                            entity_id: row.try_get("entity_id")?,
                            details: parse_details(row.try_get("details")?)?,
                            created_at: row.try_get("created_at")?,
                        })
                    })
                    .collect()
            }
        }
    }
}
