use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::postgres::PgRow;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{PgPool, Row, SqlitePool, query};
use thiserror::Error;

use crate::model::{BackupRecord, BackupStatus, BackupTier};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("backup not found: {0}")]
    NotFound(String),
    #[error("backup {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: BackupStatus,
        to: BackupStatus,
    },
    #[error("backup {id} is {status}; only FAILED records can be removed")]
    NotRemovable { id: String, status: BackupStatus },
    #[error("corrupt catalog row: {0}")]
    Decode(String),
    #[error("restore lock '{name}' is held by {holder} until {expires_at}")]
    LockHeld {
        name: String,
        holder: String,
        expires_at: DateTime<Utc>,
    },
}

/// Filter for operator-facing listings.
#[derive(Clone, Debug)]
pub struct BackupFilter {
    pub tier: Option<BackupTier>,
    pub status: Option<BackupStatus>,
    pub limit: u32,
}

impl Default for BackupFilter {
    fn default() -> Self {
        Self {
            tier: None,
            status: None,
            limit: 20,
        }
    }
}

/// Aggregate row of `usage_summary`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageRow {
    pub tier: BackupTier,
    pub status: BackupStatus,
    pub count: u64,
    pub total_bytes: u64,
}

/// Durable record set describing every backup artifact.
///
/// Only the cleanup executor calls the mutating operations; the restore
/// orchestrator is read-only.
#[async_trait]
pub trait BackupCatalog: Send + Sync {
    async fn get_backup(&self, id: &str) -> Result<Option<BackupRecord>, CatalogError>;

    /// The completed record with the most recent `created_at`.
    async fn latest_completed(&self) -> Result<Option<BackupRecord>, CatalogError>;

    /// Records in `status` created strictly before `cutoff`, oldest first.
    /// `tier = None` matches every tier.
    async fn list_expired(
        &self,
        tier: Option<BackupTier>,
        status: BackupStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BackupRecord>, CatalogError>;

    /// Soft delete: `COMPLETED → DELETED`, keeping the row for history.
    async fn mark_deleted(&self, id: &str) -> Result<(), CatalogError>;

    /// Hard delete of a `FAILED` row.
    async fn delete_failed(&self, id: &str) -> Result<(), CatalogError>;

    async fn insert_backup(&self, record: &BackupRecord) -> Result<(), CatalogError>;

    /// Newest first, bounded by `filter.limit`.
    async fn list_backups(&self, filter: &BackupFilter) -> Result<Vec<BackupRecord>, CatalogError>;

    async fn count_backups(&self, filter: &BackupFilter) -> Result<u64, CatalogError>;

    async fn usage_summary(&self) -> Result<Vec<UsageRow>, CatalogError>;
}

/// SQL-backed catalog (PostgreSQL or SQLite).
#[derive(Clone, Debug)]
pub enum SqlCatalog {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

const RECORD_COLUMNS: &str = "id, filename, tier, status, file_size_bytes, checksum, error, \
     started_at, completed_at, created_at";

impl SqlCatalog {
    /// Connect to the catalog database and create tables if needed.
    pub async fn new(dsn: &str) -> Result<Self, CatalogError> {
        tracing::info!(dsn = %crate::config::redact_dsn(dsn), "Connecting to backup catalog");

        let catalog = if dsn.starts_with("sqlite:") {
            if dsn.contains(":memory:") {
                return Self::new_in_memory().await;
            }
            // mode=rwc creates the database file if it doesn't exist
            let dsn_with_create = if dsn.contains('?') {
                if dsn.contains("mode=") {
                    dsn.to_string()
                } else {
                    format!("{dsn}&mode=rwc")
                }
            } else {
                format!("{dsn}?mode=rwc")
            };

            let pool = SqlitePool::connect(&dsn_with_create).await.map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to SQLite catalog");
                e
            })?;
            SqlCatalog::Sqlite(pool)
        } else {
            let pool = PgPool::connect(dsn).await.map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to PostgreSQL catalog");
                e
            })?;
            SqlCatalog::Postgres(pool)
        };

        catalog.init().await?;
        tracing::debug!("Backup catalog schema initialized");
        Ok(catalog)
    }

    /// Single-connection in-memory SQLite catalog.
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool is
    /// pinned to one connection that never expires.
    pub async fn new_in_memory() -> Result<Self, CatalogError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let catalog = SqlCatalog::Sqlite(pool);
        catalog.init().await?;
        Ok(catalog)
    }

    async fn init(&self) -> Result<(), CatalogError> {
        match self {
            SqlCatalog::Sqlite(pool) => {
                let statements = [
                    r#"
                    CREATE TABLE IF NOT EXISTS database_backups (
                        id TEXT PRIMARY KEY,
                        filename TEXT NOT NULL,
                        tier TEXT NOT NULL,
                        status TEXT NOT NULL,
                        file_size_bytes INTEGER NOT NULL DEFAULT 0,
                        checksum TEXT,
                        error TEXT,
                        started_at TEXT NOT NULL,
                        completed_at TEXT,
                        created_at TEXT NOT NULL
                    )"#,
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_database_backups_expiry
                        ON database_backups (tier, status, created_at)"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS audit_log (
                        id TEXT PRIMARY KEY,
                        actor_id TEXT NOT NULL,
                        action TEXT NOT NULL,
                        entity_type TEXT NOT NULL,
                        entity_id TEXT NOT NULL,
                        details TEXT NOT NULL,
                        created_at TEXT NOT NULL
                    )"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS restore_locks (
                        name TEXT PRIMARY KEY,
                        holder TEXT NOT NULL,
                        acquired_at TEXT NOT NULL,
                        expires_at TEXT NOT NULL
                    )"#,
                ];
                for statement in statements {
                    query(statement).execute(pool).await?;
                }
            }
            SqlCatalog::Postgres(pool) => {
                let statements = [
                    r#"
                    CREATE TABLE IF NOT EXISTS database_backups (
                        id TEXT PRIMARY KEY,
                        filename TEXT NOT NULL,
                        tier TEXT NOT NULL,
                        status TEXT NOT NULL,
                        file_size_bytes BIGINT NOT NULL DEFAULT 0,
                        checksum TEXT,
                        error TEXT,
                        started_at TIMESTAMPTZ NOT NULL,
                        completed_at TIMESTAMPTZ,
                        created_at TIMESTAMPTZ NOT NULL
                    )"#,
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_database_backups_expiry
                        ON database_backups (tier, status, created_at)"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS audit_log (
                        id TEXT PRIMARY KEY,
                        actor_id TEXT NOT NULL,
                        action TEXT NOT NULL,
                        entity_type TEXT NOT NULL,
                        entity_id TEXT NOT NULL,
                        details TEXT NOT NULL,
                        created_at TIMESTAMPTZ NOT NULL
                    )"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS restore_locks (
                        name TEXT PRIMARY KEY,
                        holder TEXT NOT NULL,
                        acquired_at TIMESTAMPTZ NOT NULL,
                        expires_at TIMESTAMPTZ NOT NULL
                    )"#,
                ];
                for statement in statements {
                    query(statement).execute(pool).await?;
                }
            }
        }
        Ok(())
    }

    /// Round-trip query used by pre-flight checks.
    pub async fn ping(&self) -> Result<(), CatalogError> {
        match self {
            SqlCatalog::Sqlite(pool) => {
                query("SELECT 1").execute(pool).await?;
            }
            SqlCatalog::Postgres(pool) => {
                query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        match self {
            SqlCatalog::Sqlite(pool) => pool.close().await,
            SqlCatalog::Postgres(pool) => pool.close().await,
        }
    }

    /// Explains why `mark_deleted`/`delete_failed` touched no row.
    async fn refusal(&self, id: &str, to: Option<BackupStatus>) -> CatalogError {
        match self.get_backup(id).await {
            Ok(Some(record)) => match to {
                Some(to) => CatalogError::InvalidTransition {
                    id: id.to_string(),
                    from: record.status,
                    to,
                },
                None => CatalogError::NotRemovable {
                    id: id.to_string(),
                    status: record.status,
                },
            },
            Ok(None) => CatalogError::NotFound(id.to_string()),
            Err(e) => e,
        }
    }
}

/// SQLite stores timestamps as fixed-width RFC 3339 UTC text so that string
/// comparison matches time order.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(raw: &str) -> Result<DateTime<Utc>, CatalogError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CatalogError::Decode(format!("invalid timestamp '{raw}': {e}")))
}

fn size_to_db(size: u64) -> Result<i64, CatalogError> {
    i64::try_from(size).map_err(|_| CatalogError::Decode(format!("file size {size} overflows")))
}

fn size_from_db(size: i64) -> Result<u64, CatalogError> {
    u64::try_from(size).map_err(|_| CatalogError::Decode(format!("negative file size {size}")))
}

fn parse_enum<T: std::str::FromStr<Err = crate::model::ParseEnumError>>(
    raw: &str,
) -> Result<T, CatalogError> {
    raw.parse::<T>()
        .map_err(|e| CatalogError::Decode(e.to_string()))
}

fn record_from_sqlite(row: &SqliteRow) -> Result<BackupRecord, CatalogError> {
    let completed_at: Option<String> = row.try_get("completed_at")?;
    Ok(BackupRecord {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        tier: parse_enum(row.try_get::<&str, _>("tier")?)?,
        status: parse_enum(row.try_get::<&str, _>("status")?)?,
        file_size_bytes: size_from_db(row.try_get("file_size_bytes")?)?,
        checksum: row.try_get("checksum")?,
        error: row.try_get("error")?,
        started_at: decode_ts(row.try_get::<&str, _>("started_at")?)?,
        completed_at: completed_at.as_deref().map(decode_ts).transpose()?,
        created_at: decode_ts(row.try_get::<&str, _>("created_at")?)?,
    })
}

fn record_from_postgres(row: &PgRow) -> Result<BackupRecord, CatalogError> {
    Ok(BackupRecord {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        tier: parse_enum(row.try_get::<&str, _>("tier")?)?,
        status: parse_enum(row.try_get::<&str, _>("status")?)?,
        file_size_bytes: size_from_db(row.try_get("file_size_bytes")?)?,
        checksum: row.try_get("checksum")?,
        error: row.try_get("error")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl BackupCatalog for SqlCatalog {
    async fn get_backup(&self, id: &str) -> Result<Option<BackupRecord>, CatalogError> {
        match self {
            SqlCatalog::Sqlite(pool) => {
                let sql = format!("SELECT {RECORD_COLUMNS} FROM database_backups WHERE id = ?");
                let row = query(&sql).bind(id).fetch_optional(pool).await?;
                row.as_ref().map(record_from_sqlite).transpose()
            }
            SqlCatalog::Postgres(pool) => {
                let sql = format!("SELECT {RECORD_COLUMNS} FROM database_backups WHERE id = $1");
                let row = query(&sql).bind(id).fetch_optional(pool).await?;
                row.as_ref().map(record_from_postgres).transpose()
            }
        }
    }

    async fn latest_completed(&self) -> Result<Option<BackupRecord>, CatalogError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM database_backups \
             WHERE status = 'COMPLETED' ORDER BY created_at DESC LIMIT 1"
        );
        match self {
            SqlCatalog::Sqlite(pool) => {
                let row = query(&sql).fetch_optional(pool).await?;
                row.as_ref().map(record_from_sqlite).transpose()
            }
            SqlCatalog::Postgres(pool) => {
                let row = query(&sql).fetch_optional(pool).await?;
                row.as_ref().map(record_from_postgres).transpose()
            }
        }
    }

    async fn list_expired(
        &self,
        tier: Option<BackupTier>,
        status: BackupStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BackupRecord>, CatalogError> {
        let tier = tier.map(|t| t.as_str());
        match self {
            SqlCatalog::Sqlite(pool) => {
                let sql = format!(
                    "SELECT {RECORD_COLUMNS} FROM database_backups \
                     WHERE (?1 IS NULL OR tier = ?1) AND status = ?2 AND created_at < ?3 \
                     ORDER BY created_at ASC"
                );
                let rows = query(&sql)
                    .bind(tier)
                    .bind(status.as_str())
                    .bind(encode_ts(&cutoff))
                    .fetch_all(pool)
                    .await?;
                rows.iter().map(record_from_sqlite).collect()
            }
            SqlCatalog::Postgres(pool) => {
                let sql = format!(
                    "SELECT {RECORD_COLUMNS} FROM database_backups \
                     WHERE ($1::TEXT IS NULL OR tier = $1) AND status = $2 AND created_at < $3 \
                     ORDER BY created_at ASC"
                );
                let rows = query(&sql)
                    .bind(tier)
                    .bind(status.as_str())
                    .bind(cutoff)
                    .fetch_all(pool)
                    .await?;
                rows.iter().map(record_from_postgres).collect()
            }
        }
    }

    async fn mark_deleted(&self, id: &str) -> Result<(), CatalogError> {
        let affected = match self {
            SqlCatalog::Sqlite(pool) => query(
                "UPDATE database_backups SET status = 'DELETED' \
                 WHERE id = ? AND status = 'COMPLETED'",
            )
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected(),
            SqlCatalog::Postgres(pool) => query(
                "UPDATE database_backups SET status = 'DELETED' \
                 WHERE id = $1 AND status = 'COMPLETED'",
            )
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected(),
        };

        if affected == 0 {
            return Err(self.refusal(id, Some(BackupStatus::Deleted)).await);
        }
        Ok(())
    }

    async fn delete_failed(&self, id: &str) -> Result<(), CatalogError> {
        let affected = match self {
            SqlCatalog::Sqlite(pool) => {
                query("DELETE FROM database_backups WHERE id = ? AND status = 'FAILED'")
                    .bind(id)
                    .execute(pool)
                    .await?
                    .rows_affected()
            }
            SqlCatalog::Postgres(pool) => {
                query("DELETE FROM database_backups WHERE id = $1 AND status = 'FAILED'")
                    .bind(id)
                    .execute(pool)
                    .await?
                    .rows_affected()
            }
        };

        if affected == 0 {
            return Err(self.refusal(id, None).await);
        }
        Ok(())
    }

    async fn insert_backup(&self, record: &BackupRecord) -> Result<(), CatalogError> {
        let size = size_to_db(record.file_size_bytes)?;
        match self {
            SqlCatalog::Sqlite(pool) => {
                let sql = format!(
                    "INSERT INTO database_backups ({RECORD_COLUMNS}) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                );
                query(&sql)
                    .bind(&record.id)
                    .bind(&record.filename)
                    .bind(record.tier.as_str())
                    .bind(record.status.as_str())
                    .bind(size)
                    .bind(&record.checksum)
                    .bind(&record.error)
                    .bind(encode_ts(&record.started_at))
                    .bind(record.completed_at.as_ref().map(encode_ts))
                    .bind(encode_ts(&record.created_at))
                    .execute(pool)
                    .await?;
            }
            SqlCatalog::Postgres(pool) => {
                let sql = format!(
                    "INSERT INTO database_backups ({RECORD_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
                );
                query(&sql)
                    .bind(&record.id)
                    .bind(&record.filename)
                    .bind(record.tier.as_str())
                    .bind(record.status.as_str())
                    .bind(size)
                    .bind(&record.checksum)
                    .bind(&record.error)
                    .bind(record.started_at)
                    .bind(record.completed_at)
                    .bind(record.created_at)
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn list_backups(&self, filter: &BackupFilter) -> Result<Vec<BackupRecord>, CatalogError> {
        let tier = filter.tier.map(|t| t.as_str());
        let status = filter.status.map(|s| s.as_str());
        let limit = i64::from(filter.limit);
        match self {
            SqlCatalog::Sqlite(pool) => {
                let sql = format!(
                    "SELECT {RECORD_COLUMNS} FROM database_backups \
                     WHERE (?1 IS NULL OR tier = ?1) AND (?2 IS NULL OR status = ?2) \
                     ORDER BY created_at DESC LIMIT ?3"
                );
                let rows = query(&sql)
                    .bind(tier)
                    .bind(status)
                    .bind(limit)
                    .fetch_all(pool)
                    .await?;
                rows.iter().map(record_from_sqlite).collect()
            }
            SqlCatalog::Postgres(pool) => {
                let sql = format!(
                    "SELECT {RECORD_COLUMNS} FROM database_backups \
                     WHERE ($1::TEXT IS NULL OR tier = $1) AND ($2::TEXT IS NULL OR status = $2) \
                     ORDER BY created_at DESC LIMIT $3"
                );
                let rows = query(&sql)
                    .bind(tier)
                    .bind(status)
                    .bind(limit)
                    .fetch_all(pool)
                    .await?;
                rows.iter().map(record_from_postgres).collect()
            }
        }
    }

    async fn count_backups(&self, filter: &BackupFilter) -> Result<u64, CatalogError> {
        let tier = filter.tier.map(|t| t.as_str());
        let status = filter.status.map(|s| s.as_str());
        let count: i64 = match self {
            SqlCatalog::Sqlite(pool) => query(
                "SELECT COUNT(*) AS total FROM database_backups \
                 WHERE (?1 IS NULL OR tier = ?1) AND (?2 IS NULL OR status = ?2)",
            )
            .bind(tier)
            .bind(status)
            .fetch_one(pool)
            .await?
            .try_get("total")?,
            SqlCatalog::Postgres(pool) => query(
                "SELECT COUNT(*) AS total FROM database_backups \
                 WHERE ($1::TEXT IS NULL OR tier = $1) AND ($2::TEXT IS NULL OR status = $2)",
            )
            .bind(tier)
            .bind(status)
            .fetch_one(pool)
            .await?
            .try_get("total")?,
        };
        size_from_db(count)
    }

    async fn usage_summary(&self) -> Result<Vec<UsageRow>, CatalogError> {
        let sql = "SELECT tier, status, COUNT(*) AS total, \
                   CAST(COALESCE(SUM(file_size_bytes), 0) AS BIGINT) AS bytes \
                   FROM database_backups GROUP BY tier, status ORDER BY tier, status";
        let raw: Vec<(String, String, i64, i64)> = match self {
            SqlCatalog::Sqlite(pool) => query(sql)
                .fetch_all(pool)
                .await?
                .iter()
                .map(|row| {
                    Ok((
                        row.try_get("tier")?,
                        row.try_get("status")?,
                        row.try_get("total")?,
                        row.try_get("bytes")?,
                    ))
                })
                .collect::<Result<_, sqlx::Error>>()?,
            SqlCatalog::Postgres(pool) => query(sql)
                .fetch_all(pool)
                .await?
                .iter()
                .map(|row| {
                    Ok((
                        row.try_get("tier")?,
                        row.try_get("status")?,
                        row.try_get("total")?,
                        row.try_get("bytes")?,
                    ))
                })
                .collect::<Result<_, sqlx::Error>>()?,
        };

        raw.into_iter()
            .map(|(tier, status, count, bytes)| {
                Ok(UsageRow {
                    tier: parse_enum(&tier)?,
                    status: parse_enum(&status)?,
                    count: size_from_db(count)?,
                    total_bytes: size_from_db(bytes)?,
                })
            })
            .collect()
    }
}
