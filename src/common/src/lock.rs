//! Lease-based mutual exclusion for destructive operations.
//!
//! A lease is a row in `restore_locks`. Expired leases are taken over on the
//! next acquisition, so a crashed holder blocks others for at most `ttl`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, query};
use std::time::Duration;

use crate::catalog::{CatalogError, SqlCatalog, decode_ts, encode_ts};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockLease {
    pub name: String,
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait RestoreLock: Send + Sync {
    /// Fails with [`CatalogError::LockHeld`] while another holder has an
    /// unexpired lease.
    async fn acquire(&self, name: &str, holder: &str, ttl: Duration)
    -> Result<LockLease, CatalogError>;

    /// Returns `false` if the lease was already gone or taken over.
    async fn release(&self, lease: &LockLease) -> Result<bool, CatalogError>;
}

#[async_trait]
impl RestoreLock for SqlCatalog {
    async fn acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<LockLease, CatalogError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CatalogError::Decode(format!("lock ttl out of range: {e}")))?;
        let lease = LockLease {
            name: name.to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: now + ttl,
        };

        let inserted = match self {
            SqlCatalog::Sqlite(pool) => {
                query("DELETE FROM restore_locks WHERE name = ? AND expires_at <= ?")
                    .bind(name)
                    .bind(encode_ts(&now))
                    .execute(pool)
                    .await?;
                query(
                    "INSERT INTO restore_locks (name, holder, acquired_at, expires_at) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(name)
                .bind(holder)
                .bind(encode_ts(&lease.acquired_at))
                .bind(encode_ts(&lease.expires_at))
                .execute(pool)
                .await
                .map(|_| ())
            }
            SqlCatalog::Postgres(pool) => {
                query("DELETE FROM restore_locks WHERE name = $1 AND expires_at <= $2")
                    .bind(name)
                    .bind(now)
                    .execute(pool)
                    .await?;
                query(
                    "INSERT INTO restore_locks (name, holder, acquired_at, expires_at) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(name)
                .bind(holder)
                .bind(lease.acquired_at)
                .bind(lease.expires_at)
                .execute(pool)
                .await
                .map(|_| ())
            }
        };

        match inserted {
            Ok(_) => {
                tracing::info!(
                    lock = %name,
                    holder = %holder,
                    expires_at = %lease.expires_at,
                    "Acquired lock"
                );
                Ok(lease)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                let (current_holder, expires_at) = self.current_holder(name).await?;
                Err(CatalogError::LockHeld {
                    name: name.to_string(),
                    holder: current_holder,
                    expires_at,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn release(&self, lease: &LockLease) -> Result<bool, CatalogError> {
        let affected = match self {
            SqlCatalog::Sqlite(pool) => {
                query("DELETE FROM restore_locks WHERE name = ? AND holder = ?")
                    .bind(&lease.name)
                    .bind(&lease.holder)
                    .execute(pool)
                    .await?
                    .rows_affected()
            }
            SqlCatalog::Postgres(pool) => {
                query("DELETE FROM restore_locks WHERE name = $1 AND holder = $2")
                    .bind(&lease.name)
                    .bind(&lease.holder)
                    .execute(pool)
                    .await?
                    .rows_affected()
            }
        };

        if affected == 0 {
            tracing::warn!(lock = %lease.name, holder = %lease.holder, "Lock was no longer held");
        } else {
            tracing::debug!(lock = %lease.name, holder = %lease.holder, "Released lock");
        }
        Ok(affected > 0)
    }
}

impl SqlCatalog {
    async fn current_holder(&self, name: &str) -> Result<(String, DateTime<Utc>), CatalogError> {
        match self {
            SqlCatalog::Sqlite(pool) => {
                let row = query("SELECT holder, expires_at FROM restore_locks WHERE name = ?")
                    .bind(name)
                    .fetch_one(pool)
                    .await?;
                Ok((
                    row.try_get("holder")?,
                    decode_ts(row.try_get("expires_at")?)?,
                ))
            }
            SqlCatalog::Postgres(pool) => {
                let row = query("SELECT holder, expires_at FROM restore_locks WHERE name = $1")
                    .bind(name)
                    .fetch_one(pool)
                    .await?;
                Ok((row.try_get("holder")?, row.try_get("expires_at")?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESTORE_LOCK: &str = "restore:test";

    #[tokio::test]
    async fn test_second_holder_is_refused() {
        let catalog = SqlCatalog::new_in_memory().await.unwrap();
        let ttl = Duration::from_secs(60);

        let lease = catalog.acquire(RESTORE_LOCK, "alice", ttl).await.unwrap();
        let err = catalog
            .acquire(RESTORE_LOCK, "bob", ttl)
            .await
            .unwrap_err();
        match err {
            CatalogError::LockHeld { holder, .. } => assert_eq!(holder, "alice"),
            other => panic!("unexpected error: {other}"),
        }

        assert!(catalog.release(&lease).await.unwrap());
        catalog.acquire(RESTORE_LOCK, "bob", ttl).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_lease_is_taken_over() {
        let catalog = SqlCatalog::new_in_memory().await.unwrap();

        let stale = catalog
            .acquire(RESTORE_LOCK, "crashed", Duration::ZERO)
            .await
            .unwrap();
        let fresh = catalog
            .acquire(RESTORE_LOCK, "operator", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(fresh.holder, "operator");

        // The stale holder no longer owns the row.
        assert!(!catalog.release(&stale).await.unwrap());
        assert!(catalog.release(&fresh).await.unwrap());
    }

    #[tokio::test]
    async fn test_locks_are_independent_by_name() {
        let catalog = SqlCatalog::new_in_memory().await.unwrap();
        let ttl = Duration::from_secs(60);
        catalog.acquire("a", "x", ttl).await.unwrap();
        catalog.acquire("b", "y", ttl).await.unwrap();
    }
}
