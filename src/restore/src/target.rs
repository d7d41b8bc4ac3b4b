use common::catalog::BackupCatalog;
use common::model::BackupRecord;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::RestoreError;

/// Which backup to restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    /// The most recent completed backup.
    Latest,
    Id(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("backup selector must be 'latest' or a backup id")]
pub struct EmptySelector;

impl FromStr for TargetSelector {
    type Err = EmptySelector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            Err(EmptySelector)
        } else if s.eq_ignore_ascii_case("latest") {
            Ok(TargetSelector::Latest)
        } else {
            Ok(TargetSelector::Id(s.to_string()))
        }
    }
}

impl fmt::Display for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSelector::Latest => f.write_str("latest"),
            TargetSelector::Id(id) => f.write_str(id),
        }
    }
}

impl TargetSelector {
    /// Resolve to a completed record. Never returns a record in any other status.
    pub async fn resolve(&self, catalog: &dyn BackupCatalog) -> Result<BackupRecord, RestoreError> {
        let record = match self {
            TargetSelector::Latest => catalog
                .latest_completed()
                .await?
                .ok_or(RestoreError::NoCompletedBackup)?,
            TargetSelector::Id(id) => catalog
                .get_backup(id)
                .await?
                .ok_or_else(|| RestoreError::NotFound(id.clone()))?,
        };

        if !record.status.is_restorable() {
            return Err(RestoreError::NotRestorable {
                id: record.id,
                status: record.status,
            });
        }
        Ok(record)
    }
}
