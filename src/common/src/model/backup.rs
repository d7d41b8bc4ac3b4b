use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Retention class of a backup artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupTier {
    Daily,
    Weekly,
    Monthly,
    Manual,
}

impl BackupTier {
    pub const ALL: [BackupTier; 4] = [
        BackupTier::Daily,
        BackupTier::Weekly,
        BackupTier::Monthly,
        BackupTier::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupTier::Daily => "DAILY",
            BackupTier::Weekly => "WEEKLY",
            BackupTier::Monthly => "MONTHLY",
            BackupTier::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for BackupTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupTier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(BackupTier::Daily),
            "WEEKLY" => Ok(BackupTier::Weekly),
            "MONTHLY" => Ok(BackupTier::Monthly),
            "MANUAL" => Ok(BackupTier::Manual),
            _ => Err(ParseEnumError {
                kind: "backup tier",
                value: s.to_string(),
            }),
        }
    }
}

/// Lifecycle state of a backup record.
///
/// Transitions only move forward: `PENDING → IN_PROGRESS → {COMPLETED, FAILED}`
/// (the creation job may skip `IN_PROGRESS`), and `COMPLETED → DELETED`.
/// Failed records are never transitioned; they are removed from the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Deleted,
}

impl BackupStatus {
    pub const ALL: [BackupStatus; 5] = [
        BackupStatus::Pending,
        BackupStatus::InProgress,
        BackupStatus::Completed,
        BackupStatus::Failed,
        BackupStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Pending => "PENDING",
            BackupStatus::InProgress => "IN_PROGRESS",
            BackupStatus::Completed => "COMPLETED",
            BackupStatus::Failed => "FAILED",
            BackupStatus::Deleted => "DELETED",
        }
    }

    /// Whether moving from `self` to `next` respects the one-directional lifecycle.
    pub fn can_transition_to(&self, next: BackupStatus) -> bool {
        use BackupStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Completed)
                | (Pending, Failed)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Completed, Deleted)
        )
    }

    /// Only completed records point at usable artifact bytes.
    pub fn is_restorable(&self) -> bool {
        matches!(self, BackupStatus::Completed)
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(BackupStatus::Pending),
            "IN_PROGRESS" => Ok(BackupStatus::InProgress),
            "COMPLETED" => Ok(BackupStatus::Completed),
            "FAILED" => Ok(BackupStatus::Failed),
            "DELETED" => Ok(BackupStatus::Deleted),
            _ => Err(ParseEnumError {
                kind: "backup status",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// One catalog row describing a full database dump artifact.
///
/// The artifact bytes live in object storage under `backups/{filename}`; this
/// record only carries metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub filename: String,
    pub tier: BackupTier,
    pub status: BackupStatus,
    /// Size of the compressed artifact. Meaningful for completed or deleted records.
    pub file_size_bytes: u64,
    /// Hex-encoded SHA-256 digest of the compressed artifact.
    pub checksum: Option<String>,
    /// Failure message recorded by the creation job.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl BackupRecord {
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }

    /// Wall-clock duration of the backup job, if it finished.
    pub fn job_duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }

    pub fn has_checksum(&self) -> bool {
        self.checksum
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }
}
