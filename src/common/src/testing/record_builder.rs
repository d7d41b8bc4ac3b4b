use chrono::{DateTime, Duration, SubsecRound, Utc};
use uuid::Uuid;

use crate::model::{BackupRecord, BackupStatus, BackupTier};

/// Builder for [`BackupRecord`] fixtures.
///
/// Defaults to a completed daily backup created at `now`, with a size of one
/// megabyte and no checksum.
#[derive(Clone, Debug)]
pub struct BackupRecordBuilder {
    record: BackupRecord,
}

impl BackupRecordBuilder {
    pub fn new(now: DateTime<Utc>) -> Self {
        // Catalog timestamps carry microsecond precision.
        let now = now.trunc_subsecs(6);
        let id = Uuid::new_v4().to_string();
        Self {
            record: BackupRecord {
                filename: format!("backup-{id}.sql.gz"),
                id,
                tier: BackupTier::Daily,
                status: BackupStatus::Completed,
                file_size_bytes: 1_048_576,
                checksum: None,
                error: None,
                started_at: now,
                completed_at: Some(now),
                created_at: now,
            },
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.record.id = id.to_string();
        self
    }

    pub fn filename(mut self, filename: &str) -> Self {
        self.record.filename = filename.to_string();
        self
    }

    pub fn tier(mut self, tier: BackupTier) -> Self {
        self.record.tier = tier;
        self
    }

    pub fn status(mut self, status: BackupStatus) -> Self {
        self.record.status = status;
        if status == BackupStatus::Failed {
            self.record.file_size_bytes = 0;
            self.record.completed_at = None;
            self.record.error = Some("pg_dump exited with status 1".to_string());
        }
        self
    }

    pub fn size(mut self, bytes: u64) -> Self {
        self.record.file_size_bytes = bytes;
        self
    }

    pub fn checksum(mut self, checksum: &str) -> Self {
        self.record.checksum = Some(checksum.to_string());
        self
    }

    /// Shift every timestamp so the record is `age` old relative to the
    /// builder's `now`.
    pub fn aged(mut self, age: Duration) -> Self {
        self.record.created_at -= age;
        self.record.started_at -= age;
        self.record.completed_at = self.record.completed_at.map(|t| t - age);
        self
    }

    pub fn build(self) -> BackupRecord {
        self.record
    }
}
