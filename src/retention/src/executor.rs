//! Cleanup Executor
//!
//! Walks the retention rules in order (DAILY, WEEKLY, MONTHLY, optional MANUAL,
//! then FAILED) and removes every eligible record, one at a time.
//!
//! ## Safety Guarantees
//!
//! - Dry-run mode touches neither storage nor the catalog
//! - A failed deletion is recorded and skipped; the batch always continues
//! - A tier whose listing fails is reported; the remaining tiers still run
//! - Freed bytes are only counted after both storage and catalog succeed
//! - Failed backups are removed from the catalog only; no storage call is made

use chrono::{DateTime, Utc};
use common::catalog::{BackupCatalog, CatalogError};
use common::model::BackupRecord;
use common::storage::BackupStore;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::metrics::CleanupMetrics;
use crate::policy::{RetentionAction, RetentionConfigError, RetentionPolicy, RetentionRule};
use crate::report::{CleanupReport, TierResult};

/// Errors that stop a cleanup run before any tier is processed. Listing and
/// per-record failures are recorded on the report instead.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error(transparent)]
    Policy(#[from] RetentionConfigError),
}

pub struct CleanupExecutor {
    catalog: Arc<dyn BackupCatalog>,
    store: Arc<dyn BackupStore>,
    policy: RetentionPolicy,
    dry_run: bool,
    metrics: CleanupMetrics,
}

impl CleanupExecutor {
    pub fn new(
        catalog: Arc<dyn BackupCatalog>,
        store: Arc<dyn BackupStore>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            catalog,
            store,
            policy,
            dry_run: false,
            metrics: CleanupMetrics::new(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_metrics(mut self, metrics: CleanupMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &CleanupMetrics {
        &self.metrics
    }

    /// Run every retention rule relative to `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<CleanupReport, CleanupError> {
        let started_at = Utc::now();
        let rules = self.policy.rules_at(now)?;

        info!(
            dry_run = self.dry_run,
            rules = rules.len(),
            now = %now,
            "Starting backup cleanup run"
        );

        let mut tiers = Vec::with_capacity(rules.len());
        for rule in &rules {
            tiers.push(self.apply_rule(rule).await);
        }

        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;
        self.metrics.record_duration_ms(duration_ms);

        let report = CleanupReport {
            dry_run: self.dry_run,
            started_at,
            completed_at,
            tiers,
        };

        info!(
            dry_run = self.dry_run,
            total_deleted = report.total_deleted(),
            total_failed = report.total_failed(),
            space_freed_bytes = report.total_space_freed(),
            duration_ms,
            "Backup cleanup run completed"
        );

        Ok(report)
    }

    async fn apply_rule(&self, rule: &RetentionRule) -> TierResult {
        info!(rule = %rule, "Evaluating retention rule");

        let mut candidates = match self
            .catalog
            .list_expired(rule.tier(), rule.status, rule.cutoff)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(
                    rule = rule.label(),
                    error = %e,
                    "Failed to list expired backups, skipping tier"
                );
                return TierResult::listing_failed(rule.label(), listing_message(&e));
            }
        };
        // A record is only ever judged by the rule for its own tier.
        candidates.retain(|record| rule.is_eligible(record));

        info!(
            rule = rule.label(),
            candidates = candidates.len(),
            "Found backups eligible for cleanup"
        );
        self.metrics.record_evaluated(candidates.len());

        let mut result = TierResult::new(rule.label(), candidates.len());
        for record in &candidates {
            match rule.action {
                RetentionAction::DeleteArtifact => self.delete_artifact(record, &mut result).await,
                RetentionAction::RemoveRecord => self.remove_record(record, &mut result).await,
            }
        }

        if result.failed > 0 {
            warn!(
                rule = rule.label(),
                deleted = result.deleted,
                failed = result.failed,
                "Some backups could not be deleted"
            );
        }
        result
    }

    async fn delete_artifact(&self, record: &BackupRecord, result: &mut TierResult) {
        if self.dry_run {
            info!(
                backup_id = %record.id,
                filename = %record.filename,
                size_bytes = record.file_size_bytes,
                created_at = %record.created_at.to_rfc3339(),
                "[DRY RUN] Would delete backup"
            );
            self.count_deleted(record.file_size_bytes, result);
            return;
        }

        info!(
            backup_id = %record.id,
            filename = %record.filename,
            size_bytes = record.file_size_bytes,
            created_at = %record.created_at.to_rfc3339(),
            "Deleting backup"
        );

        if let Err(e) = self.store.delete(&record.filename).await {
            warn!(
                backup_id = %record.id,
                filename = %record.filename,
                error = %e,
                "Failed to delete backup artifact"
            );
            self.count_failed(record, e.to_string(), result);
            return;
        }

        if let Err(e) = self.catalog.mark_deleted(&record.id).await {
            warn!(
                backup_id = %record.id,
                filename = %record.filename,
                error = %e,
                "Artifact deleted but catalog update failed"
            );
            self.count_failed(record, e.to_string(), result);
            return;
        }

        // Only accumulate bytes after both steps succeeded
        self.count_deleted(record.file_size_bytes, result);
    }

    async fn remove_record(&self, record: &BackupRecord, result: &mut TierResult) {
        if self.dry_run {
            info!(
                backup_id = %record.id,
                tier = %record.tier,
                created_at = %record.created_at.to_rfc3339(),
                "[DRY RUN] Would remove failed backup record"
            );
            self.count_deleted(0, result);
            return;
        }

        match self.catalog.delete_failed(&record.id).await {
            Ok(()) => {
                info!(
                    backup_id = %record.id,
                    tier = %record.tier,
                    "Removed failed backup record"
                );
                self.count_deleted(0, result);
            }
            Err(e) => {
                warn!(
                    backup_id = %record.id,
                    error = %e,
                    "Failed to remove failed backup record"
                );
                self.count_failed(record, e.to_string(), result);
            }
        }
    }

    fn count_deleted(&self, bytes: u64, result: &mut TierResult) {
        result.deleted += 1;
        result.space_freed_bytes += bytes;
        self.metrics.record_deleted();
        if bytes > 0 {
            self.metrics.record_bytes_freed(bytes);
        }
    }

    fn count_failed(&self, record: &BackupRecord, message: String, result: &mut TierResult) {
        result.failed += 1;
        result.failures.push((record.id.clone(), message));
        self.metrics.record_failed();
    }
}

fn listing_message(error: &CatalogError) -> String {
    format!("failed to list expired backups: {error}")
}
