use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use common::catalog::{BackupCatalog, SqlCatalog, UsageRow};
use common::cli::utils::{format_bytes, validate_config};
use common::config::Configuration;
use common::model::{BackupStatus, BackupTier};
use common::storage::ObjectBackupStore;
use retention::{CleanupExecutor, CleanupMetrics, RetentionPolicy};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Report what would be deleted without touching storage or the catalog
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the warning countdown before a live run
    #[arg(long)]
    pub force: bool,
}

impl CleanupArgs {
    pub async fn run(self, config: &Configuration) -> Result<ExitCode> {
        validate_config(config).context("Configuration validation failed")?;
        let policy = RetentionPolicy::new(&config.retention)?;

        let catalog = Arc::new(
            SqlCatalog::new(&config.catalog.dsn)
                .await
                .context("Failed to connect to the backup catalog")?,
        );
        let store = Arc::new(
            ObjectBackupStore::from_config(&config.storage)
                .context("Failed to create object store")?,
        );

        println!("Database Backup Cleanup");
        if self.dry_run {
            println!("DRY RUN MODE - No backups will be deleted");
        }

        let usage = catalog
            .usage_summary()
            .await
            .context("Failed to read catalog usage")?;
        println!();
        println!("{}", render_usage(&usage));

        if !self.dry_run && !self.force {
            let delay = config.cleanup.confirm_delay;
            tracing::warn!("This will permanently delete old backups");
            tracing::warn!(
                "Use --dry-run to preview what will be deleted, or --force to skip this warning"
            );
            tracing::warn!(
                "Press Ctrl+C to cancel, or wait {}s to continue...",
                delay.as_secs()
            );
            tokio::time::sleep(delay).await;
        }

        let metrics = CleanupMetrics::new();
        let executor = CleanupExecutor::new(catalog.clone(), store, policy)
            .with_dry_run(self.dry_run)
            .with_metrics(metrics.clone());
        let result = executor.run(Utc::now()).await;
        catalog.close().await;
        let report = result.context("Cleanup run aborted")?;

        tracing::info!(
            evaluated = metrics.records_evaluated(),
            deleted = metrics.records_deleted(),
            failed = metrics.records_failed(),
            bytes_freed = metrics.bytes_freed(),
            duration_ms = metrics.total_duration_ms(),
            "Cleanup finished"
        );

        println!();
        println!("{report}");
        // Listing and per-record failures are reported, not escalated.
        Ok(ExitCode::SUCCESS)
    }
}

/// Completed backups per tier, as shown before a cleanup run.
pub fn render_usage(rows: &[UsageRow]) -> String {
    let mut lines = vec![
        "Current Backup Statistics:".to_string(),
        "-".repeat(41),
    ];
    let mut total = 0u64;
    for tier in BackupTier::ALL {
        let (count, bytes) = rows
            .iter()
            .filter(|r| r.tier == tier && r.status == BackupStatus::Completed)
            .fold((0u64, 0u64), |(c, b), r| (c + r.count, b + r.total_bytes));
        if count == 0 {
            continue;
        }
        total += bytes;
        lines.push(format!(
            "   {:<10} {count} backup(s), {}",
            tier.as_str(),
            format_bytes(bytes)
        ));
    }
    lines.push(String::new());
    lines.push(format!("   Total: {}", format_bytes(total)));
    lines.join("\n")
}
