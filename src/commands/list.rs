use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use common::catalog::{BackupCatalog, BackupFilter, SqlCatalog, UsageRow};
use common::cli::utils::format_bytes;
use common::config::Configuration;
use common::model::{BackupRecord, BackupStatus, BackupTier};
use std::process::ExitCode;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show backups of this tier (DAILY, WEEKLY, MONTHLY, MANUAL)
    #[arg(long)]
    pub tier: Option<BackupTier>,

    /// Only show backups in this status
    #[arg(long)]
    pub status: Option<BackupStatus>,

    /// Maximum number of backups to show
    #[arg(long, default_value_t = 20)]
    pub limit: u32,
}

impl ListArgs {
    pub async fn run(self, config: &Configuration) -> Result<ExitCode> {
        let catalog = SqlCatalog::new(&config.catalog.dsn)
            .await
            .context("Failed to connect to the backup catalog")?;

        let filter = BackupFilter {
            tier: self.tier,
            status: self.status,
            limit: self.limit,
        };
        let listing = async {
            let backups = catalog.list_backups(&filter).await?;
            let total = catalog.count_backups(&filter).await?;
            let usage = catalog.usage_summary().await?;
            let last = catalog.latest_completed().await?;
            Ok::<_, common::CatalogError>((backups, total, usage, last))
        }
        .await;
        catalog.close().await;
        let (backups, total, usage, last) = listing.context("Failed to list backups")?;

        println!("Database Backups");
        println!();
        println!("{}", render_filter(&filter));
        println!();
        println!("{}", render_listing(&backups, total));
        println!();
        println!("{}", render_stats(&usage, last.as_ref()));
        println!();
        println!("Usage:");
        println!("  dbvault restore <backup-id>");
        println!("  dbvault restore latest");
        Ok(ExitCode::SUCCESS)
    }
}

fn rule() -> String {
    "-".repeat(41)
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn render_filter(filter: &BackupFilter) -> String {
    let mut lines = vec!["Filters:".to_string()];
    if let Some(tier) = filter.tier {
        lines.push(format!("   Tier:   {tier}"));
    }
    if let Some(status) = filter.status {
        lines.push(format!("   Status: {status}"));
    }
    lines.push(format!("   Limit:  {}", filter.limit));
    lines.join("\n")
}

pub fn render_listing(backups: &[BackupRecord], total: u64) -> String {
    let mut lines = vec![
        rule(),
        format!("Found {total} backup(s) (showing {})", backups.len()),
        rule(),
    ];
    if backups.is_empty() {
        lines.push(String::new());
        lines.push("No backups found.".to_string());
    }

    for (index, backup) in backups.iter().enumerate() {
        lines.push(String::new());
        lines.push(format!("{}. {}", index + 1, backup.filename));
        lines.push(format!("   ID:        {}", backup.id));
        lines.push(format!("   Tier:      {}", backup.tier));
        lines.push(format!("   Status:    {}", backup.status));
        lines.push(format!("   Size:      {}", format_bytes(backup.file_size_bytes)));
        lines.push(format!("   Created:   {}", format_time(&backup.created_at)));
        lines.push(format!("   Started:   {}", format_time(&backup.started_at)));
        if let Some(completed_at) = &backup.completed_at {
            lines.push(format!("   Completed: {}", format_time(completed_at)));
        }
        if let Some(duration) = backup.job_duration() {
            lines.push(format!("   Duration:  {}s", duration.num_seconds()));
        }
        if let Some(checksum) = backup.checksum.as_deref().filter(|_| backup.has_checksum()) {
            let shown: String = checksum.chars().take(16).collect();
            lines.push(format!("   Checksum:  {shown}..."));
        }
        if let Some(error) = &backup.error {
            lines.push(format!("   Error:     {error}"));
        }
    }
    lines.join("\n")
}

/// Catalog-wide statistics: records per status, completed size and the most
/// recent completed backup.
pub fn render_stats(usage: &[UsageRow], last: Option<&BackupRecord>) -> String {
    let mut lines = vec!["Statistics:".to_string(), rule()];

    for status in BackupStatus::ALL {
        let count: u64 = usage
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.count)
            .sum();
        if count > 0 {
            lines.push(format!("   {:<15} {count}", status.as_str()));
        }
    }

    let completed_bytes: u64 = usage
        .iter()
        .filter(|r| r.status == BackupStatus::Completed)
        .map(|r| r.total_bytes)
        .sum();
    lines.push(String::new());
    lines.push(format!("   Total size:     {}", format_bytes(completed_bytes)));
    if let Some(last) = last {
        lines.push(format!("   Last backup:    {}", format_time(&last.created_at)));
        lines.push(format!("   Last tier:      {}", last.tier));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::testing::BackupRecordBuilder;

    #[test]
    fn test_listing_shows_details() {
        let completed = BackupRecordBuilder::new(Utc::now())
            .id("b1")
            .filename("backup-b1.sql.gz")
            .checksum("0123456789abcdef0123456789abcdef")
            .build();
        let failed = BackupRecordBuilder::new(Utc::now())
            .id("b2")
            .status(BackupStatus::Failed)
            .build();

        let text = render_listing(&[completed, failed], 7);
        assert!(text.contains("Found 7 backup(s) (showing 2)"));
        assert!(text.contains("1. backup-b1.sql.gz"));
        assert!(text.contains("Checksum:  0123456789abcdef..."));
        assert!(text.contains("Status:    FAILED"));
        assert!(text.contains("Error:     pg_dump exited with status 1"));
    }

    #[test]
    fn test_empty_listing() {
        let text = render_listing(&[], 0);
        assert!(text.contains("No backups found."));
    }

    #[test]
    fn test_stats_sum_across_tiers() {
        let usage = [
            UsageRow {
                tier: BackupTier::Daily,
                status: BackupStatus::Completed,
                count: 2,
                total_bytes: 1024 * 1024,
            },
            UsageRow {
                tier: BackupTier::Weekly,
                status: BackupStatus::Completed,
                count: 1,
                total_bytes: 1024 * 1024,
            },
            UsageRow {
                tier: BackupTier::Daily,
                status: BackupStatus::Failed,
                count: 4,
                total_bytes: 0,
            },
        ];
        let last = BackupRecordBuilder::new(Utc::now())
            .tier(BackupTier::Weekly)
            .build();

        let text = render_stats(&usage, Some(&last));
        assert!(text.contains("COMPLETED       3"));
        assert!(text.contains("FAILED          4"));
        assert!(!text.contains("PENDING"));
        assert!(text.contains("Total size:     2.00 MB"));
        assert!(text.contains("Last tier:      WEEKLY"));
    }
}
