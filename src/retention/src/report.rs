use chrono::{DateTime, Utc};
use common::cli::utils::format_bytes;
use std::fmt;

/// Outcome of one retention rule.
///
/// In dry-run `deleted` counts would-be deletions and `space_freed_bytes` is
/// what a live run would free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierResult {
    pub label: &'static str,
    pub candidates: usize,
    pub deleted: usize,
    pub failed: usize,
    pub space_freed_bytes: u64,
    /// `(backup id, error message)` for every record that could not be removed.
    pub failures: Vec<(String, String)>,
    /// Set when the tier's candidates could not be listed at all.
    pub listing_error: Option<String>,
}

impl TierResult {
    pub fn new(label: &'static str, candidates: usize) -> Self {
        Self {
            label,
            candidates,
            deleted: 0,
            failed: 0,
            space_freed_bytes: 0,
            failures: Vec::new(),
            listing_error: None,
        }
    }

    pub fn listing_failed(label: &'static str, error: String) -> Self {
        Self {
            listing_error: Some(error),
            ..Self::new(label, 0)
        }
    }
}

/// Aggregate result of a cleanup run.
#[derive(Debug, Clone)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub tiers: Vec<TierResult>,
}

impl CleanupReport {
    pub fn tier(&self, label: &str) -> Option<&TierResult> {
        self.tiers.iter().find(|t| t.label == label)
    }

    pub fn total_candidates(&self) -> usize {
        self.tiers.iter().map(|t| t.candidates).sum()
    }

    pub fn total_deleted(&self) -> usize {
        self.tiers.iter().map(|t| t.deleted).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.tiers.iter().map(|t| t.failed).sum()
    }

    pub fn total_space_freed(&self) -> u64 {
        self.tiers.iter().map(|t| t.space_freed_bytes).sum()
    }

    /// Whether any record or tier listing failed.
    pub fn has_errors(&self) -> bool {
        self.tiers
            .iter()
            .any(|t| t.failed > 0 || t.listing_error.is_some())
    }
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        let verb = if self.dry_run {
            "to delete"
        } else {
            "deleted"
        };

        writeln!(f, "{rule}")?;
        if self.dry_run {
            writeln!(f, "CLEANUP SUMMARY (DRY RUN)")?;
        } else {
            writeln!(f, "CLEANUP SUMMARY")?;
        }
        writeln!(f, "{rule}")?;
        writeln!(f)?;

        for tier in &self.tiers {
            let label = format!("{} backups {verb}:", tier.label);
            write!(f, "   {label:<28} {}", tier.deleted)?;
            if tier.failed > 0 {
                write!(f, " ({} failed)", tier.failed)?;
            }
            if tier.listing_error.is_some() {
                write!(f, " (not evaluated)")?;
            }
            writeln!(f)?;
        }

        let total_label = format!("Total backups {verb}:");
        writeln!(f)?;
        writeln!(f, "   {total_label:<28} {}", self.total_deleted())?;
        if self.total_failed() > 0 {
            writeln!(f, "   {:<28} {}", "Failed deletions:", self.total_failed())?;
        }
        let freed = self.total_space_freed();
        let freed_label = if self.dry_run {
            "Would free:"
        } else {
            "Space freed:"
        };
        writeln!(
            f,
            "   {freed_label:<28} {} ({freed} bytes)",
            format_bytes(freed)
        )?;
        writeln!(f)?;
        writeln!(f, "{rule}")?;

        if self.dry_run {
            writeln!(f, "This was a DRY RUN. No backups were actually deleted.")?;
            writeln!(f, "Run without --dry-run to perform the cleanup.")?;
            self.write_failures(f)?;
        } else if self.has_errors() {
            writeln!(f, "Cleanup finished with failures:")?;
            self.write_failures(f)?;
        } else {
            writeln!(f, "Cleanup completed successfully.")?;
        }
        write!(f, "{rule}")
    }
}

impl CleanupReport {
    fn write_failures(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tier in &self.tiers {
            if let Some(error) = &tier.listing_error {
                writeln!(f, "   [{}] {error}", tier.label)?;
            }
            for (id, error) in &tier.failures {
                writeln!(f, "   [{}] {id}: {error}", tier.label)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(dry_run: bool) -> CleanupReport {
        let mut daily = TierResult::new("DAILY", 2);
        daily.deleted = 1;
        daily.failed = 1;
        daily.space_freed_bytes = 2_000_000;
        daily.failures.push(("b2".to_string(), "access denied".to_string()));

        let mut failed = TierResult::new("FAILED", 1);
        failed.deleted = 1;

        CleanupReport {
            dry_run,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            tiers: vec![daily, TierResult::new("WEEKLY", 0), failed],
        }
    }

    #[test]
    fn test_totals() {
        let report = report(false);
        assert_eq!(report.total_candidates(), 3);
        assert_eq!(report.total_deleted(), 2);
        assert_eq!(report.total_failed(), 1);
        assert_eq!(report.total_space_freed(), 2_000_000);
        assert_eq!(report.tier("WEEKLY").unwrap().candidates, 0);
        assert!(report.tier("MONTHLY").is_none());
    }

    #[test]
    fn test_live_summary_lists_failures() {
        let text = report(false).to_string();
        assert!(text.contains("CLEANUP SUMMARY\n"));
        assert!(text.contains("Space freed:"));
        assert!(text.contains("1.91 MB (2000000 bytes)"));
        assert!(text.contains("[DAILY] b2: access denied"));
        assert!(!text.contains("DRY RUN"));
    }

    #[test]
    fn test_dry_run_summary_has_banner() {
        let text = report(true).to_string();
        assert!(text.contains("CLEANUP SUMMARY (DRY RUN)"));
        assert!(text.contains("Would free:"));
        assert!(text.contains("This was a DRY RUN"));
    }

    #[test]
    fn test_listing_failure_is_reported() {
        let mut report = report(false);
        report.tiers[1] =
            TierResult::listing_failed("WEEKLY", "failed to list expired backups: timeout".to_string());

        assert!(report.has_errors());
        let text = report.to_string();
        assert!(text.contains("(not evaluated)"));
        assert!(text.contains("[WEEKLY] failed to list expired backups: timeout"));
        assert!(text.contains("Cleanup finished with failures:"));
    }
}
