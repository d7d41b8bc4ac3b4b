//! Retention windows per backup tier.
//!
//! Each tier is evaluated only against its own rule. Age is measured from
//! `created_at`; a record is eligible when `created_at < now - max_age`, so a
//! record exactly `max_age` old is kept.

use chrono::{DateTime, Utc};
use common::config::RetentionConfig;
use common::model::{BackupRecord, BackupStatus, BackupTier};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetentionConfigError {
    #[error("invalid retention configuration: {0}")]
    InvalidConfiguration(#[from] common::config::ConfigError),

    #[error("retention window for {rule} is too large: {max_age:?}")]
    WindowOverflow { rule: String, max_age: Duration },

    #[error("retention cutoff underflow for {rule} at {now}")]
    CutoffUnderflow { rule: String, now: DateTime<Utc> },
}

/// Which records a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    Tier(BackupTier),
    /// Every tier; used for failed backups.
    AnyTier,
}

/// What happens to an eligible record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionAction {
    /// Delete the stored artifact, then soft-delete the catalog row.
    DeleteArtifact,
    /// Hard-delete the catalog row; no storage call.
    RemoveRecord,
}

/// A retention rule resolved against a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionRule {
    pub scope: RuleScope,
    pub status: BackupStatus,
    pub max_age: Duration,
    pub cutoff: DateTime<Utc>,
    pub action: RetentionAction,
}

impl RetentionRule {
    /// Label used in logs and reports (`DAILY`, ..., `FAILED`).
    pub fn label(&self) -> &'static str {
        match self.scope {
            RuleScope::Tier(tier) => tier.as_str(),
            RuleScope::AnyTier => self.status.as_str(),
        }
    }

    pub fn tier(&self) -> Option<BackupTier> {
        match self.scope {
            RuleScope::Tier(tier) => Some(tier),
            RuleScope::AnyTier => None,
        }
    }

    pub fn is_eligible(&self, record: &BackupRecord) -> bool {
        let in_scope = match self.scope {
            RuleScope::Tier(tier) => record.tier == tier,
            RuleScope::AnyTier => true,
        };
        in_scope && record.status == self.status && record.created_at < self.cutoff
    }
}

impl fmt::Display for RetentionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (> {}, cutoff {})",
            self.label(),
            humantime::format_duration(self.max_age),
            self.cutoff.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    scope: RuleScope,
    status: BackupStatus,
    max_age: Duration,
    action: RetentionAction,
}

/// Validated retention windows, in processing order: DAILY, WEEKLY, MONTHLY,
/// MANUAL (only when configured), then failed backups.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    windows: Vec<Window>,
}

impl RetentionPolicy {
    pub fn new(config: &RetentionConfig) -> Result<Self, RetentionConfigError> {
        config.validate()?;

        let completed = |tier, max_age| Window {
            scope: RuleScope::Tier(tier),
            status: BackupStatus::Completed,
            max_age,
            action: RetentionAction::DeleteArtifact,
        };

        let mut windows = vec![
            completed(BackupTier::Daily, config.daily),
            completed(BackupTier::Weekly, config.weekly),
            completed(BackupTier::Monthly, config.monthly),
        ];
        if let Some(manual) = config.manual {
            windows.push(completed(BackupTier::Manual, manual));
        }
        windows.push(Window {
            scope: RuleScope::AnyTier,
            status: BackupStatus::Failed,
            max_age: config.failed,
            action: RetentionAction::RemoveRecord,
        });

        Ok(Self { windows })
    }

    /// Resolve every window to a cutoff relative to `now`.
    pub fn rules_at(&self, now: DateTime<Utc>) -> Result<Vec<RetentionRule>, RetentionConfigError> {
        self.windows
            .iter()
            .map(|w| {
                let label = match w.scope {
                    RuleScope::Tier(tier) => tier.to_string(),
                    RuleScope::AnyTier => w.status.to_string(),
                };
                let age = chrono::Duration::from_std(w.max_age).map_err(|_| {
                    RetentionConfigError::WindowOverflow {
                        rule: label.clone(),
                        max_age: w.max_age,
                    }
                })?;
                let cutoff = now
                    .checked_sub_signed(age)
                    .ok_or(RetentionConfigError::CutoffUnderflow { rule: label, now })?;
                Ok(RetentionRule {
                    scope: w.scope,
                    status: w.status,
                    max_age: w.max_age,
                    cutoff,
                    action: w.action,
                })
            })
            .collect()
    }
}
