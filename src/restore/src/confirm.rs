//! Gate in front of the destructive part of a restore.
//!
//! The operator chooses the strategy: an explicit `--force`, a fixed grace
//! delay, typing the backup id at a prompt, or a pre-shared approval token.

use async_trait::async_trait;
use common::config::{ConfirmationMode, RestoreConfig};
use common::model::BackupRecord;
use sha2::{Digest, Sha256};
use std::io::IsTerminal;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use crate::error::RestoreError;

#[async_trait]
pub trait Confirmation: Send + Sync {
    /// `Ok(())` lets the restore proceed. Anything else aborts it.
    async fn confirm(&self, backup: &BackupRecord) -> Result<(), RestoreError>;
}

fn warn_destructive(backup: &BackupRecord) {
    tracing::warn!(
        backup_id = %backup.id,
        filename = %backup.filename,
        "This will OVERWRITE the current database. The operation cannot be undone"
    );
}

/// `--force`: proceed without asking.
#[derive(Debug, Default)]
pub struct Forced;

#[async_trait]
impl Confirmation for Forced {
    async fn confirm(&self, backup: &BackupRecord) -> Result<(), RestoreError> {
        tracing::warn!(backup_id = %backup.id, "Confirmation skipped (--force)");
        Ok(())
    }
}

/// Warn, then wait so an operator can interrupt the process.
#[derive(Debug)]
pub struct DelayConfirmation {
    delay: Duration,
}

impl DelayConfirmation {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Confirmation for DelayConfirmation {
    async fn confirm(&self, backup: &BackupRecord) -> Result<(), RestoreError> {
        warn_destructive(backup);
        tracing::warn!(
            "Press Ctrl+C to cancel, or wait {}s to continue...",
            self.delay.as_secs()
        );
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// The operator must type the backup id.
pub struct PromptConfirmation {
    input: Mutex<Box<dyn AsyncBufRead + Send + Unpin>>,
    interactive: bool,
}

impl PromptConfirmation {
    /// Reads from stdin. Refuses when stdin is not a terminal.
    pub fn stdin() -> Self {
        Self {
            input: Mutex::new(Box::new(BufReader::new(tokio::io::stdin()))),
            interactive: std::io::stdin().is_terminal(),
        }
    }

    pub fn from_reader(reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self {
            input: Mutex::new(Box::new(reader)),
            interactive: true,
        }
    }
}

#[async_trait]
impl Confirmation for PromptConfirmation {
    async fn confirm(&self, backup: &BackupRecord) -> Result<(), RestoreError> {
        if !self.interactive {
            return Err(RestoreError::NotConfirmed(
                "stdin is not a terminal; re-run with --force or use token confirmation"
                    .to_string(),
            ));
        }

        warn_destructive(backup);
        eprint!("Type the backup id ({}) to confirm: ", backup.id);

        let mut line = String::new();
        let mut input = self.input.lock().await;
        input
            .read_line(&mut line)
            .await
            .map_err(|e| RestoreError::NotConfirmed(format!("failed to read confirmation: {e}")))?;

        if line.trim() == backup.id {
            Ok(())
        } else {
            Err(RestoreError::NotConfirmed(
                "typed id does not match the backup".to_string(),
            ))
        }
    }
}

/// A supplied approval token must match the configured one.
#[derive(Debug)]
pub struct TokenConfirmation {
    expected: [u8; 32],
    supplied: Option<[u8; 32]>,
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

/// Equal-time comparison of two digests.
fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl TokenConfirmation {
    pub fn new(expected: &str, supplied: Option<&str>) -> Self {
        Self {
            expected: digest(expected),
            supplied: supplied.map(digest),
        }
    }
}

#[async_trait]
impl Confirmation for TokenConfirmation {
    async fn confirm(&self, backup: &BackupRecord) -> Result<(), RestoreError> {
        let Some(supplied) = &self.supplied else {
            return Err(RestoreError::NotConfirmed(
                "an approval token is required (--approval-token)".to_string(),
            ));
        };
        if !digests_match(&self.expected, supplied) {
            return Err(RestoreError::NotConfirmed(
                "approval token rejected".to_string(),
            ));
        }
        warn_destructive(backup);
        tracing::info!(backup_id = %backup.id, "Restore approved by token");
        Ok(())
    }
}

/// Pick the confirmation strategy for a run.
///
/// `--force` skips prompt and delay modes but never bypasses token mode.
pub fn confirmation_for(
    config: &RestoreConfig,
    force: bool,
    approval_token: Option<&str>,
) -> Result<Box<dyn Confirmation>, RestoreError> {
    match config.confirmation {
        ConfirmationMode::Token => {
            let expected = config
                .approval_token
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or(common::config::ConfigError::Missing {
                    key: "restore.approval_token",
                })?;
            Ok(Box::new(TokenConfirmation::new(expected, approval_token)))
        }
        _ if force => Ok(Box::new(Forced)),
        ConfirmationMode::Delay => Ok(Box::new(DelayConfirmation::new(config.confirm_delay))),
        ConfirmationMode::Prompt => Ok(Box::new(PromptConfirmation::stdin())),
    }
}
