use anyhow::{Context, Result};
use clap::Args;
use common::catalog::SqlCatalog;
use common::cli::utils::format_bytes;
use common::config::Configuration;
use common::storage::ObjectBackupStore;
use restore::{
    PsqlRestore, RestoreError, RestoreFailure, RestoreOrchestrator, RestoreOutcome,
    RestoreServices, RestoreStage, ScratchCleanup, TargetSelector, confirmation_for,
};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// `latest` or a backup id
    pub target: TargetSelector,

    /// Recorded in the audit log
    #[arg(default_value = "system")]
    pub actor_id: String,

    /// Skip the interactive confirmation (not valid with token confirmation)
    #[arg(long)]
    pub force: bool,

    /// Approval token, required when `restore.confirmation = "token"`
    #[arg(long, env = "DBVAULT_APPROVAL_TOKEN", hide_env_values = true)]
    pub approval_token: Option<String>,
}

impl RestoreArgs {
    pub async fn run(self, config: &Configuration) -> Result<ExitCode> {
        println!("Database Restore");
        println!("Target: {}", self.target);

        // The S3 client cannot be built without a bucket, so storage settings
        // are checked here and reported as a VALIDATE_CONFIG failure.
        if let Err(e) = config.storage.validate() {
            let failure = RestoreFailure {
                stage: RestoreStage::ValidateConfig,
                error: RestoreError::Config(e),
                cleanup: ScratchCleanup::default(),
            };
            println!("{}", render_failure(&failure));
            return Ok(ExitCode::FAILURE);
        }

        if config.catalog_is_restore_target() {
            tracing::warn!(
                "The backup catalog lives in the database being restored; the restore lock \
                 is lost if the dump recreates the restore_locks table. Point catalog.dsn \
                 at a separate database to keep concurrent restores serialized"
            );
        }

        let catalog = Arc::new(
            SqlCatalog::new(&config.catalog.dsn)
                .await
                .context("Failed to connect to the backup catalog")?,
        );
        let store = Arc::new(
            ObjectBackupStore::from_config(&config.storage)
                .context("Failed to create object store")?,
        );
        let confirmation = match confirmation_for(
            &config.restore,
            self.force,
            self.approval_token.as_deref(),
        ) {
            Ok(confirmation) => confirmation,
            Err(error) => {
                catalog.close().await;
                let failure = RestoreFailure {
                    stage: RestoreStage::ValidateConfig,
                    error,
                    cleanup: ScratchCleanup::default(),
                };
                println!("{}", render_failure(&failure));
                return Ok(ExitCode::FAILURE);
            }
        };

        let services = RestoreServices {
            catalog: catalog.clone(),
            store,
            audit: catalog.clone(),
            lock: catalog.clone(),
            tool: Arc::new(PsqlRestore::new(&config.restore.tool)),
        };
        let orchestrator = RestoreOrchestrator::new(
            services,
            confirmation,
            config.restore.clone(),
            config.storage.clone(),
        );

        let result = orchestrator.run(&self.target, &self.actor_id).await;
        catalog.close().await;

        match result {
            Ok(outcome) => {
                println!("{}", render_success(&outcome));
                Ok(ExitCode::SUCCESS)
            }
            Err(failure) => {
                println!("{}", render_failure(&failure));
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn banner() -> String {
    "=".repeat(60)
}

pub fn render_success(outcome: &RestoreOutcome) -> String {
    let backup = &outcome.backup;
    let mut lines = vec![
        banner(),
        "DATABASE RESTORED SUCCESSFULLY".to_string(),
        banner(),
        format!("   Backup:     {}", backup.filename),
        format!("   ID:         {}", backup.id),
        format!("   Tier:       {}", backup.tier),
        format!(
            "   Created:    {}",
            backup.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        format!("   Downloaded: {}", format_bytes(outcome.bytes_downloaded)),
        format!(
            "   Checksum:   {}",
            if outcome.checksum_verified {
                "verified"
            } else {
                "not recorded (skipped)"
            }
        ),
    ];
    if !outcome.audit_written {
        lines.push("   Audit log:  NOT written (see logs)".to_string());
    }
    if !outcome.cleanup.is_clean() {
        lines.push(format!(
            "   Temp files: {} could not be removed",
            outcome.cleanup.failed.len()
        ));
    }
    lines.push(banner());
    lines.join("\n")
}

pub fn render_failure(failure: &RestoreFailure) -> String {
    let mut lines = vec![banner(), failure.to_string()];
    for (path, error) in &failure.cleanup.failed {
        lines.push(format!(
            "   temp file not removed: {} ({error})",
            path.display()
        ));
    }
    lines.push(banner());
    lines.join("\n")
}
