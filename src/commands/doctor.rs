use anyhow::{Context, Result};
use common::catalog::SqlCatalog;
use common::cli::utils::{validate_config, version_info};
use common::config::Configuration;
use common::storage::ObjectBackupStore;
use restore::PsqlRestore;
use std::process::ExitCode;

/// One pre-flight check and its verdict.
struct Check {
    name: &'static str,
    result: Result<String>,
}

impl Check {
    fn render(&self) -> String {
        match &self.result {
            Ok(detail) => format!("[ OK ] {:<18} {detail}", self.name),
            Err(e) => format!("[FAIL] {:<18} {e:#}", self.name),
        }
    }
}

pub async fn run(config: &Configuration) -> Result<ExitCode> {
    println!("{}", version_info(env!("CARGO_PKG_NAME")));
    println!();

    let mut checks = vec![Check {
        name: "configuration",
        result: validate_config(config)
            .and_then(|()| config.restore.validate().map_err(Into::into))
            .map(|()| "valid".to_string()),
    }];

    checks.push(Check {
        name: "catalog",
        result: check_catalog(config).await,
    });

    let storage = match config.storage.validate() {
        Ok(()) => check_storage(config).await,
        Err(e) => Err(e.into()),
    };
    checks.push(Check {
        name: "object storage",
        result: storage,
    });

    let tool = PsqlRestore::new(&config.restore.tool);
    checks.push(Check {
        name: "restore tool",
        result: tool
            .version()
            .await
            .with_context(|| format!("'{} --version' failed", tool.program())),
    });

    let mut healthy = true;
    for check in &checks {
        println!("{}", check.render());
        healthy &= check.result.is_ok();
    }

    if healthy {
        println!();
        println!("All checks passed.");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!("One or more pre-flight checks failed");
        Ok(ExitCode::FAILURE)
    }
}

async fn check_catalog(config: &Configuration) -> Result<String> {
    let catalog = SqlCatalog::new(&config.catalog.dsn)
        .await
        .context("connection failed")?;
    let ping = catalog.ping().await.context("ping failed");
    catalog.close().await;
    ping.map(|()| common::config::redact_dsn(&config.catalog.dsn))
}

async fn check_storage(config: &Configuration) -> Result<String> {
    let store = ObjectBackupStore::from_config(&config.storage)?;
    store.probe().await.context("listing failed")?;
    Ok(match &config.storage.url {
        Some(url) => common::config::redact_dsn(url),
        None => format!("bucket {}", config.storage.bucket),
    })
}
