use clap::Parser;
use std::path::PathBuf;

/// CLI arguments shared by every dbvault subcommand
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(
        short,
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Enable quiet mode (warnings and errors only)"
    )]
    pub quiet: bool,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Default filter directive for the given flags. `RUST_LOG` overrides it.
    pub fn log_directive(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments.
    ///
    /// Logs go to stderr so that reports and listings on stdout stay clean.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_directive(args)));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format. Secrets are masked.
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        println!("{}", render_config(config, json)?);
        Ok(())
    }

    pub fn render_config(config: &Configuration, json: bool) -> Result<String> {
        let config = config.redacted();
        if json {
            return serde_json::to_string_pretty(&config)
                .context("Failed to serialize configuration to JSON");
        }

        let retention = &config.retention;
        let mut lines = vec![
            "dbvault Configuration:".to_string(),
            "======================".to_string(),
            format!("Catalog DSN: {}", config.catalog.dsn),
        ];
        match &config.storage.url {
            Some(url) => lines.push(format!("Storage URL: {url}")),
            None => {
                lines.push(format!("Storage bucket: {}", config.storage.bucket));
                lines.push(format!("Storage region: {}", config.storage.region));
                lines.push(format!(
                    "Storage endpoint: {}",
                    config.storage.endpoint.as_deref().unwrap_or("(default)")
                ));
            }
        }
        lines.push(format!("Storage prefix: {}", config.storage.prefix));
        lines.push(format!(
            "Retention: daily {}, weekly {}, monthly {}, failed {}, manual {}",
            humantime::format_duration(retention.daily),
            humantime::format_duration(retention.weekly),
            humantime::format_duration(retention.monthly),
            humantime::format_duration(retention.failed),
            retention
                .manual
                .map(|d| humantime::format_duration(d).to_string())
                .unwrap_or_else(|| "never".to_string()),
        ));
        lines.push(format!("Restore target: {}", config.restore.database_url));
        lines.push(format!(
            "Restore tool: {} {}",
            config.restore.tool.program,
            config.restore.tool.args.join(" ")
        ));
        lines.push(format!(
            "Restore confirmation: {}",
            config.restore.confirmation
        ));
        lines.push(format!(
            "Restore scratch dir: {}",
            config.restore.scratch_root().display()
        ));
        Ok(lines.join("\n"))
    }

    /// Validate the sections every command needs and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        tracing::debug!("Validating configuration...");

        if config.catalog.dsn.trim().is_empty() {
            anyhow::bail!("Catalog DSN cannot be empty");
        }
        config.storage.validate()?;
        config.retention.validate()?;

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Human-readable byte count (`1.91 MB`).
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
        if bytes < 1024 {
            return format!("{bytes} B");
        }
        let mut value = bytes as f64;
        let mut unit = 0;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }
        format!("{value:.2} {}", UNITS[unit])
    }

    /// Standard version information
    pub fn version_info(program: &str) -> String {
        format!(
            "{program} {} (rust {})",
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::utils::*;
    use super::*;
    use crate::config::{Configuration, StorageConfig};

    #[test]
    fn test_log_directive_follows_flags() {
        let mut args = CommonArgs::default();
        assert_eq!(log_directive(&args), "info");
        args.verbose = true;
        assert_eq!(log_directive(&args), "debug");
        args.verbose = false;
        args.quiet = true;
        assert_eq!(log_directive(&args), "warn");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(2_000_000), "1.91 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.00 GB");
    }

    #[test]
    fn test_render_config_masks_secrets() {
        let mut config = Configuration::default();
        config.catalog.dsn = "postgres://app:hunter2@db:5432/app".to_string();
        config.storage.secret_access_key = "very-secret".to_string();

        let text = render_config(&config, false).unwrap();
        assert!(text.contains("Catalog DSN: postgres://app:****@db:5432/app"));
        assert!(!text.contains("hunter2"));

        let json = render_config(&config, true).unwrap();
        assert!(!json.contains("very-secret"));
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_validate_config_requires_storage() {
        let config = Configuration::default();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("storage.bucket"));

        let config = Configuration {
            storage: StorageConfig::in_memory(),
            ..Configuration::default()
        };
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_version_info() {
        let version = version_info("dbvault");
        assert!(version.starts_with("dbvault "));
        assert!(version.contains(env!("CARGO_PKG_VERSION")));
    }
}
