use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "dbvault.toml";

const MASK: &str = "****";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration value: {key}")]
    Missing { key: &'static str },
    #[error("invalid configuration value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Connection to the catalog database that holds backup metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// SQLite or PostgreSQL DSN.
    ///
    /// Env: DBVAULT__CATALOG__DSN (or DATABASE_URL)
    pub dsn: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite://.data/dbvault.db"),
        }
    }
}

impl CatalogConfig {
    pub fn in_memory() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
        }
    }
}

/// Object storage holding the compressed artifacts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Optional DSN override (`memory://`, `file:///path`, `s3://key:secret@host/bucket`).
    /// When set, the discrete S3 fields below are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Env: DBVAULT__STORAGE__BUCKET (or AWS_BACKUP_BUCKET / AWS_S3_BUCKET)
    #[serde(default)]
    pub bucket: String,
    /// Env: DBVAULT__STORAGE__REGION (or AWS_REGION)
    pub region: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    /// Custom endpoint for S3-compatible services (R2, MinIO).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Key prefix under which artifacts are stored.
    pub prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: None,
            bucket: String::new(),
            region: String::from("auto"),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            endpoint: None,
            prefix: String::from("backups"),
        }
    }
}

impl StorageConfig {
    /// In-memory store, used by tests and local dry runs.
    pub fn in_memory() -> Self {
        Self {
            url: Some("memory://".to_string()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.url {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: "storage.url",
                    message: "must not be empty when set".to_string(),
                });
            }
            return Ok(());
        }

        if self.bucket.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "storage.bucket",
            });
        }
        if self.access_key_id.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "storage.access_key_id",
            });
        }
        if self.secret_access_key.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "storage.secret_access_key",
            });
        }
        Ok(())
    }
}

/// Retention windows, measured from a record's `created_at`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Env: DBVAULT__RETENTION__DAILY
    #[serde(with = "humantime_serde")]
    pub daily: Duration,
    #[serde(with = "humantime_serde")]
    pub weekly: Duration,
    #[serde(with = "humantime_serde")]
    pub monthly: Duration,
    /// Window after which failed backup rows are hard-deleted.
    #[serde(with = "humantime_serde")]
    pub failed: Duration,
    /// Manual backups never expire unless a window is configured.
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub manual: Option<Duration>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            daily: Duration::from_secs(7 * 24 * 3600),
            weekly: Duration::from_secs(28 * 24 * 3600),
            monthly: Duration::from_secs(365 * 24 * 3600),
            failed: Duration::from_secs(30 * 24 * 3600),
            manual: None,
        }
    }
}

impl RetentionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let windows = [
            ("retention.daily", Some(self.daily)),
            ("retention.weekly", Some(self.weekly)),
            ("retention.monthly", Some(self.monthly)),
            ("retention.failed", Some(self.failed)),
            ("retention.manual", self.manual),
        ];
        for (key, window) in windows {
            if window.is_some_and(|w| w.is_zero()) {
                return Err(ConfigError::Invalid {
                    key,
                    message: "retention window must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// How a restore run obtains the operator's go-ahead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationMode {
    /// Operator types the backup id on an interactive terminal.
    #[default]
    Prompt,
    /// Fixed countdown during which the operator may interrupt the process.
    Delay,
    /// Caller presents the configured approval token.
    Token,
}

impl fmt::Display for ConfirmationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfirmationMode::Prompt => "prompt",
            ConfirmationMode::Delay => "delay",
            ConfirmationMode::Token => "token",
        };
        f.write_str(name)
    }
}

/// External program that replays a plaintext SQL dump.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RestoreToolConfig {
    pub program: String,
    /// Arguments placed before the connection string.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for RestoreToolConfig {
    fn default() -> Self {
        Self {
            program: String::from("psql"),
            args: vec![
                "--quiet".to_string(),
                "-v".to_string(),
                "ON_ERROR_STOP=1".to_string(),
            ],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Connection string of the database being overwritten.
    ///
    /// Env: DBVAULT__RESTORE__DATABASE_URL (or DATABASE_URL)
    #[serde(default)]
    pub database_url: String,
    /// Parent directory for per-run scratch files. Defaults to the OS temp dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub tool: RestoreToolConfig,
    #[serde(default)]
    pub confirmation: ConfirmationMode,
    #[serde(with = "humantime_serde")]
    pub confirm_delay: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_token: Option<String>,
    /// Lease duration of the restore lock; a crashed run frees the lock after this.
    #[serde(with = "humantime_serde")]
    pub lock_ttl: Duration,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            scratch_dir: None,
            tool: RestoreToolConfig::default(),
            confirmation: ConfirmationMode::default(),
            confirm_delay: Duration::from_secs(10),
            approval_token: None,
            lock_ttl: Duration::from_secs(6 * 3600),
        }
    }
}

impl RestoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "restore.database_url",
            });
        }
        if self.tool.program.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "restore.tool.program",
            });
        }
        if self.confirmation == ConfirmationMode::Token
            && self
                .approval_token
                .as_deref()
                .is_none_or(|t| t.trim().is_empty())
        {
            return Err(ConfigError::Missing {
                key: "restore.approval_token",
            });
        }
        if self.lock_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                key: "restore.lock_ttl",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Countdown shown before a live cleanup run that was not started with `--force`.
    #[serde(with = "humantime_serde")]
    pub confirm_delay: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            confirm_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub catalog: CatalogConfig,
    pub storage: StorageConfig,
    pub retention: RetentionConfig,
    pub restore: RestoreConfig,
    pub cleanup: CleanupConfig,
}

impl Configuration {
    /// Layered configuration: defaults, TOML file, deployment env vars, `DBVAULT__` env vars.
    pub fn figment(path: Option<&Path>) -> Figment {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "catalog.dsn".into()))
            .merge(
                Env::raw()
                    .only(&["DATABASE_URL"])
                    .map(|_| "restore.database_url".into()),
            )
            .merge(
                Env::raw()
                    .only(&["AWS_S3_BUCKET"])
                    .map(|_| "storage.bucket".into()),
            )
            .merge(
                Env::raw()
                    .only(&["AWS_BACKUP_BUCKET"])
                    .map(|_| "storage.bucket".into()),
            )
            .merge(
                Env::raw()
                    .only(&["AWS_REGION"])
                    .map(|_| "storage.region".into()),
            )
            .merge(
                Env::raw()
                    .only(&["AWS_ACCESS_KEY_ID"])
                    .map(|_| "storage.access_key_id".into()),
            )
            .merge(
                Env::raw()
                    .only(&["AWS_SECRET_ACCESS_KEY"])
                    .map(|_| "storage.secret_access_key".into()),
            )
            .merge(
                Env::raw()
                    .only(&["AWS_S3_ENDPOINT"])
                    .map(|_| "storage.endpoint".into()),
            )
            .merge(Env::prefixed("DBVAULT__").split("__"))
    }

    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(None)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::load_from(Some(path))
    }

    fn load_from(path: Option<&Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path).extract().map_err(Box::new)
    }

    /// Whether the catalog (and so the restore lease) lives in the database a
    /// restore overwrites. A dump that recreates `restore_locks` drops the lease
    /// mid-restore.
    pub fn catalog_is_restore_target(&self) -> bool {
        let catalog = self.catalog.dsn.trim();
        !catalog.is_empty() && catalog == self.restore.database_url.trim()
    }

    /// Copy of the configuration with credentials masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.catalog.dsn = redact_dsn(&config.catalog.dsn);
        config.restore.database_url = redact_dsn(&config.restore.database_url);
        if let Some(url) = &config.storage.url {
            config.storage.url = Some(redact_dsn(url));
        }
        if !config.storage.secret_access_key.is_empty() {
            config.storage.secret_access_key = MASK.to_string();
        }
        if config.restore.approval_token.is_some() {
            config.restore.approval_token = Some(MASK.to_string());
        }
        config
    }
}

/// Masks the password component of a DSN, leaving unparseable input untouched.
pub fn redact_dsn(dsn: &str) -> String {
    match url::Url::parse(dsn) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some(MASK)).is_ok() {
                url.to_string()
            } else {
                dsn.to_string()
            }
        }
        _ => dsn.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_match_retention_table() {
        let config = Configuration::default();
        assert_eq!(config.retention.daily, Duration::from_secs(7 * 86400));
        assert_eq!(config.retention.weekly, Duration::from_secs(28 * 86400));
        assert_eq!(config.retention.monthly, Duration::from_secs(365 * 86400));
        assert_eq!(config.retention.failed, Duration::from_secs(30 * 86400));
        assert!(config.retention.manual.is_none());
        assert_eq!(config.storage.prefix, "backups");
        assert_eq!(config.storage.region, "auto");
        assert_eq!(config.restore.tool.program, "psql");
        assert_eq!(config.cleanup.confirm_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_configless_operation() {
        Jail::expect_with(|_jail| {
            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.catalog.dsn, "sqlite://.data/dbvault.db");
            assert_eq!(config.restore.confirmation, ConfirmationMode::Prompt);
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_and_prefixed_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "dbvault.toml",
                r#"
                [storage]
                bucket = "from-file"
                region = "eu-west-3"

                [retention]
                daily = "3days"
                manual = "90days"
                "#,
            )?;
            jail.set_env("DBVAULT__STORAGE__BUCKET", "from-env");
            jail.set_env("DBVAULT__RESTORE__CONFIRM_DELAY", "2s");

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.storage.bucket, "from-env");
            assert_eq!(config.storage.region, "eu-west-3");
            assert_eq!(config.retention.daily, Duration::from_secs(3 * 86400));
            assert_eq!(config.retention.manual, Some(Duration::from_secs(90 * 86400)));
            assert_eq!(config.restore.confirm_delay, Duration::from_secs(2));
            Ok(())
        });
    }

    #[test]
    fn test_deployment_env_vars_are_mapped() {
        Jail::expect_with(|jail| {
            jail.set_env("DATABASE_URL", "postgres://app:pw@db/app");
            jail.set_env("AWS_S3_BUCKET", "generic-bucket");
            jail.set_env("AWS_BACKUP_BUCKET", "backup-bucket");
            jail.set_env("AWS_ACCESS_KEY_ID", "AKIAEXAMPLE");
            jail.set_env("AWS_SECRET_ACCESS_KEY", "secretvalue");
            jail.set_env("AWS_S3_ENDPOINT", "https://r2.example.com");

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.restore.database_url, "postgres://app:pw@db/app");
            assert_eq!(config.catalog.dsn, "postgres://app:pw@db/app");
            assert_eq!(config.storage.bucket, "backup-bucket");
            assert_eq!(config.storage.access_key_id, "AKIAEXAMPLE");
            assert_eq!(config.storage.secret_access_key, "secretvalue");
            assert_eq!(
                config.storage.endpoint.as_deref(),
                Some("https://r2.example.com")
            );
            assert!(config.storage.validate().is_ok());
            assert!(config.catalog_is_restore_target());
            Ok(())
        });
    }

    #[test]
    fn test_separate_catalog_is_not_restore_target() {
        let mut config = Configuration::default();
        config.catalog.dsn = "postgres://ops@control/catalog".to_string();
        config.restore.database_url = "postgres://app@db/app".to_string();
        assert!(!config.catalog_is_restore_target());

        config.restore.database_url = " postgres://ops@control/catalog".to_string();
        assert!(config.catalog_is_restore_target());
    }

    #[test]
    fn test_explicit_config_path() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[catalog]\ndsn = \"sqlite::memory:\"\n")?;
            let config = Configuration::load_from_path(Path::new("custom.toml")).map_err(|e| *e)?;
            assert_eq!(config.catalog.dsn, "sqlite::memory:");
            Ok(())
        });
    }

    #[test]
    fn test_storage_validation_names_missing_key() {
        let mut storage = StorageConfig::default();
        assert_eq!(
            storage.validate(),
            Err(ConfigError::Missing {
                key: "storage.bucket"
            })
        );

        storage.bucket = "bucket".to_string();
        assert_eq!(
            storage.validate(),
            Err(ConfigError::Missing {
                key: "storage.access_key_id"
            })
        );

        storage.access_key_id = "key".to_string();
        assert_eq!(
            storage.validate(),
            Err(ConfigError::Missing {
                key: "storage.secret_access_key"
            })
        );

        storage.secret_access_key = "secret".to_string();
        assert!(storage.validate().is_ok());
        assert!(StorageConfig::in_memory().validate().is_ok());
    }

    #[test]
    fn test_restore_validation() {
        let mut restore = RestoreConfig::default();
        assert_eq!(
            restore.validate(),
            Err(ConfigError::Missing {
                key: "restore.database_url"
            })
        );

        restore.database_url = "postgres://localhost/app".to_string();
        assert!(restore.validate().is_ok());

        restore.confirmation = ConfirmationMode::Token;
        assert_eq!(
            restore.validate(),
            Err(ConfigError::Missing {
                key: "restore.approval_token"
            })
        );
        restore.approval_token = Some("let-me-in".to_string());
        assert!(restore.validate().is_ok());
    }

    #[test]
    fn test_retention_rejects_zero_windows() {
        let retention = RetentionConfig {
            weekly: Duration::ZERO,
            ..RetentionConfig::default()
        };
        let err = retention.validate().unwrap_err();
        assert!(err.to_string().contains("retention.weekly"));
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let mut config = Configuration::default();
        config.restore.database_url = "postgres://app:hunter2@db:5432/app".to_string();
        config.storage.secret_access_key = "very-secret".to_string();
        config.restore.approval_token = Some("token".to_string());

        let redacted = config.redacted();
        assert_eq!(
            redacted.restore.database_url,
            "postgres://app:****@db:5432/app"
        );
        assert_eq!(redacted.storage.secret_access_key, "****");
        assert_eq!(redacted.restore.approval_token.as_deref(), Some("****"));
        assert_eq!(redacted.catalog.dsn, config.catalog.dsn);
    }
}
