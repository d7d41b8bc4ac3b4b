//! Tiered retention enforcement for database backup artifacts.
//!
//! ## Architecture
//!
//! - `policy`: per-tier retention windows resolved against an injected `now`
//! - `executor`: sequential cleanup of eligible records with per-record error isolation
//! - `report`: per-tier results and the rendered summary
//! - `metrics`: thread-safe counters mirroring a run
//!
//! ## Usage
//!
//! ```no_run
//! # async fn demo(
//! #     catalog: std::sync::Arc<dyn common::BackupCatalog>,
//! #     store: std::sync::Arc<dyn common::BackupStore>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! use common::config::RetentionConfig;
//! use retention::{CleanupExecutor, RetentionPolicy};
//!
//! let policy = RetentionPolicy::new(&RetentionConfig::default())?;
//! let report = CleanupExecutor::new(catalog, store, policy)
//!     .with_dry_run(true)
//!     .run(chrono::Utc::now())
//!     .await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod metrics;
pub mod policy;
pub mod report;

pub use executor::{CleanupError, CleanupExecutor};
pub use metrics::CleanupMetrics;
pub use policy::{RetentionAction, RetentionConfigError, RetentionPolicy, RetentionRule, RuleScope};
pub use report::{CleanupReport, TierResult};
