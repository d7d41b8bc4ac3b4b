//! Data model shared by the cleanup and restore pipelines.

pub mod audit;
pub mod backup;

pub use audit::{AuditAction, AuditLogEntry};
pub use backup::{BackupRecord, BackupStatus, BackupTier, ParseEnumError};
