pub mod audit;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod lock;
pub mod model;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use audit::AuditLog;
pub use catalog::{BackupCatalog, BackupFilter, CatalogError, SqlCatalog, UsageRow};
pub use lock::{LockLease, RestoreLock};
pub use storage::{BackupStore, ObjectBackupStore, StorageError};
