use common::catalog::CatalogError;
use common::config::ConfigError;
use common::model::BackupStatus;
use common::storage::StorageError;
use std::fmt;
use thiserror::Error;

use crate::scratch::ScratchCleanup;
use crate::stage::RestoreStage;

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no completed backup found")]
    NoCompletedBackup,

    #[error("backup not found: {0}")]
    NotFound(String),

    #[error("backup {id} is not restorable: status is {status}")]
    NotRestorable { id: String, status: BackupStatus },

    #[error("restore was not confirmed: {0}")]
    NotConfirmed(String),

    #[error("failed to download backup: {0}")]
    Storage(#[from] StorageError),

    #[error("checksum mismatch: expected {expected}, actual {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("failed to read backup artifact: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to decompress backup: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("scratch directory error: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("could not acquire restore lock: {0}")]
    Lock(#[source] CatalogError),

    #[error("failed to start restore tool '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("restore tool exited with {status}: {stderr}")]
    ToolFailed { status: String, stderr: String },

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// A failed run: the stage that failed, why, and what temp-file cleanup did
/// afterwards.
#[derive(Debug)]
pub struct RestoreFailure {
    pub stage: RestoreStage,
    pub error: RestoreError,
    pub cleanup: ScratchCleanup,
}

impl fmt::Display for RestoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RESTORE FAILED at {}: {}", self.stage, self.error)
    }
}

impl std::error::Error for RestoreFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
