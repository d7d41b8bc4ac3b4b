//! Disaster-recovery restore of a database from a cataloged backup.
//!
//! A restore is a linear pipeline of [`RestoreStage`]s driven by
//! [`RestoreOrchestrator`]. Collaborators sit behind traits so the pipeline
//! can run against the SQL catalog and object storage in production and
//! against in-memory fakes in tests:
//!
//! - [`common::BackupCatalog`] resolves the target record
//! - [`common::BackupStore`] downloads the artifact
//! - [`Confirmation`] gates the destructive step
//! - [`common::RestoreLock`] serializes restores against one database
//! - [`RestoreTool`] applies the dump (`psql` by default)
//! - [`common::AuditLog`] records who restored what

pub mod confirm;
pub mod decompress;
pub mod error;
pub mod integrity;
pub mod orchestrator;
pub mod scratch;
pub mod stage;
pub mod target;
pub mod tool;

pub use confirm::{
    Confirmation, DelayConfirmation, Forced, PromptConfirmation, TokenConfirmation,
    confirmation_for,
};
pub use error::{RestoreError, RestoreFailure};
pub use orchestrator::{RestoreOrchestrator, RestoreOutcome, RestoreServices, lock_name};
pub use scratch::{ScratchCleanup, ScratchDir};
pub use stage::RestoreStage;
pub use target::{EmptySelector, TargetSelector};
pub use tool::{PsqlRestore, RestoreTool};
