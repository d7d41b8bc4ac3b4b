//! Test utilities for dbvault.
//!
//! Builders for catalog records and an in-memory [`BackupStore`] that records
//! every call, so tests can assert which artifacts were touched.
//!
//! # Feature Flag
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! [`BackupStore`]: crate::storage::BackupStore

mod record_builder;
mod recording_store;

pub use record_builder::BackupRecordBuilder;
pub use recording_store::RecordingStore;
