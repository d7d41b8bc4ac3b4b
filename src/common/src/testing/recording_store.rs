use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use crate::storage::{BackupStore, StorageError};

#[derive(Default)]
struct State {
    objects: HashMap<String, Vec<u8>>,
    downloads: Vec<String>,
    deletes: Vec<String>,
    failing: HashSet<String>,
}

/// In-memory [`BackupStore`] that records calls and can be told to fail for
/// specific filenames.
#[derive(Default)]
pub struct RecordingStore {
    state: Mutex<State>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, filename: &str, bytes: impl Into<Vec<u8>>) {
        self.lock().objects.insert(filename.to_string(), bytes.into());
    }

    /// Every later call touching `filename` fails with an I/O error.
    pub fn fail_on(&self, filename: &str) {
        self.lock().failing.insert(filename.to_string());
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.lock().objects.contains_key(filename)
    }

    pub fn downloads(&self) -> Vec<String> {
        self.lock().downloads.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.lock().deletes.clone()
    }

    pub fn call_count(&self) -> usize {
        let state = self.lock();
        state.downloads.len() + state.deletes.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn injected(filename: &str) -> StorageError {
        StorageError::Io(std::io::Error::other(format!(
            "injected failure for {filename}"
        )))
    }
}

#[async_trait]
impl BackupStore for RecordingStore {
    async fn download(&self, filename: &str, dest: &Path) -> Result<u64, StorageError> {
        let bytes = {
            let mut state = self.lock();
            state.downloads.push(filename.to_string());
            if state.failing.contains(filename) {
                return Err(Self::injected(filename));
            }
            match state.objects.get(filename) {
                Some(bytes) => bytes.clone(),
                None => {
                    return Err(StorageError::ObjectStore(object_store::Error::NotFound {
                        path: filename.to_string(),
                        source: "no such object".into(),
                    }));
                }
            }
        };
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    async fn delete(&self, filename: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.deletes.push(filename.to_string());
        if state.failing.contains(filename) {
            return Err(Self::injected(filename));
        }
        state.objects.remove(filename);
        Ok(())
    }
}
