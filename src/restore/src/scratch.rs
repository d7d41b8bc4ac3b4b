use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// What temp-file cleanup did. Failures are reported, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScratchCleanup {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl ScratchCleanup {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Per-run scratch directory `dbvault-restore-<uuid>`. Every path handed out
/// is tracked so cleanup can remove it whatever the outcome of the run.
#[derive(Debug)]
pub struct ScratchDir {
    root: PathBuf,
    tracked: Vec<PathBuf>,
    created: bool,
}

impl ScratchDir {
    pub fn new(base: &Path) -> Self {
        Self {
            root: base.join(format!("dbvault-restore-{}", Uuid::new_v4())),
            tracked: Vec::new(),
            created: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn create(&mut self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        self.created = true;
        tracing::debug!(path = %self.root.display(), "Created scratch directory");
        Ok(())
    }

    /// Path for `name` inside the scratch directory. Only the final path
    /// component of `name` is used.
    pub fn track(&mut self, name: &str) -> PathBuf {
        let file_name = Path::new(name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "artifact".into());
        let path = self.root.join(file_name);
        self.tracked.push(path.clone());
        path
    }

    /// Remove tracked files, then the directory. Paths that were never
    /// written are skipped. Safe to call more than once.
    pub async fn cleanup(&mut self) -> ScratchCleanup {
        let mut report = ScratchCleanup::default();

        for path in self.tracked.drain(..) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => report.removed.push(path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove temporary file");
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        if self.created {
            self.created = false;
            match tokio::fs::remove_dir(&self.root).await {
                Ok(()) => report.removed.push(self.root.clone()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %self.root.display(), error = %e, "Failed to remove scratch directory");
                    report.failed.push((self.root.clone(), e.to_string()));
                }
            }
        }

        report
    }
}
