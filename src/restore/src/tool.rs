use async_trait::async_trait;
use common::config::RestoreToolConfig;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::RestoreError;

/// External database restore utility. Its exit status is the only success
/// signal; a partial restore is not rolled back.
#[async_trait]
pub trait RestoreTool: Send + Sync {
    async fn restore(&self, database_url: &str, dump: &Path) -> Result<(), RestoreError>;
}

/// Runs `program [args...] <database_url>` with the dump on stdin.
#[derive(Debug, Clone)]
pub struct PsqlRestore {
    program: String,
    args: Vec<String>,
}

/// Stderr kept in error messages.
const STDERR_TAIL: usize = 4096;

impl PsqlRestore {
    pub fn new(config: &RestoreToolConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// First line of `<program> --version`.
    pub async fn version(&self) -> Result<String, RestoreError> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RestoreError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(RestoreError::ToolFailed {
                status: output.status.to_string(),
                stderr: tail(&output.stderr),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.len() <= STDERR_TAIL {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[async_trait]
impl RestoreTool for PsqlRestore {
    async fn restore(&self, database_url: &str, dump: &Path) -> Result<(), RestoreError> {
        let input = tokio::fs::File::open(dump)
            .await
            .map_err(RestoreError::Read)?
            .into_std()
            .await;

        tracing::info!(program = %self.program, dump = %dump.display(), "Running restore tool");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(database_url)
            .stdin(Stdio::from(input))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| RestoreError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RestoreError::ToolFailed {
                status: output.status.to_string(),
                stderr: tail(&output.stderr),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_end_of_long_output() {
        let long = "x".repeat(STDERR_TAIL + 10) + "END";
        let kept = tail(long.as_bytes());
        assert!(kept.starts_with("..."));
        assert!(kept.ends_with("END"));
        assert_eq!(tail(b"  short\n"), "short");
    }

    #[cfg(unix)]
    fn shell(script: &str) -> PsqlRestore {
        PsqlRestore::new(&RestoreToolConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dump_is_fed_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.sql");
        std::fs::write(&dump, "CREATE TABLE listings (id int);\n").unwrap();

        // The database URL arrives as $0
        let tool = shell(r#"grep -q "CREATE TABLE listings" && test "$0" = "postgres://db/app""#);
        tool.restore("postgres://db/app", &dump).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_tool_failure() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.sql");
        std::fs::write(&dump, "SELECT 1;\n").unwrap();

        let err = shell("cat >/dev/null; echo 'relation already exists' >&2; exit 3")
            .restore("postgres://db/app", &dump)
            .await
            .unwrap_err();
        match err {
            RestoreError::ToolFailed { stderr, .. } => {
                assert_eq!(stderr, "relation already exists")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_dump_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = PsqlRestore::new(&RestoreToolConfig {
            program: "dbvault-no-such-program".to_string(),
            args: vec![],
        });
        assert!(matches!(
            tool.restore("postgres://db/app", &dir.path().join("gone.sql")).await,
            Err(RestoreError::Read(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.sql");
        std::fs::write(&dump, "SELECT 1;\n").unwrap();

        let tool = PsqlRestore::new(&RestoreToolConfig {
            program: "dbvault-no-such-program".to_string(),
            args: vec![],
        });
        assert!(matches!(
            tool.restore("postgres://db/app", &dump).await,
            Err(RestoreError::Spawn { .. })
        ));
        assert!(matches!(
            tool.version().await,
            Err(RestoreError::Spawn { .. })
        ));
    }
}
