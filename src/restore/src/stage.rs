use std::fmt;

/// Linear restore pipeline. A run only moves forward; any failure before
/// `WriteAuditLog` ends it, after which `CleanupTempFiles` still runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestoreStage {
    ResolveTarget,
    ValidateConfig,
    Confirm,
    Download,
    VerifyChecksum,
    Decompress,
    AcquireLock,
    ExecuteRestore,
    WriteAuditLog,
    CleanupTempFiles,
    Done,
}

impl RestoreStage {
    pub const ALL: [RestoreStage; 11] = [
        RestoreStage::ResolveTarget,
        RestoreStage::ValidateConfig,
        RestoreStage::Confirm,
        RestoreStage::Download,
        RestoreStage::VerifyChecksum,
        RestoreStage::Decompress,
        RestoreStage::AcquireLock,
        RestoreStage::ExecuteRestore,
        RestoreStage::WriteAuditLog,
        RestoreStage::CleanupTempFiles,
        RestoreStage::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreStage::ResolveTarget => "RESOLVE_TARGET",
            RestoreStage::ValidateConfig => "VALIDATE_CONFIG",
            RestoreStage::Confirm => "CONFIRM",
            RestoreStage::Download => "DOWNLOAD",
            RestoreStage::VerifyChecksum => "VERIFY_CHECKSUM",
            RestoreStage::Decompress => "DECOMPRESS",
            RestoreStage::AcquireLock => "ACQUIRE_LOCK",
            RestoreStage::ExecuteRestore => "EXECUTE_RESTORE",
            RestoreStage::WriteAuditLog => "WRITE_AUDIT_LOG",
            RestoreStage::CleanupTempFiles => "CLEANUP_TEMP_FILES",
            RestoreStage::Done => "DONE",
        }
    }

    /// Whether a failure in this stage is logged instead of failing the run.
    pub fn is_best_effort(&self) -> bool {
        matches!(
            self,
            RestoreStage::WriteAuditLog | RestoreStage::CleanupTempFiles
        )
    }
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
