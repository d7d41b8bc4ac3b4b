//! SHA-256 verification of downloaded artifacts.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::error::RestoreError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Hex-encoded SHA-256 of a file, streamed in fixed-size chunks.
pub async fn sha256_file(path: &Path) -> Result<String, RestoreError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(RestoreError::Read)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).await.map_err(RestoreError::Read)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compare the digest of `path` with the recorded checksum.
///
/// The full digest must match; case and surrounding whitespace in the
/// recorded value are ignored. Returns the computed digest.
pub async fn verify_checksum(path: &Path, expected: &str) -> Result<String, RestoreError> {
    let actual = sha256_file(path).await?;
    let expected = expected.trim();
    if actual.eq_ignore_ascii_case(expected) {
        Ok(actual)
    } else {
        Err(RestoreError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
