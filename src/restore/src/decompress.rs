use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::RestoreError;

/// Name of the plain dump produced from a compressed artifact.
pub fn decompressed_name(filename: &str) -> String {
    match filename.strip_suffix(".gz") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => format!("{filename}.sql"),
    }
}

/// Stream-decompress a gzip file into `dest`, returning the bytes written.
/// Runs on the blocking pool.
pub async fn gunzip(src: &Path, dest: &Path) -> Result<u64, RestoreError> {
    let src = src.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
        let input = File::open(&src)?;
        let mut decoder = MultiGzDecoder::new(BufReader::new(input));
        let mut output = BufWriter::new(File::create(&dest)?);
        let written = std::io::copy(&mut decoder, &mut output)?;
        output.flush()?;
        output.get_ref().sync_all()?;
        Ok(written)
    })
    .await
    .map_err(|e| RestoreError::Decompress(std::io::Error::other(e)))?
    .map_err(RestoreError::Decompress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decompressed_name() {
        assert_eq!(decompressed_name("backup-1.sql.gz"), "backup-1.sql");
        assert_eq!(decompressed_name("backup-1.dump"), "backup-1.dump.sql");
        assert_eq!(decompressed_name(".gz"), ".gz.sql");
    }

    #[tokio::test]
    async fn test_gunzip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("dump.sql.gz");
        let dest = dir.path().join("dump.sql");
        std::fs::write(&src, gzip(b"CREATE TABLE users (id int);\n")).unwrap();

        let written = gunzip(&src, &dest).await.unwrap();
        assert_eq!(written, 29);
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            "CREATE TABLE users (id int);\n"
        );
    }

    #[tokio::test]
    async fn test_concatenated_members_are_all_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("dump.sql.gz");
        let dest = dir.path().join("dump.sql");
        let mut bytes = gzip(b"part one;\n");
        bytes.extend(gzip(b"part two;\n"));
        std::fs::write(&src, bytes).unwrap();

        gunzip(&src, &dest).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            "part one;\npart two;\n"
        );
    }

    #[tokio::test]
    async fn test_corrupt_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("dump.sql.gz");
        std::fs::write(&src, b"definitely not gzip").unwrap();

        assert!(matches!(
            gunzip(&src, &dir.path().join("dump.sql")).await,
            Err(RestoreError::Decompress(_))
        ));
    }
}
