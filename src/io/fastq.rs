//! Functions specifically for reading FASTQ files.
//!
//! Leverages the `needletail` crate, which handles compressed files
//! automatically.

use anyhow::{Context, Result};
use log::debug;
use needletail::parse_fastx_file;
use std::path::Path;

/// Counts the records in a FASTQ/FASTA file (compressed or uncompressed).
pub fn count_reads(path: &Path) -> Result<u64> {
    let mut reader = parse_fastx_file(path)
        .with_context(|| format!("Failed to open or parse file: {}", path.display()))?;

    let mut count = 0u64;
    while let Some(record) = reader.next() {
        record.with_context(|| format!("Failed to parse record in file {}", path.display()))?;
        count += 1;
    }
    debug!("{} reads in {}", count, path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    const FASTQ: &[u8] = b"@r1\nACGT\n+\nIIII\n@r2\nGGCC\n+\nIIII\n@r3\nTTAA\n+\nIIII\n";

    #[test]
    fn test_count_plain_fastq() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reads.fastq");
        fs::write(&path, FASTQ).unwrap();
        assert_eq!(count_reads(&path).unwrap(), 3);
    }

    #[test]
    fn test_count_gzipped_fastq() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reads.fastq.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(FASTQ).unwrap();
        encoder.finish().unwrap();
        assert_eq!(count_reads(&path).unwrap(), 3);
    }

    #[test]
    fn test_count_missing_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(count_reads(&dir.path().join("none.fq")).is_err());
    }
}
