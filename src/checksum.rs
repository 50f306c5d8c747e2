//! Comparing two copies of a dataset by content digest, size or read count.

use crate::io::fastq::count_reads;
use crate::io::scan::scan_directory;
use crate::io::tsv_writer_builder;
use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use indexmap::IndexMap;
use log::{debug, info, warn};
use rayon::prelude::*;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// What gets compared between the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CompareMode {
    /// SHA-256 of the (decompressed) content
    Checksum,
    /// MD5 of the (decompressed) content, as `md5sum` prints it
    Md5,
    /// Size on disk in bytes
    Size,
    /// Number of FASTQ/FASTA records
    Reads,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareStatus {
    Match,
    Mismatch,
    OnlyLeft,
    OnlyRight,
    /// At least one side could not be measured.
    Unreadable,
}

impl CompareStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareStatus::Match => "match",
            CompareStatus::Mismatch => "mismatch",
            CompareStatus::OnlyLeft => "only_left",
            CompareStatus::OnlyRight => "only_right",
            CompareStatus::Unreadable => "unreadable",
        }
    }
}

/// The value measured for one file, or the reason it could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Measurement {
    Value(String),
    Unreadable(String),
}

impl Measurement {
    /// Text written to the comparison table.
    pub fn as_str(&self) -> &str {
        match self {
            Measurement::Value(value) => value,
            Measurement::Unreadable(_) => "unreadable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub status: CompareStatus,
    pub key: String,
    pub left: Option<String>,
    pub right: Option<String>,
}

/// File name up to the first `.`, so `S1.postQual.fastq.gz` and
/// `S1.fastq` share the key `S1`.
pub fn file_stem_key(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name,
    }
}

fn is_gzipped(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Hex SHA-256 of a file, hashing the decompressed stream for `.gz` inputs.
pub fn sha256_hex(path: &Path) -> Result<String> {
    digest_hex::<Sha256>(path)
}

/// Hex MD5 of a file, hashing the decompressed stream for `.gz` inputs.
pub fn md5_hex(path: &Path) -> Result<String> {
    digest_hex::<Md5>(path)
}

fn digest_hex<D: Digest>(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader: Box<dyn Read> = if is_gzipped(path) {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut hasher = D::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        hasher.update(&buffer[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect())
}

fn measure(path: &Path, mode: CompareMode) -> Result<String> {
    match mode {
        CompareMode::Checksum => sha256_hex(path),
        CompareMode::Md5 => md5_hex(path),
        CompareMode::Size => {
            let meta = std::fs::metadata(path)
                .with_context(|| format!("Failed to stat {}", path.display()))?;
            Ok(meta.len().to_string())
        }
        CompareMode::Reads => count_reads(path).map(|n| n.to_string()),
    }
}

/// Measures every file in parallel.
///
/// A file that cannot be read is kept as [`Measurement::Unreadable`] so the
/// remaining files are still compared.
///
/// # Arguments
///
/// * `files` - Files to measure, in scan order
/// * `mode` - What to measure
///
/// # Returns
///
/// * Key → measurement. Keys keep the order of `files`; a repeated key
///   keeps its first value.
pub fn measure_files(files: &[PathBuf], mode: CompareMode) -> IndexMap<String, Measurement> {
    let measured: Vec<(String, Measurement)> = files
        .par_iter()
        .map(|path| {
            let value = match measure(path, mode) {
                Ok(value) => {
                    debug!("{} {}", path.display(), value);
                    Measurement::Value(value)
                }
                Err(e) => {
                    warn!("Skipping unreadable file {}: {:#}", path.display(), e);
                    Measurement::Unreadable(format!("{:#}", e))
                }
            };
            (file_stem_key(path), value)
        })
        .collect();

    let mut values = IndexMap::with_capacity(measured.len());
    for (key, value) in measured {
        if values.contains_key(&key) {
            warn!("Key {} occurs more than once; keeping the first value", key);
            continue;
        }
        values.insert(key, value);
    }
    values
}

/// Pairs the two sides by key. Left keys come first in their own order,
/// followed by keys only present on the right.
pub fn compare_values(
    left: &IndexMap<String, Measurement>,
    right: &IndexMap<String, Measurement>,
) -> Vec<Comparison> {
    let mut rows: Vec<Comparison> = left
        .iter()
        .map(|(key, l)| {
            let r = right.get(key);
            let status = match (l, r) {
                (Measurement::Unreadable(_), _) | (_, Some(Measurement::Unreadable(_))) => {
                    CompareStatus::Unreadable
                }
                (_, Some(r)) if r == l => CompareStatus::Match,
                (_, Some(_)) => CompareStatus::Mismatch,
                (_, None) => CompareStatus::OnlyLeft,
            };
            Comparison {
                status,
                key: key.clone(),
                left: Some(l.as_str().to_string()),
                right: r.map(|r| r.as_str().to_string()),
            }
        })
        .collect();

    rows.extend(
        right
            .iter()
            .filter(|(key, _)| !left.contains_key(*key))
            .map(|(key, r)| Comparison {
                status: match r {
                    Measurement::Unreadable(_) => CompareStatus::Unreadable,
                    Measurement::Value(_) => CompareStatus::OnlyRight,
                },
                key: key.clone(),
                left: None,
                right: Some(r.as_str().to_string()),
            }),
    );
    rows
}

pub fn write_comparison(rows: &[Comparison], output: &Path) -> Result<()> {
    let mut writer = tsv_writer_builder()
        .from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(["status", "key", "left_value", "right_value"])?;
    for row in rows {
        writer.write_record([
            row.status.as_str(),
            row.key.as_str(),
            row.left.as_deref().unwrap_or(crate::io::EMPTY_FIELD),
            row.right.as_deref().unwrap_or(crate::io::EMPTY_FIELD),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Scans both directories for files ending in `suffix` and compares them.
pub fn compare_directories(
    left_dir: &Path,
    right_dir: &Path,
    suffix: &str,
    mode: CompareMode,
) -> Result<Vec<Comparison>> {
    let accept = |name: &str| name.ends_with(suffix);
    let left = measure_files(&scan_directory(left_dir, accept)?.files, mode);
    let right = measure_files(&scan_directory(right_dir, accept)?.files, mode);
    let rows = compare_values(&left, &right);

    let mismatches = rows
        .iter()
        .filter(|r| r.status != CompareStatus::Match)
        .count();
    info!(
        "Compared {} key(s) between {} and {}: {} difference(s)",
        rows.len(),
        left_dir.display(),
        right_dir.display(),
        mismatches
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    const FASTQ: &[u8] = b"@r1\nACGT\n+\nIIII\n@r2\nGGCC\n+\nIIII\n";

    fn write_gz(path: &Path, bytes: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::best());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap();
    }

    fn values(pairs: &[(&str, &str)]) -> IndexMap<String, Measurement> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Measurement::Value(v.to_string())))
            .collect()
    }

    #[test]
    fn test_file_stem_key() {
        assert_eq!(file_stem_key(Path::new("/a/S1.postQual.fastq.gz")), "S1");
        assert_eq!(file_stem_key(Path::new("S2")), "S2");
    }

    #[test]
    fn test_sha256_ignores_compression() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("S1.fastq");
        let gz = dir.path().join("S1.fastq.gz");
        fs::write(&plain, FASTQ).unwrap();
        write_gz(&gz, FASTQ);
        assert_eq!(sha256_hex(&plain).unwrap(), sha256_hex(&gz).unwrap());

        let empty = dir.path().join("empty");
        fs::write(&empty, b"").unwrap();
        assert_eq!(
            sha256_hex(&empty).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_md5_matches_md5sum() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("abc.txt");
        let gz = dir.path().join("abc.txt.gz");
        fs::write(&plain, b"abc").unwrap();
        write_gz(&gz, b"abc");
        assert_eq!(md5_hex(&plain).unwrap(), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(md5_hex(&gz).unwrap(), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_compare_values_statuses() {
        let left = values(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let right = values(&[("d", "4"), ("b", "9"), ("a", "1")]);

        let rows = compare_values(&left, &right);
        let statuses: Vec<(&str, CompareStatus)> =
            rows.iter().map(|r| (r.key.as_str(), r.status)).collect();
        assert_eq!(
            statuses,
            vec![
                ("a", CompareStatus::Match),
                ("b", CompareStatus::Mismatch),
                ("c", CompareStatus::OnlyLeft),
                ("d", CompareStatus::OnlyRight),
            ]
        );
        assert_eq!(rows[3].left, None);
    }

    #[test]
    fn test_compare_directories_by_reads_and_checksum() {
        let dir = tempdir().unwrap();
        let left = dir.path().join("left");
        let right = dir.path().join("right");
        write_gz(&left.join("S1.fastq.gz"), FASTQ);
        write_gz(&left.join("S2.fastq.gz"), FASTQ);
        write_gz(&right.join("run/S1.postQual.fastq.gz"), FASTQ);
        write_gz(&right.join("run/S2.postQual.fastq.gz"), b"@r1\nACGT\n+\nIIII\n");

        let rows = compare_directories(&left, &right, ".gz", CompareMode::Reads).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, CompareStatus::Match);
        assert_eq!(rows[0].left.as_deref(), Some("2"));
        assert_eq!(rows[1].status, CompareStatus::Mismatch);

        let rows = compare_directories(&left, &right, ".gz", CompareMode::Checksum).unwrap();
        assert_eq!(rows[0].status, CompareStatus::Match);
        assert_eq!(rows[1].status, CompareStatus::Mismatch);

        let out = dir.path().join("compare.tsv");
        write_comparison(&rows, &out).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("status\tkey\tleft_value\tright_value\n"));
        assert!(text.contains("\nmismatch\tS2\t"));
    }

    #[test]
    fn test_corrupt_file_does_not_abort_comparison() {
        let dir = tempdir().unwrap();
        let left = dir.path().join("left");
        let right = dir.path().join("right");
        fs::create_dir_all(&left).unwrap();
        fs::write(left.join("S1.fastq.gz"), b"not gzip at all").unwrap();
        write_gz(&left.join("S2.fastq.gz"), FASTQ);
        write_gz(&right.join("S1.fastq.gz"), FASTQ);
        write_gz(&right.join("S2.fastq.gz"), FASTQ);

        let rows = compare_directories(&left, &right, ".gz", CompareMode::Checksum).unwrap();
        let statuses: Vec<(&str, CompareStatus)> =
            rows.iter().map(|r| (r.key.as_str(), r.status)).collect();
        assert_eq!(
            statuses,
            vec![("S1", CompareStatus::Unreadable), ("S2", CompareStatus::Match)]
        );
        assert_eq!(rows[0].left.as_deref(), Some("unreadable"));

        let out = dir.path().join("compare.tsv");
        write_comparison(&rows, &out).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("\nunreadable\tS1\tunreadable\t"));
    }
}
