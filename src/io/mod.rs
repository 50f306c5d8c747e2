//! Input/Output operations module.
//!
//! Handles scanning directories for candidate files, reading and writing
//! the tab-separated tables the tools exchange, and the decision log.

pub mod decision_log;
pub mod fastq;
pub mod scan;

use crate::reconcile::key::short_accession;
use crate::reconcile::Decision;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder written for fields that do not apply.
pub const EMPTY_FIELD: &str = ".";

pub fn tsv_reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.delimiter(b'\t');
    builder
}

pub fn tsv_writer_builder() -> csv::WriterBuilder {
    let mut builder = csv::WriterBuilder::new();
    builder.delimiter(b'\t');
    builder
}

/// One row of a `<prefix>.cp.tsv` manifest.
///
/// Only `accession`, `file_path`, `prefix` and `split` are filled in here;
/// the expectation columns are completed by hand downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRow {
    pub accession: String,
    pub file_path: String,
    pub taxids_expected: String,
    pub repids_expected: String,
    pub repids_included: String,
    pub repids_excluded: String,
    pub kingdom: String,
    pub prefix: String,
    pub split: u32,
}

impl ManifestRow {
    pub fn new(key: &str, file_path: &Path, prefix: &str, split: u32) -> Self {
        ManifestRow {
            accession: short_accession(key),
            file_path: file_path.display().to_string(),
            taxids_expected: String::new(),
            repids_expected: String::new(),
            repids_included: String::new(),
            repids_excluded: String::new(),
            kingdom: String::new(),
            prefix: prefix.to_string(),
            split,
        }
    }
}

/// Writes the manifest table, header included.
pub fn write_manifest(rows: &[ManifestRow], output_path: impl AsRef<Path>) -> Result<()> {
    let output_path = output_path.as_ref();
    let mut writer = tsv_writer_builder()
        .from_path(output_path)
        .with_context(|| format!("Failed to create manifest {}", output_path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    if rows.is_empty() {
        writer.write_record([
            "accession",
            "file_path",
            "taxids_expected",
            "repids_expected",
            "repids_included",
            "repids_excluded",
            "kingdom",
            "prefix",
            "split",
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a manifest written by [`write_manifest`] (or edited by hand since).
pub fn read_manifest(path: impl AsRef<Path>) -> Result<Vec<ManifestRow>> {
    let path = path.as_ref();
    let mut reader = tsv_reader_builder()
        .from_path(path)
        .with_context(|| format!("Failed to open manifest {}", path.display()))?;
    let mut rows = Vec::new();
    for (index, result) in reader.deserialize().enumerate() {
        let row: ManifestRow =
            result.with_context(|| format!("Malformed row {} in {}", index + 2, path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct ReleaseRow {
    accession: String,
    repids_expected: String,
}

/// Accession → expected reporting ids from a product-release manifest.
/// Only the `accession` and `repids_expected` columns are read; when an
/// accession repeats, its last row wins.
pub fn read_release_repids(path: impl AsRef<Path>) -> Result<IndexMap<String, String>> {
    let path = path.as_ref();
    let mut reader = tsv_reader_builder()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open release table {}", path.display()))?;
    let mut repids = IndexMap::new();
    for (index, result) in reader.deserialize().enumerate() {
        let row: ReleaseRow =
            result.with_context(|| format!("Malformed row {} in {}", index + 2, path.display()))?;
        if let Some(previous) = repids.insert(row.accession.clone(), row.repids_expected) {
            warn!("Accession {} repeats in {}; replacing {}", row.accession, path.display(), previous);
        }
    }
    Ok(repids)
}

/// Copies expected reporting ids onto manifest rows by accession.
///
/// # Arguments
///
/// * `rows` - Manifest rows to update in place
/// * `repids` - Accession → `repids_expected`, as read by [`read_release_repids`]
///
/// # Returns
///
/// * The number of rows that matched an accession
pub fn fill_repids(rows: &mut [ManifestRow], repids: &IndexMap<String, String>) -> usize {
    let mut filled = 0;
    for row in rows.iter_mut() {
        if let Some(repid) = repids.get(&row.accession) {
            row.repids_expected = repid.clone();
            filled += 1;
        }
    }
    info!("Filled reporting ids for {} of {} manifest row(s)", filled, rows.len());
    filled
}

/// Writes one line per rejected record: the winner of its group beside it.
pub fn write_reconciliation_table(
    decisions: &[Decision],
    output_path: impl AsRef<Path>,
) -> Result<()> {
    let output_path = output_path.as_ref();
    let mut writer = tsv_writer_builder()
        .from_path(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    writer.write_record([
        "key",
        "chosen_identifier",
        "rejected_identifier",
        "chosen_signal",
        "rejected_signal",
        "reason",
    ])?;

    for decision in decisions {
        let chosen_signal = decision.chosen.signal();
        for rejected in &decision.rejected {
            writer.write_record([
                decision.key.as_str(),
                decision.chosen.identifier.as_str(),
                rejected.record.identifier.as_str(),
                chosen_signal.as_str(),
                rejected.record.signal().as_str(),
                rejected.rule.as_str(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Reads one non-empty, trimmed entry per line, skipping `#` comments.
pub fn read_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// `<dir>/<prefix>.<suffix>`
pub fn output_path(dir: &Path, prefix: &str, suffix: &str) -> PathBuf {
    dir.join(format!("{}.{}", prefix, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::decision_log::LogEntry;
    use crate::reconcile::{reconcile, AccessionKey};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_write_manifest_tsv() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("rpip.cp.tsv");
        let rows = vec![ManifestRow::new(
            "S1-IDBD-D100-0042-d-17",
            Path::new("/vault/run1/S1-IDBD-D100-0042-d-17.fastq.gz"),
            "rpip",
            2,
        )];

        write_manifest(&rows, &file_path).unwrap();

        let content = fs::read_to_string(file_path).unwrap();
        let expected_content = "\
accession\tfile_path\ttaxids_expected\trepids_expected\trepids_included\trepids_excluded\tkingdom\tprefix\tsplit\n\
D100-0042\t/vault/run1/S1-IDBD-D100-0042-d-17.fastq.gz\t\t\t\t\t\trpip\t2\n";
        assert_eq!(content, expected_content);
    }

    #[test]
    fn test_write_empty_manifest_has_header() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("empty.cp.tsv");
        write_manifest(&[], &file_path).unwrap();
        let content = fs::read_to_string(file_path).unwrap();
        assert!(content.starts_with("accession\tfile_path"));
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_write_reconciliation_table() {
        let extractor = AccessionKey::with_separators("-_.");
        let decisions = reconcile(
            [
                "sampleA-2021-05-01_run.fq",
                "sampleA-2021-06-10_run.fq",
                "sampleB_1.fq",
            ],
            &extractor,
            "post",
            &mut Vec::<LogEntry>::new(),
        );
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("decisions.tsv");

        write_reconciliation_table(&decisions, &file_path).unwrap();

        let content = fs::read_to_string(file_path).unwrap();
        let expected_content = "\
key\tchosen_identifier\trejected_identifier\tchosen_signal\trejected_signal\treason\n\
sampleA\tsampleA-2021-06-10_run.fq\tsampleA-2021-05-01_run.fq\t2021-06-10\t2021-05-01\tnewer_timestamp\n";
        assert_eq!(content, expected_content);
    }

    #[test]
    fn test_fill_repids_from_release() {
        let dir = tempdir().unwrap();
        let manifest = dir.path().join("lab.cp.tsv");
        let mut rows = vec![
            ManifestRow::new("S1-IDBD-D1-0001-d-1", Path::new("/v/S1.fq.gz"), "lab", 2),
            ManifestRow::new("S2-IDBD-D1-0002-d-2", Path::new("/v/S2.fq.gz"), "lab", 2),
        ];
        rows[1].repids_expected = "99".to_string();
        write_manifest(&rows, &manifest).unwrap();

        let release = dir.path().join("release.cp.tsv");
        fs::write(
            &release,
            "accession	file_path	taxids_expected	repids_expected
             D1-0001	/r/S1.fq.gz	562	12
             D9-0009	/r/S9.fq.gz	573	14
             D1-0001	/r/S1b.fq.gz	562	12,13
",
        )
        .unwrap();

        let repids = read_release_repids(&release).unwrap();
        assert_eq!(repids.len(), 2);
        let mut rows = read_manifest(&manifest).unwrap();
        assert_eq!(fill_repids(&mut rows, &repids), 1);
        assert_eq!(rows[0].repids_expected, "12,13");
        assert_eq!(rows[1].repids_expected, "99");

        let out = dir.path().join("lab_mapped.cp.tsv");
        write_manifest(&rows, &out).unwrap();
        assert!(fs::read_to_string(&out)
            .unwrap()
            .contains("D1-0001	/v/S1.fq.gz		12,13				lab	2
"));
    }

    #[test]
    fn test_read_lines_skips_blanks_and_comments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.txt");
        fs::write(&path, "# profile\nInfluenza A virus\n\n  Escherichia coli  \n").unwrap();
        assert_eq!(
            read_lines(&path).unwrap(),
            vec!["Influenza A virus".to_string(), "Escherichia coli".to_string()]
        );
    }
}
