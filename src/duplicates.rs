//! Finding the same sequencing file in several sub-folders.
//!
//! Files are grouped by bare file name and each group is resolved with the
//! same tie-breaker used for accessions, so the "newer" copy is the one the
//! tie-breaker would keep. A second directory can be checked for files that
//! never made it into the first.

use crate::io::decision_log::LogEntry;
use crate::io::scan::scan_directory;
use crate::io::{tsv_writer_builder, EMPTY_FIELD};
use crate::reconcile::key::file_name_of;
use crate::reconcile::{reconcile, Decision, FileNameKey};
use anyhow::{Context, Result};
use log::info;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateRow {
    /// Same file name in two places; `newer` is the copy to keep.
    Duplicate { older: String, newer: String },
    /// File in the compared directory whose name is absent from the input.
    OnlyInCompared { file_name: String, path: String },
}

impl DuplicateRow {
    fn fields(&self) -> [&str; 3] {
        match self {
            DuplicateRow::Duplicate { older, newer } => [older.as_str(), newer.as_str(), EMPTY_FIELD],
            DuplicateRow::OnlyInCompared { file_name, path } => {
                [file_name.as_str(), EMPTY_FIELD, path.as_str()]
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct DuplicateReport {
    pub rows: Vec<DuplicateRow>,
    pub distinct_names: usize,
}

impl DuplicateReport {
    pub fn duplicate_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r, DuplicateRow::Duplicate { .. }))
            .count()
    }

    pub fn write_tsv(&self, output: impl AsRef<Path>) -> Result<()> {
        let output = output.as_ref();
        let mut writer = tsv_writer_builder()
            .from_path(output)
            .with_context(|| format!("Failed to create {}", output.display()))?;
        writer.write_record(["older_file", "newer_file", "only_in_compared_dir"])?;
        for row in &self.rows {
            writer.write_record(row.fields())?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn duplicate_rows(decisions: &[Decision]) -> Vec<DuplicateRow> {
    decisions
        .iter()
        .flat_map(|decision| {
            decision.rejected.iter().map(move |rejected| DuplicateRow::Duplicate {
                older: rejected.record.identifier.clone(),
                newer: decision.chosen.identifier.clone(),
            })
        })
        .collect()
}

/// Groups `files` by name and reports every non-canonical copy.
pub fn find_duplicates(files: &[PathBuf], marker: &str) -> DuplicateReport {
    let identifiers = files.iter().map(|p| p.display().to_string());
    let decisions = reconcile(identifiers, &FileNameKey, marker, &mut Vec::<LogEntry>::new());
    DuplicateReport {
        rows: duplicate_rows(&decisions),
        distinct_names: decisions.len(),
    }
}

/// Lists compared files whose names do not occur among `known`.
pub fn missing_from(known: &[PathBuf], compared: &[PathBuf]) -> Vec<DuplicateRow> {
    let names: HashSet<&str> = known
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .collect();
    compared
        .iter()
        .filter_map(|path| {
            let display = path.display().to_string();
            let name = file_name_of(&display).to_string();
            (!names.contains(name.as_str())).then(|| DuplicateRow::OnlyInCompared {
                file_name: name,
                path: display,
            })
        })
        .collect()
}

/// Scans `input_dir` (and optionally `compare_dir`) for files ending in `suffix`.
///
/// # Arguments
///
/// * `input_dir` - Directory whose sub-folders may hold copies of one file
/// * `compare_dir` - Directory to check for files absent from `input_dir`
/// * `suffix` - File name suffix of the files to consider
/// * `marker` - Substring preferred when two copies cannot be dated
///
/// # Returns
///
/// * Duplicate rows, then the compared-only rows
pub fn check_directories(
    input_dir: &Path,
    compare_dir: Option<&Path>,
    suffix: &str,
    marker: &str,
) -> Result<DuplicateReport> {
    let accept = |name: &str| name.ends_with(suffix);
    let files = scan_directory(input_dir, accept)?.files;
    let mut report = find_duplicates(&files, marker);
    info!(
        "{} file(s), {} distinct name(s), {} duplicate(s) under {}",
        files.len(),
        report.distinct_names,
        report.duplicate_count(),
        input_dir.display()
    );

    if let Some(compare_dir) = compare_dir {
        let compared = scan_directory(compare_dir, accept)?.files;
        let missing = missing_from(&files, &compared);
        info!(
            "{} file(s) under {} are missing from {}",
            missing.len(),
            compare_dir.display(),
            input_dir.display()
        );
        report.rows.extend(missing);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_find_duplicates_uses_tie_breaker() {
        let files = vec![
            PathBuf::from("/v/2021-06-01/S1.fastq.gz"),
            PathBuf::from("/v/2021-01-01/S1.fastq.gz"),
            PathBuf::from("/v/2021-01-01/S2.fastq.gz"),
        ];
        let report = find_duplicates(&files, "post");
        assert_eq!(report.distinct_names, 2);
        assert_eq!(
            report.rows,
            vec![DuplicateRow::Duplicate {
                older: "/v/2021-01-01/S1.fastq.gz".to_string(),
                newer: "/v/2021-06-01/S1.fastq.gz".to_string(),
            }]
        );
    }

    #[test]
    fn test_check_directories_with_compare() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input");
        let compare = dir.path().join("compare");
        touch(&input.join("a/S1.fastq.gz"));
        touch(&input.join("b/S1.fastq.gz"));
        touch(&input.join("b/S2.fastq.gz"));
        touch(&compare.join("x/S2.fastq.gz"));
        touch(&compare.join("x/S3.fastq.gz"));

        let report = check_directories(&input, Some(compare.as_path()), ".fastq.gz", "post").unwrap();
        assert_eq!(report.duplicate_count(), 1);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(
            report.rows[1],
            DuplicateRow::OnlyInCompared {
                file_name: "S3.fastq.gz".to_string(),
                path: compare.join("x/S3.fastq.gz").display().to_string(),
            }
        );

        let out = dir.path().join("duplicates.logfile.tsv");
        report.write_tsv(&out).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "older_file\tnewer_file\tonly_in_compared_dir");
        assert_eq!(
            lines[1],
            format!(
                "{}\t{}\t.",
                input.join("b/S1.fastq.gz").display(),
                input.join("a/S1.fastq.gz").display()
            )
        );
    }
}
