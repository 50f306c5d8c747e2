//! Run configuration for reconciliation.
//!
//! Every field has a default, so a config file only needs to name the
//! values it changes.

use crate::reconcile::key::DEFAULT_SEPARATORS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Parameters controlling which files are admitted and how duplicates are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Files smaller than this many bytes are excluded (`file_size` flag).
    pub min_file_size: u64,
    /// Case-insensitive substrings that exclude a path (`stop_word_in_path` flag).
    pub stop_words: Vec<String>,
    /// Marker substring preferred by the tie-breaker when timestamps are unavailable.
    pub marker: String,
    /// File name suffixes considered during a directory scan.
    pub extensions: Vec<String>,
    /// Separators for the accession fallback heuristic.
    pub fallback_separators: String,
    /// Value written to the `split` column of the manifest.
    pub split: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            min_file_size: 0,
            stop_words: ["downsample", "trim", "blk", "poscon", "negcon", "demo"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            marker: "post".to_string(),
            extensions: [".fastq.gz", ".fq.gz", ".fastq", ".fq", ".fasta", ".fa"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fallback_separators: DEFAULT_SEPARATORS.to_string(),
            split: 2,
        }
    }
}

impl ReconcileConfig {
    /// Loads a config from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file {}", path.display()))?;
        let config = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Returns true if the file name ends with one of the configured extensions.
    pub fn accepts_extension(&self, file_name: &str) -> bool {
        self.extensions.is_empty()
            || self
                .extensions
                .iter()
                .any(|ext| file_name.to_lowercase().ends_with(&ext.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file = File::create(&path).unwrap();
        writeln!(file, r#"{{"min_file_size": 1024, "marker": "final"}}"#).unwrap();

        let config = ReconcileConfig::from_json_file(&path).unwrap();
        assert_eq!(config.min_file_size, 1024);
        assert_eq!(config.marker, "final");
        assert_eq!(config.split, 2);
        assert_eq!(config.fallback_separators, "-_.");
        assert!(config.stop_words.contains(&"poscon".to_string()));
    }

    #[test]
    fn test_missing_config_is_error() {
        let dir = tempdir().unwrap();
        assert!(ReconcileConfig::from_json_file(dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn test_accepts_extension() {
        let config = ReconcileConfig::default();
        assert!(config.accepts_extension("S1-d-12.fastq.gz"));
        assert!(config.accepts_extension("ref.FA"));
        assert!(!config.accepts_extension("notes.txt"));

        let open = ReconcileConfig {
            extensions: Vec::new(),
            ..ReconcileConfig::default()
        };
        assert!(open.accepts_extension("notes.txt"));
    }
}
