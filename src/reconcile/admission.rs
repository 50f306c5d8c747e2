//! Rules that keep a scanned file out of reconciliation entirely.

use crate::config::ReconcileConfig;
use crate::io::decision_log::LogCategory;
use std::fs;
use std::path::{Path, PathBuf};

/// Why a file was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    BrokenSymlink { path: PathBuf },
    Unreadable { path: PathBuf, reason: String },
    TooSmall { path: PathBuf, size: u64, min_size: u64 },
    StopWord { path: PathBuf, word: String },
}

impl Rejection {
    pub fn path(&self) -> &Path {
        match self {
            Rejection::BrokenSymlink { path }
            | Rejection::Unreadable { path, .. }
            | Rejection::TooSmall { path, .. }
            | Rejection::StopWord { path, .. } => path,
        }
    }

    pub fn category(&self) -> LogCategory {
        match self {
            Rejection::BrokenSymlink { .. } => LogCategory::SymLinkBroken,
            Rejection::Unreadable { .. } => LogCategory::Unreadable,
            Rejection::TooSmall { .. } => LogCategory::FileSize,
            Rejection::StopWord { .. } => LogCategory::StopWordInPath,
        }
    }

    pub fn note(&self) -> String {
        match self {
            Rejection::BrokenSymlink { .. } => "Symbolic link does not exist.".to_string(),
            Rejection::Unreadable { reason, .. } => format!("File unreadable ({}) -- skip file.", reason),
            Rejection::TooSmall { size, min_size, .. } => {
                format!("File size too small ({} < {}) -- skip file.", size, min_size)
            }
            Rejection::StopWord { word, .. } => {
                format!("Stop word {} recognized -- skip file.", word)
            }
        }
    }
}

/// An admitted file: the path as scanned and the path it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub path: PathBuf,
    pub resolved: PathBuf,
}

pub struct AdmissionFilter {
    min_file_size: u64,
    stop_words: Vec<String>,
}

impl AdmissionFilter {
    pub fn new(min_file_size: u64, stop_words: &[String]) -> Self {
        AdmissionFilter {
            min_file_size,
            stop_words: stop_words.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self::new(config.min_file_size, &config.stop_words)
    }

    /// Checks, in order: broken symlink, unreadable metadata, size, stop words.
    pub fn check(&self, path: &Path) -> Result<Admitted, Rejection> {
        let link_meta = fs::symlink_metadata(path).map_err(|e| Rejection::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let is_link = link_meta.file_type().is_symlink();
        if is_link && !path.exists() {
            return Err(Rejection::BrokenSymlink {
                path: path.to_path_buf(),
            });
        }

        let size = fs::metadata(path)
            .map_err(|e| Rejection::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .len();
        if size < self.min_file_size {
            return Err(Rejection::TooSmall {
                path: path.to_path_buf(),
                size,
                min_size: self.min_file_size,
            });
        }

        let lowered = path.to_string_lossy().to_lowercase();
        if let Some(word) = self.stop_words.iter().find(|w| lowered.contains(w.as_str())) {
            return Err(Rejection::StopWord {
                path: path.to_path_buf(),
                word: word.clone(),
            });
        }

        let resolved = if is_link {
            fs::read_link(path).unwrap_or_else(|_| path.to_path_buf())
        } else {
            path.to_path_buf()
        };
        Ok(Admitted {
            path: path.to_path_buf(),
            resolved,
        })
    }
}
