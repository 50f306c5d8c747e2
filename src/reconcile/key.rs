//! Grouping-key extraction from record identifiers.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

lazy_static! {
    /// Accession suffix: a DNA (`-d-`) or RNA (`-r-`) library number.
    static ref ACCESSION_REGEX: Regex =
        Regex::new(r"-d-[0-9]+|-r-[0-9]+").expect("accession regex is valid");
}

/// Why the fallback heuristic was used instead of the primary pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The accession pattern did not occur in the file name.
    NoAccessionPattern,
}

/// Outcome of extracting a key. Every variant carries a usable key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyExtraction {
    Matched(String),
    Fallback { key: String, reason: FallbackReason },
    /// Neither rule produced a key; the identifier is its own key.
    Unresolved { key: String },
}

impl KeyExtraction {
    pub fn key(&self) -> &str {
        match self {
            KeyExtraction::Matched(key) => key,
            KeyExtraction::Fallback { key, .. } => key,
            KeyExtraction::Unresolved { key } => key,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, KeyExtraction::Matched(_))
    }
}

/// Derives a grouping key from a record identifier. Must be total.
pub trait KeyExtractor {
    fn extract(&self, identifier: &str) -> KeyExtraction;
}

/// Final path component of an identifier, or the identifier itself.
pub fn file_name_of(identifier: &str) -> &str {
    Path::new(identifier)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(identifier)
}

/// Separators used by [`AccessionKey::new`]: `sampleA-2021-05-01_run.fq`
/// and `sampleA_post.fq` both key as `sampleA`.
pub const DEFAULT_SEPARATORS: &str = "-_.";

/// Keys sequencing files by their laboratory accession.
///
/// `S1-IDBD-D100-0042-d-17_S3_R1.fastq.gz` keys as `S1-IDBD-D100-0042-d-17`.
/// Names without a library suffix fall back to the text before the first
/// separator.
#[derive(Debug, Clone)]
pub struct AccessionKey {
    separators: Vec<char>,
}

impl AccessionKey {
    pub fn new() -> Self {
        Self::with_separators(DEFAULT_SEPARATORS)
    }

    pub fn with_separators(separators: &str) -> Self {
        AccessionKey {
            separators: separators.chars().collect(),
        }
    }
}

impl Default for AccessionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyExtractor for AccessionKey {
    fn extract(&self, identifier: &str) -> KeyExtraction {
        let file_name = file_name_of(identifier);

        if let Some(m) = ACCESSION_REGEX.find(file_name) {
            return KeyExtraction::Matched(file_name[..m.end()].to_string());
        }

        let head = match file_name.find(|c: char| self.separators.contains(&c)) {
            Some(idx) => &file_name[..idx],
            None => file_name,
        };
        if head.is_empty() {
            KeyExtraction::Unresolved {
                key: identifier.to_string(),
            }
        } else {
            KeyExtraction::Fallback {
                key: head.to_string(),
                reason: FallbackReason::NoAccessionPattern,
            }
        }
    }
}

/// Keys records by bare file name, for finding the same file in several folders.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileNameKey;

impl KeyExtractor for FileNameKey {
    fn extract(&self, identifier: &str) -> KeyExtraction {
        let name = file_name_of(identifier);
        if name.is_empty() || name == identifier {
            KeyExtraction::Unresolved {
                key: identifier.to_string(),
            }
        } else {
            KeyExtraction::Matched(name.to_string())
        }
    }
}

/// Shortens an accession key to the two fields preceding the library suffix.
///
/// `S1-IDBD-D100-0042-d-17` becomes `D100-0042`. Keys with too few fields are
/// returned whole.
pub fn short_accession(key: &str) -> String {
    let parts: Vec<&str> = key.split('-').collect();
    let n = parts.len();
    let start = n.saturating_sub(4);
    let end = n.saturating_sub(2);
    if start < end {
        parts[start..end].join("-")
    } else {
        key.to_string()
    }
}
