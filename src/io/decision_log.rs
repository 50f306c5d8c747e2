//! Append-only reconciliation log.
//!
//! One tab-separated line per decision, in processing order:
//!
//! ```text
//! flag  notes  filepath  chosen_filepath  excluded_filepath  chosen_timestamp  excluded_timestamp
//! ```
//!
//! Fields that do not apply to a category are written as `.`.

use crate::reconcile::admission::Rejection;
use crate::reconcile::{Record, TieBreakRule};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::warn;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use super::{tsv_reader_builder, tsv_writer_builder, EMPTY_FIELD};
use crate::reconcile::key::file_name_of;

pub const LOG_HEADER: [&str; 7] = [
    "flag",
    "notes",
    "filepath",
    "chosen_filepath",
    "excluded_filepath",
    "chosen_timestamp",
    "excluded_timestamp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    Duplicate,
    FileSize,
    StopWordInPath,
    SymLinkBroken,
    Unreadable,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Duplicate => "duplicate",
            LogCategory::FileSize => "file_size",
            LogCategory::StopWordInPath => "stop_word_in_path",
            LogCategory::SymLinkBroken => "sym_link_broken",
            LogCategory::Unreadable => "unreadable",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "duplicate" => Ok(LogCategory::Duplicate),
            "file_size" => Ok(LogCategory::FileSize),
            "stop_word_in_path" => Ok(LogCategory::StopWordInPath),
            "sym_link_broken" => Ok(LogCategory::SymLinkBroken),
            "unreadable" => Ok(LogCategory::Unreadable),
            other => Err(format!("unknown log flag '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub category: LogCategory,
    pub note: String,
    pub filepath: Option<String>,
    pub chosen: Option<String>,
    pub excluded: Option<String>,
    pub chosen_timestamp: Option<String>,
    pub excluded_timestamp: Option<String>,
}

impl LogEntry {
    /// The incoming record displaced the previous winner.
    pub fn replaced(incoming: &Record, previous: &Record, rule: TieBreakRule) -> Self {
        LogEntry {
            category: LogCategory::Duplicate,
            note: format!("Incoming filepath replaces existing ({})", rule),
            filepath: None,
            chosen: Some(incoming.identifier.clone()),
            excluded: Some(previous.identifier.clone()),
            chosen_timestamp: Some(incoming.signal()),
            excluded_timestamp: Some(previous.signal()),
        }
    }

    /// The existing winner kept its place.
    pub fn retained(existing: &Record, incoming: &Record, rule: TieBreakRule) -> Self {
        LogEntry {
            category: LogCategory::Duplicate,
            note: format!("Existing filepath retained ({})", rule),
            filepath: None,
            chosen: Some(existing.identifier.clone()),
            excluded: Some(incoming.identifier.clone()),
            chosen_timestamp: Some(existing.signal()),
            excluded_timestamp: Some(incoming.signal()),
        }
    }

    pub fn rejection(rejection: &Rejection) -> Self {
        LogEntry {
            category: rejection.category(),
            note: rejection.note(),
            filepath: Some(rejection.path().display().to_string()),
            chosen: None,
            excluded: None,
            chosen_timestamp: None,
            excluded_timestamp: None,
        }
    }

    fn fields(&self) -> [&str; 7] {
        [
            self.category.as_str(),
            &self.note,
            or_empty(&self.filepath),
            or_empty(&self.chosen),
            or_empty(&self.excluded),
            or_empty(&self.chosen_timestamp),
            or_empty(&self.excluded_timestamp),
        ]
    }

    /// The path a blacklist row is flagged for: the retained file of a
    /// duplicate, the skipped file for every other flag.
    pub fn blacklist_path(&self) -> Option<&str> {
        match self.category {
            LogCategory::Duplicate => self.chosen.as_deref(),
            _ => self.filepath.as_deref(),
        }
    }
}

fn or_empty(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(EMPTY_FIELD)
}

/// Receives every decision. Implementations must not fail the caller.
pub trait DecisionSink {
    fn record(&mut self, entry: &LogEntry);
}

impl DecisionSink for Vec<LogEntry> {
    fn record(&mut self, entry: &LogEntry) {
        self.push(entry.clone());
    }
}

/// Tab-separated log sink over any writer.
pub struct TsvLog<W: Write> {
    writer: csv::Writer<W>,
    written: usize,
    failed: usize,
}

impl<W: Write> TsvLog<W> {
    /// Wraps a writer, emitting the header first when `with_header` is set.
    pub fn new(inner: W, with_header: bool) -> Self {
        let writer = tsv_writer_builder().from_writer(inner);
        let mut log = TsvLog {
            writer,
            written: 0,
            failed: 0,
        };
        if with_header {
            if let Err(e) = log.writer.write_record(LOG_HEADER) {
                warn!("Failed to write log header: {}", e);
                log.failed += 1;
            }
        }
        log
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush decision log: {}", e);
            self.failed += 1;
        }
    }

    pub fn into_inner(mut self) -> Option<W> {
        self.flush();
        self.writer.into_inner().ok()
    }
}

impl TsvLog<File> {
    /// Opens a log in append mode. The header is written only to a new, empty file.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open decision log {}", path.display()))?;
        let is_empty = file.metadata().map(|m| m.len() == 0).unwrap_or(true);
        Ok(TsvLog::new(file, is_empty))
    }
}

impl<W: Write> DecisionSink for TsvLog<W> {
    fn record(&mut self, entry: &LogEntry) {
        match self.writer.write_record(entry.fields()) {
            Ok(()) => self.written += 1,
            Err(e) => {
                warn!("Failed to write decision log line: {}", e);
                self.failed += 1;
            }
        }
    }
}

/// Reads a decision log back. Lines with unknown flags are skipped.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<LogEntry>> {
    let path = path.as_ref();
    let mut reader = tsv_reader_builder()
        .from_path(path)
        .with_context(|| format!("Failed to open decision log {}", path.display()))?;

    let field = |value: Option<&str>| -> Option<String> {
        match value {
            Some(v) if !v.is_empty() && v != EMPTY_FIELD => Some(v.to_string()),
            _ => None,
        }
    };

    let mut entries = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Malformed line in {}", path.display()))?;
        let category = match record.get(0).unwrap_or("").parse::<LogCategory>() {
            Ok(category) => category,
            Err(e) => {
                warn!("Skipping log line {}: {}", line + 2, e);
                continue;
            }
        };
        entries.push(LogEntry {
            category,
            note: record.get(1).unwrap_or("").to_string(),
            filepath: field(record.get(2)),
            chosen: field(record.get(3)),
            excluded: field(record.get(4)),
            chosen_timestamp: field(record.get(5)),
            excluded_timestamp: field(record.get(6)),
        });
    }
    Ok(entries)
}

/// Maps file names to the flag of the log entry that names them.
///
/// A `duplicate` entry flags the file that was kept, so the blacklist marks
/// the accession as having had duplicates; any other flag marks the skipped
/// file itself. Later entries overwrite earlier ones.
pub fn flags_by_file_name(entries: &[LogEntry]) -> IndexMap<String, LogCategory> {
    let mut flags = IndexMap::new();
    for entry in entries {
        if let Some(path) = entry.blacklist_path() {
            flags.insert(file_name_of(path).to_string(), entry.category);
        }
    }
    flags
}

/// Writes a copy of a blacklist table with the second column set to the
/// flag of every row whose first column names a flagged file.
///
/// Returns the number of rows updated.
pub fn apply_flags_to_blacklist(
    blacklist: impl AsRef<Path>,
    output: impl AsRef<Path>,
    flags: &IndexMap<String, LogCategory>,
) -> Result<usize> {
    let blacklist = blacklist.as_ref();
    let mut reader = tsv_reader_builder()
        .flexible(true)
        .from_path(blacklist)
        .with_context(|| format!("Failed to open blacklist {}", blacklist.display()))?;
    let headers = reader.headers()?.clone();

    let output = output.as_ref();
    let mut writer = tsv_writer_builder()
        .flexible(true)
        .from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(&headers)?;

    let mut updated = 0;
    for result in reader.records() {
        let record = result?;
        let mut fields: Vec<String> = record.iter().map(str::to_string).collect();
        if let Some(flag) = fields.first().and_then(|name| flags.get(name.as_str())) {
            if fields.len() < 2 {
                fields.resize(2, String::new());
            }
            fields[1] = flag.to_string();
            updated += 1;
        }
        writer.write_record(&fields)?;
    }
    writer.flush()?;
    Ok(updated)
}
