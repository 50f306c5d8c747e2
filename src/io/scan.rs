//! Directory scanning.
//!
//! Entries are visited in file-name order within each directory, so a run
//! over the same tree always offers records in the same order.

use crate::reconcile::admission::Rejection;
use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Input directory does not exist: {}", .0.display())]
    MissingRoot(PathBuf),

    #[error("Input path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Failed to read directory {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Files found by [`scan_directory`], plus the entries below the root that
/// could not be inspected.
#[derive(Debug, Default)]
pub struct Scan {
    pub files: Vec<PathBuf>,
    /// Always [`Rejection::Unreadable`].
    pub unreadable: Vec<Rejection>,
}

/// Recursively lists files (and symlinks, even broken ones) under `root`
/// whose names pass `accept`. Symlinked directories are not followed.
///
/// # Arguments
///
/// * `root` - Directory to scan
/// * `accept` - Predicate on the file name
///
/// # Returns
///
/// * The accepted files in name order. An entry or sub-directory that
///   cannot be read is returned in `unreadable` instead of failing the scan;
///   only an unreadable root is an error.
pub fn scan_directory<F>(root: &Path, accept: F) -> Result<Scan, ScanError>
where
    F: Fn(&str) -> bool,
{
    if !root.exists() {
        return Err(ScanError::MissingRoot(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    info!("Scanning directory: {}", root.display());
    let mut scan = Scan::default();
    let entries = sorted_entries(root).map_err(|source| ScanError::Unreadable {
        path: root.to_path_buf(),
        source,
    })?;
    walk(entries, &accept, &mut scan);
    info!("Found {} candidate file(s) under {}", scan.files.len(), root.display());
    if !scan.unreadable.is_empty() {
        warn!("{} unreadable entry(ies) under {}", scan.unreadable.len(), root.display());
    }
    Ok(scan)
}

fn sorted_entries(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

fn walk<F>(entries: Vec<PathBuf>, accept: &F, scan: &mut Scan)
where
    F: Fn(&str) -> bool,
{
    for path in entries {
        let file_type = match fs::symlink_metadata(&path) {
            Ok(meta) => meta.file_type(),
            Err(e) => {
                debug!("Cannot stat {}: {}", path.display(), e);
                scan.unreadable.push(Rejection::Unreadable {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if file_type.is_dir() {
            match sorted_entries(&path) {
                Ok(children) => walk(children, accept, scan),
                Err(e) => {
                    debug!("Cannot list {}: {}", path.display(), e);
                    scan.unreadable.push(Rejection::Unreadable {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
            continue;
        }

        if file_type.is_symlink() && path.is_dir() {
            debug!("Not following directory symlink {}", path.display());
            continue;
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if accept(&name) {
            scan.files.push(path);
        } else {
            debug!("Skipping file with unaccepted name: {}", path.display());
        }
    }
}
