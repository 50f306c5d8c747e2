//! Reconciliation of one data vault directory into a cp.tsv manifest.
//!
//! [`ManifestBuilder`] drives the whole run: it scans the input tree, puts
//! every file through the admission filter, offers the admitted ones to the
//! reconciler and finally writes the manifest, the reconciliation table and
//! the decision log.

use crate::config::ReconcileConfig;
use crate::io::decision_log::{DecisionSink, LogEntry, TsvLog};
use crate::io::scan::scan_directory;
use crate::io::{output_path, write_manifest, write_reconciliation_table, ManifestRow};
use crate::reconcile::{AccessionKey, AdmissionFilter, Decision, Reconciler, Rejection};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Counters for one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub scanned_files: usize,
    pub admitted_files: usize,
    pub rejected_files: usize,
    pub keys: usize,
    pub duplicate_keys: usize,
    pub discarded_duplicates: usize,
    pub log_write_failures: usize,
    pub processing_time_seconds: f64,
}

/// Everything a run produced, before or after it was written out.
#[derive(Debug, Clone)]
pub struct ReconcileRun {
    pub prefix: String,
    pub decisions: Vec<Decision>,
    pub rejections: Vec<Rejection>,
    pub manifest: Vec<ManifestRow>,
    pub metrics: RunMetrics,
    pub manifest_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub table_file: Option<PathBuf>,
}

/// Scans → admits → reconciles → builds the manifest.
pub struct ManifestBuilder {
    config: ReconcileConfig,
    extractor: AccessionKey,
    filter: AdmissionFilter,
}

impl ManifestBuilder {
    pub fn new(config: ReconcileConfig) -> Self {
        let extractor = AccessionKey::with_separators(&config.fallback_separators);
        let filter = AdmissionFilter::from_config(&config);
        ManifestBuilder {
            config,
            extractor,
            filter,
        }
    }

    /// Reconciles an ordered list of candidate files.
    ///
    /// # Arguments
    ///
    /// * `files` - Candidate files in scan order; earlier files win ties
    /// * `prefix` - Value of the manifest's `prefix` column
    /// * `sink` - Receives every rejection and duplicate decision
    ///
    /// # Returns
    ///
    /// * The decisions, rejections, manifest rows and counters of the run
    pub fn build(&self, files: &[PathBuf], prefix: &str, sink: &mut dyn DecisionSink) -> ReconcileRun {
        let start = Instant::now();
        let mut reconciler = Reconciler::new(&self.extractor, self.config.marker.as_str());
        let mut resolved: IndexMap<String, PathBuf> = IndexMap::new();
        let mut rejections = Vec::new();

        for path in files {
            match self.filter.check(path) {
                Ok(admitted) => {
                    let identifier = admitted.path.display().to_string();
                    resolved.insert(identifier.clone(), admitted.resolved);
                    reconciler.offer_identifier(identifier, sink);
                }
                Err(rejection) => {
                    info!("{}: {}", rejection.path().display(), rejection.note());
                    sink.record(&LogEntry::rejection(&rejection));
                    rejections.push(rejection);
                }
            }
        }

        let decisions = reconciler.finish();
        let manifest: Vec<ManifestRow> = decisions
            .iter()
            .map(|decision| {
                let identifier = &decision.chosen.identifier;
                let file_path = resolved
                    .get(identifier)
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from(identifier));
                ManifestRow::new(&decision.key, &file_path, prefix, self.config.split)
            })
            .collect();

        let duplicate_keys = decisions.iter().filter(|d| !d.is_singleton()).count();
        let discarded_duplicates = decisions.iter().map(|d| d.rejected.len()).sum();
        let metrics = RunMetrics {
            scanned_files: files.len(),
            admitted_files: files.len() - rejections.len(),
            rejected_files: rejections.len(),
            keys: decisions.len(),
            duplicate_keys,
            discarded_duplicates,
            log_write_failures: 0,
            processing_time_seconds: start.elapsed().as_secs_f64(),
        };

        ReconcileRun {
            prefix: prefix.to_string(),
            decisions,
            rejections,
            manifest,
            metrics,
            manifest_file: None,
            log_file: None,
            table_file: None,
        }
    }

    /// Runs over a directory tree and writes the manifest, reconciliation
    /// table and decision log into `output_dir`.
    ///
    /// Entries the scan could not read are logged as `unreadable` ahead of
    /// the files that were admitted or rejected.
    pub fn process_directory(
        &self,
        input_dir: &Path,
        prefix: &str,
        output_dir: &Path,
    ) -> Result<ReconcileRun> {
        let scan = scan_directory(input_dir, |name| self.config.accepts_extension(name))?;

        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
        let log_file = output_dir.join(format!("logfile.{}.out", prefix));
        let mut log = TsvLog::append(&log_file)?;

        for rejection in &scan.unreadable {
            info!("{}: {}", rejection.path().display(), rejection.note());
            log.record(&LogEntry::rejection(rejection));
        }
        let mut run = self.build(&scan.files, prefix, &mut log);
        run.metrics.scanned_files += scan.unreadable.len();
        run.metrics.rejected_files += scan.unreadable.len();
        run.rejections.splice(0..0, scan.unreadable);
        log.flush();
        run.metrics.log_write_failures = log.failed();
        if log.failed() > 0 {
            warn!("{} decision log line(s) could not be written", log.failed());
        }

        let manifest_file = output_path(output_dir, prefix, "cp.tsv");
        write_manifest(&run.manifest, &manifest_file)?;
        let table_file = output_path(output_dir, prefix, "reconciliation.tsv");
        write_reconciliation_table(&run.decisions, &table_file)?;

        info!(
            "Wrote {} manifest row(s) to {}",
            run.manifest.len(),
            manifest_file.display()
        );
        run.manifest_file = Some(manifest_file);
        run.table_file = Some(table_file);
        run.log_file = Some(log_file);
        Ok(run)
    }
}
