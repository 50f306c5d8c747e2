//! Plain-text report of a reconciliation run.

use super::processor::ReconcileRun;
use std::fmt::Write;

/// Human-readable summary of a reconciliation run.
pub fn generate_report(run: &ReconcileRun) -> String {
    let mut report = String::new();
    let m = &run.metrics;

    let _ = writeln!(report, "Reconciliation Report for Prefix: {}", run.prefix);
    report.push_str("=================================================\n\n");

    report.push_str("Run Metrics:\n");
    let _ = writeln!(report, "  Files scanned: {}", m.scanned_files);
    let _ = writeln!(
        report,
        "  Files admitted: {} ({:.1}%)",
        m.admitted_files,
        100.0 * m.admitted_files as f64 / m.scanned_files.max(1) as f64
    );
    let _ = writeln!(report, "  Files rejected: {}", m.rejected_files);
    let _ = writeln!(report, "  Distinct keys: {}", m.keys);
    let _ = writeln!(
        report,
        "  Keys with duplicates: {} ({} file(s) discarded)",
        m.duplicate_keys, m.discarded_duplicates
    );
    if m.log_write_failures > 0 {
        let _ = writeln!(report, "  Log write failures: {}", m.log_write_failures);
    }
    let _ = writeln!(report, "  Processing time: {:.2} seconds\n", m.processing_time_seconds);

    if !run.rejections.is_empty() {
        report.push_str("Rejected Files:\n");
        for rejection in &run.rejections {
            let _ = writeln!(
                report,
                "  [{}] {}",
                rejection.category(),
                rejection.path().display()
            );
        }
        report.push('\n');
    }

    let duplicates: Vec<_> = run.decisions.iter().filter(|d| !d.is_singleton()).collect();
    if !duplicates.is_empty() {
        report.push_str("Duplicate Resolution:\n");
        for decision in duplicates {
            let _ = writeln!(report, "  {} -> {}", decision.key, decision.chosen.identifier);
            for rejected in &decision.rejected {
                let _ = writeln!(
                    report,
                    "    discarded {} ({})",
                    rejected.record.identifier, rejected.rule
                );
            }
        }
        report.push('\n');
    }

    for (label, path) in [
        ("Manifest", &run.manifest_file),
        ("Reconciliation table", &run.table_file),
        ("Decision log", &run.log_file),
    ] {
        if let Some(path) = path {
            let _ = writeln!(report, "{}: {}", label, path.display());
        }
    }

    report
}
