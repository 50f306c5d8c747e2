//! Reconciliation runs over a data vault directory and their reports.

pub mod processor;
pub mod report;

pub use processor::ManifestBuilder;
pub use report::generate_report;
