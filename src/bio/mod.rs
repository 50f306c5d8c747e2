//! Taxonomy-aware tools for the reporting-names table.

pub mod off_profile;
pub mod profile_summary;
pub mod reporting_names;
pub mod taxonomy;

pub use reporting_names::ReportingNamesTable;
pub use taxonomy::NcbiTaxonomy;
