//! Summary of a test profile: the genus behind every reporting name and the
//! number of organisms per class.
//!
//! Profiles are JSON lines, one organism per line:
//!
//! ```text
//! {"reporting_name": "Escherichia coli", "reporting_id": 12, "class_type": "bacterial", "taxids": [562]}
//! ```

use super::taxonomy::TaxonomyLookup;
use crate::io::{tsv_writer_builder, EMPTY_FIELD};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Classes counted in the summary, in output order.
pub const COUNTED_CLASSES: [&str; 4] = ["bacterial", "viral", "fungal", "parasite"];

/// An identifier that profiles store either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ProfileId {
    Number(u64),
    Text(String),
}

impl ProfileId {
    fn as_taxid(&self) -> Option<u32> {
        match self {
            ProfileId::Number(n) => u32::try_from(*n).ok(),
            ProfileId::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileId::Number(n) => write!(f, "{}", n),
            ProfileId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfileEntry {
    pub reporting_name: String,
    pub reporting_id: ProfileId,
    pub class_type: String,
    #[serde(default)]
    pub taxids: Vec<ProfileId>,
}

/// One line of the organism summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganismSummary {
    pub reporting_name: String,
    pub genus_name: Option<String>,
    pub class_type: String,
    pub reporting_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSummary {
    pub organisms: Vec<OrganismSummary>,
    /// Count per entry of [`COUNTED_CLASSES`].
    pub class_counts: [(&'static str, usize); 4],
}

/// Reads a JSON-lines profile. UTF-8 and BOM-marked UTF-16 files are both
/// accepted; blank lines are skipped.
pub fn read_profile(path: &Path) -> Result<Vec<ProfileEntry>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read profile {}", path.display()))?;
    let (text, encoding, had_errors) = encoding_rs::UTF_8.decode(&bytes);
    if had_errors {
        warn!("{} contains bytes invalid in {}", path.display(), encoding.name());
    }

    let mut entries = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: ProfileEntry = serde_json::from_str(line)
            .with_context(|| format!("Invalid profile line {} in {}", index + 1, path.display()))?;
        entries.push(entry);
    }
    info!("Read {} profile organism(s) from {}", entries.len(), path.display());
    Ok(entries)
}

/// Finds the genus of every organism and counts organisms per class.
///
/// # Arguments
///
/// * `entries` - Profile organisms in file order
/// * `taxonomy` - Lookup used to resolve each taxid's genus
///
/// # Returns
///
/// * One summary line per organism. The genus is that of the first taxid
///   that has one; organisms without any stay `None`.
pub fn summarize_profile(entries: &[ProfileEntry], taxonomy: &dyn TaxonomyLookup) -> ProfileSummary {
    let organisms: Vec<OrganismSummary> = entries
        .iter()
        .map(|entry| {
            let genus_name = entry
                .taxids
                .iter()
                .filter_map(ProfileId::as_taxid)
                .find_map(|tx| taxonomy.genus_of(tx))
                .map(|genus| genus.name);
            if genus_name.is_none() {
                debug!("No genus found for {}", entry.reporting_name);
            }
            OrganismSummary {
                reporting_name: entry.reporting_name.clone(),
                genus_name,
                class_type: entry.class_type.clone(),
                reporting_id: entry.reporting_id.to_string(),
            }
        })
        .collect();

    let class_counts = COUNTED_CLASSES.map(|class| {
        (
            class,
            entries.iter().filter(|e| e.class_type == class).count(),
        )
    });
    ProfileSummary {
        organisms,
        class_counts,
    }
}

/// Writes `<label>_organism_summary.tsv` and `<label>_class_counts.tsv`
/// into `output_dir` and returns their paths.
pub fn write_profile_summary(
    summary: &ProfileSummary,
    output_dir: &Path,
    label: &str,
) -> Result<(PathBuf, PathBuf)> {
    let organisms_file = output_dir.join(format!("{}_organism_summary.tsv", label));
    let mut writer = tsv_writer_builder()
        .from_path(&organisms_file)
        .with_context(|| format!("Failed to create {}", organisms_file.display()))?;
    writer.write_record(["reporting_name", "genus_name", "org_class", "rep_id"])?;
    for organism in &summary.organisms {
        writer.write_record([
            organism.reporting_name.as_str(),
            organism.genus_name.as_deref().unwrap_or(EMPTY_FIELD),
            organism.class_type.as_str(),
            organism.reporting_id.as_str(),
        ])?;
    }
    writer.flush()?;

    let counts_file = output_dir.join(format!("{}_class_counts.tsv", label));
    let mut writer = tsv_writer_builder()
        .from_path(&counts_file)
        .with_context(|| format!("Failed to create {}", counts_file.display()))?;
    writer.write_record(["class_type", "count"])?;
    for (class, count) in &summary.class_counts {
        writer.write_record([class.to_string(), count.to_string()])?;
    }
    writer.flush()?;

    Ok((organisms_file, counts_file))
}
