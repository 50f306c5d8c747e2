//! Off-profile organisms: reporting names outside a test profile that sit
//! close enough to a profile organism to be worth flagging next to it.

use super::taxonomy::{LineageEntry, TaxonNode, TaxonomyLookup};
use crate::io::tsv_writer_builder;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

/// Families used as the anchor instead of the genus.
pub const FAMILY_EXCEPTIONS: &[&str] = &["Enterobacteriaceae", "Actinomycetaceae"];
/// Orders used as the anchor instead of the genus.
pub const ORDER_EXCEPTIONS: &[&str] = &["Mucorales"];

lazy_static! {
    static ref INFLUENZA_REGEX: Regex =
        Regex::new(r"(?i)\binfluenza\s+([ABC])\b").expect("invalid influenza regex");
}

/// Influenza type (`A`, `B` or `C`) named in a reporting name.
pub fn influenza_type(name: &str) -> Option<char> {
    INFLUENZA_REGEX
        .captures(name)
        .and_then(|caps| caps[1].chars().next())
        .map(|c| c.to_ascii_uppercase())
}

/// The lineage entry a taxon is grouped under: an excepted family or order
/// when the lineage contains one, the genus otherwise.
pub fn anchor_of(node: &TaxonNode) -> Option<LineageEntry> {
    FAMILY_EXCEPTIONS
        .iter()
        .chain(ORDER_EXCEPTIONS)
        .find_map(|name| node.ancestor_named(name))
        .or_else(|| node.nearest_of_rank(&super::taxonomy::Rank::Genus))
        .cloned()
}

fn parse_taxids(taxids: &[String]) -> impl Iterator<Item = u32> + '_ {
    taxids.iter().filter_map(|tx| tx.parse().ok())
}

/// Anchor of the first taxid that has one.
pub fn profile_anchor(taxids: &[String], taxonomy: &dyn TaxonomyLookup) -> Option<LineageEntry> {
    parse_taxids(taxids)
        .filter_map(|tx| taxonomy.lookup(tx))
        .find_map(|node| anchor_of(&node))
}

fn shares_anchor(taxids: &[String], anchor: &LineageEntry, taxonomy: &dyn TaxonomyLookup) -> bool {
    parse_taxids(taxids)
        .filter_map(|tx| taxonomy.lookup(tx))
        .any(|node| {
            node.lineage
                .iter()
                .any(|entry| entry.taxid == anchor.taxid && entry.rank == anchor.rank)
        })
}

/// Names of viral lineage ancestors and of child taxa for a reporting
/// name's taxids.
fn related_names(taxids: &[String], taxonomy: &dyn TaxonomyLookup) -> HashSet<String> {
    let mut names = HashSet::new();
    for tx in parse_taxids(taxids) {
        let Some(node) = taxonomy.lookup(tx) else {
            debug!("Taxid {} is not in the taxonomy", tx);
            continue;
        };
        if !node.is_viral() {
            continue;
        }
        names.extend(node.lineage.iter().map(|entry| entry.name.clone()));
        names.extend(
            taxonomy
                .children(node.taxid)
                .into_iter()
                .filter_map(|child| taxonomy.name_of(child)),
        );
    }
    names
}

/// Maps each profile reporting name to the off-profile reporting names
/// related to it. Profile names missing from `taxids_by_name` are skipped.
///
/// # Arguments
///
/// * `profile` - Reporting names on the test profile
/// * `taxids_by_name` - Every reporting name of the table with its taxids
/// * `taxonomy` - Lineage and children lookup
///
/// # Returns
///
/// * Profile name → related off-profile names, for profile names with at
///   least one relative
pub fn map_off_profile(
    profile: &[String],
    taxids_by_name: &IndexMap<String, Vec<String>>,
    taxonomy: &dyn TaxonomyLookup,
) -> IndexMap<String, Vec<String>> {
    let on_profile: HashSet<&str> = profile.iter().map(String::as_str).collect();
    let mut mapping = IndexMap::new();

    for organism in profile {
        let Some(taxids) = taxids_by_name.get(organism) else {
            warn!("Profile organism '{}' is not in the reporting names table", organism);
            continue;
        };
        let anchor = profile_anchor(taxids, taxonomy);
        let flu = influenza_type(organism);
        match &anchor {
            Some(a) => debug!("{} anchors at {} ({}, {})", organism, a.name, a.taxid, a.rank),
            None if flu.is_none() => {
                warn!("No anchor taxon found for profile organism '{}'", organism);
                continue;
            }
            None => {}
        }

        let candidates: Vec<(&String, &Vec<String>)> = taxids_by_name
            .iter()
            .filter(|(name, _)| !on_profile.contains(name.as_str()))
            .filter(|(name, taxids)| {
                let same_flu = flu.is_some() && influenza_type(name) == flu;
                same_flu
                    || anchor
                        .as_ref()
                        .is_some_and(|a| shares_anchor(taxids, a, taxonomy))
            })
            .collect();

        let related: Vec<HashSet<String>> = candidates
            .iter()
            .map(|(_, taxids)| related_names(taxids, taxonomy))
            .collect();
        let kept: Vec<String> = candidates
            .iter()
            .enumerate()
            .filter(|(i, (name, _))| {
                !related
                    .iter()
                    .enumerate()
                    .any(|(j, names)| j != *i && names.contains(name.as_str()))
            })
            .map(|(_, (name, _))| (*name).clone())
            .collect();

        if !kept.is_empty() {
            mapping.insert(organism.clone(), kept);
        }
    }

    info!(
        "{} of {} profile organism(s) have off-profile relatives",
        mapping.len(),
        profile.len()
    );
    mapping
}

pub fn write_off_profile(mapping: &IndexMap<String, Vec<String>>, output: &Path) -> Result<()> {
    let mut writer = tsv_writer_builder()
        .has_headers(false)
        .from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    for (organism, names) in mapping {
        writer.write_record([organism.as_str(), names.join(",").as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::taxonomy::{fixtures, Rank};
    use std::fs;
    use tempfile::tempdir;

    fn table(rows: &[(&str, &str)]) -> IndexMap<String, Vec<String>> {
        rows.iter()
            .map(|(name, taxids)| {
                (
                    name.to_string(),
                    taxids.split(',').map(str::to_string).collect(),
                )
            })
            .collect()
    }

    fn names(profile: &[&str]) -> Vec<String> {
        profile.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_influenza_type() {
        assert_eq!(influenza_type("Influenza A virus H1N1"), Some('A'));
        assert_eq!(influenza_type("influenza b"), Some('B'));
        assert_eq!(influenza_type("Parainfluenza virus 3"), None);
        assert_eq!(influenza_type("Influenza D virus"), None);
    }

    #[test]
    fn test_anchor_exceptions_and_genus() {
        let taxonomy = fixtures::taxonomy();
        let ecoli = anchor_of(&taxonomy.lookup(83333).unwrap()).unwrap();
        assert_eq!((ecoli.name.as_str(), ecoli.rank.clone()), ("Enterobacteriaceae", Rank::Family));

        let mucor = anchor_of(&taxonomy.lookup(29922).unwrap()).unwrap();
        assert_eq!(mucor.name, "Mucorales");

        let staph = anchor_of(&taxonomy.lookup(1280).unwrap()).unwrap();
        assert_eq!(staph.name, "Staphylococcus");

        assert!(anchor_of(&taxonomy.lookup(90964).unwrap()).is_none());
        let taxids = names(&["90964", "29388"]);
        assert_eq!(profile_anchor(&taxids, &taxonomy).unwrap().taxid, 1279);
    }

    #[test]
    fn test_map_off_profile() {
        let taxonomy = fixtures::taxonomy();
        let rows = table(&[
            ("Escherichia coli", "562"),
            ("Klebsiella pneumoniae", "573"),
            ("Staphylococcus aureus", "1280"),
            ("Staphylococcus capitis", "29388"),
            ("Rhizopus arrhizus", "64495"),
            ("Mucor mucedo", "29922"),
            ("Influenza A virus", "11320"),
            ("Influenza A H1N1", "114727"),
            ("Influenza B virus", "11520"),
        ]);
        let profile = names(&["Escherichia coli", "Staphylococcus aureus", "Rhizopus arrhizus", "Missing"]);
        let mapping = map_off_profile(&profile, &rows, &taxonomy);

        assert_eq!(mapping["Escherichia coli"], vec!["Klebsiella pneumoniae"]);
        assert_eq!(mapping["Staphylococcus aureus"], vec!["Staphylococcus capitis"]);
        assert_eq!(mapping["Rhizopus arrhizus"], vec!["Mucor mucedo"]);
        assert!(!mapping.contains_key("Missing"));
    }

    #[test]
    fn test_influenza_relatives_exclude_parents_and_children() {
        let taxonomy = fixtures::taxonomy();
        let rows = table(&[
            ("Influenza A H3N2", "11320"),
            ("Influenza A virus", "11320"),
            ("H1N1 subtype", "114727"),
            ("Influenza B virus", "11520"),
        ]);
        let profile = names(&["Influenza A H3N2"]);
        let mapping = map_off_profile(&profile, &rows, &taxonomy);

        // "Influenza A virus" is an ancestor of the H1N1 row and "H1N1
        // subtype" a child of the Influenza A row.
        assert!(!mapping.contains_key("Influenza A H3N2"));

        let rows = table(&[("Influenza B lineage", "11520"), ("Influenza B virus", "11520")]);
        let mapping = map_off_profile(&names(&["Influenza B lineage"]), &rows, &taxonomy);
        assert_eq!(mapping["Influenza B lineage"], vec!["Influenza B virus"]);
    }

    #[test]
    fn test_write_off_profile() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("map-off-profile.txt");
        let mut mapping = IndexMap::new();
        mapping.insert("A".to_string(), vec!["B".to_string(), "C".to_string()]);
        write_off_profile(&mapping, &out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "A\tB,C\n");
    }
}
