//! Taxonomic ranks, lineages and NCBI taxonomy lookups.
//!
//! This module provides the taxonomy surface the reporting-names tools need:
//! a node with its root-to-self lineage, merged-taxid resolution and the
//! children of a taxon. `NcbiTaxonomy` loads the standard `nodes.dmp`,
//! `names.dmp` and `merged.dmp` dump files.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Taxid of the "Viruses" superkingdom.
pub const VIRUSES_TAXID: u32 = 10239;

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{source_name} line {line}: {message}")]
    Parse {
        source_name: String,
        line: usize,
        message: String,
    },
}

/// Taxonomic ranks as written in `nodes.dmp`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rank {
    Superkingdom,
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
    Strain,
    NoRank,
    Other(String),
}

impl Rank {
    pub fn as_str(&self) -> &str {
        match self {
            Rank::Superkingdom => "superkingdom",
            Rank::Kingdom => "kingdom",
            Rank::Phylum => "phylum",
            Rank::Class => "class",
            Rank::Order => "order",
            Rank::Family => "family",
            Rank::Genus => "genus",
            Rank::Species => "species",
            Rank::Strain => "strain",
            Rank::NoRank => "no rank",
            Rank::Other(rank) => rank,
        }
    }

    pub fn parse(rank: &str) -> Rank {
        match rank.trim() {
            "superkingdom" => Rank::Superkingdom,
            "kingdom" => Rank::Kingdom,
            "phylum" => Rank::Phylum,
            "class" => Rank::Class,
            "order" => Rank::Order,
            "family" => Rank::Family,
            "genus" => Rank::Genus,
            "species" => Rank::Species,
            "strain" => Rank::Strain,
            "no rank" | "" => Rank::NoRank,
            other => Rank::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEntry {
    pub taxid: u32,
    pub name: String,
    pub rank: Rank,
}

/// A taxon together with its lineage, ordered from the root to the taxon
/// itself (so the last entry describes the node).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonNode {
    pub taxid: u32,
    pub name: String,
    pub rank: Rank,
    pub lineage: Vec<LineageEntry>,
}

impl TaxonNode {
    /// Number of steps from the root, the node included.
    pub fn depth(&self) -> usize {
        self.lineage.len()
    }

    pub fn has_ancestor(&self, taxid: u32) -> bool {
        self.lineage.iter().any(|entry| entry.taxid == taxid)
    }

    pub fn ancestor_named(&self, name: &str) -> Option<&LineageEntry> {
        self.lineage.iter().find(|entry| entry.name == name)
    }

    /// Nearest entry of the given rank, looking from the node upwards.
    pub fn nearest_of_rank(&self, rank: &Rank) -> Option<&LineageEntry> {
        self.lineage.iter().rev().find(|entry| &entry.rank == rank)
    }

    pub fn is_viral(&self) -> bool {
        self.has_ancestor(VIRUSES_TAXID)
    }
}

/// Read access to a taxonomy.
pub trait TaxonomyLookup {
    /// Resolves `taxid` (following merges) to a node with its lineage.
    fn lookup(&self, taxid: u32) -> Option<TaxonNode>;

    /// Current taxid for a possibly merged one; unknown taxids map to
    /// themselves.
    fn updated_taxid(&self, taxid: u32) -> u32;

    /// Direct children of `taxid`.
    fn children(&self, taxid: u32) -> Vec<u32>;

    fn name_of(&self, taxid: u32) -> Option<String> {
        self.lookup(taxid).map(|node| node.name)
    }

    fn rank_of(&self, taxid: u32) -> Option<Rank> {
        self.lookup(taxid).map(|node| node.rank)
    }

    /// The genus the taxon belongs to, or the taxon itself when it is a genus.
    fn genus_of(&self, taxid: u32) -> Option<LineageEntry> {
        self.lookup(taxid)
            .and_then(|node| node.nearest_of_rank(&Rank::Genus).cloned())
    }
}

#[derive(Debug, Clone)]
struct NodeRecord {
    parent: u32,
    rank: Rank,
}

/// In-memory NCBI taxonomy built from the dump files.
#[derive(Debug, Default)]
pub struct NcbiTaxonomy {
    nodes: HashMap<u32, NodeRecord>,
    names: HashMap<u32, String>,
    merged: HashMap<u32, u32>,
    children: HashMap<u32, Vec<u32>>,
}

/// Splits a `.dmp` line into its fields (`a\t|\tb\t|`).
fn dmp_fields(line: &str) -> Vec<&str> {
    let line = line.trim_end_matches(['\n', '\r']);
    let line = line.strip_suffix("\t|").unwrap_or(line);
    line.split("\t|\t").map(str::trim).collect()
}

fn parse_taxid(field: Option<&&str>, source_name: &str, line: usize) -> Result<u32, TaxonomyError> {
    let field = field.copied().unwrap_or("");
    field.parse().map_err(|_| TaxonomyError::Parse {
        source_name: source_name.to_string(),
        line,
        message: format!("invalid taxid '{}'", field),
    })
}

fn open(path: &Path) -> Result<BufReader<File>, TaxonomyError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TaxonomyError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn for_each_line<R, F>(reader: R, source_name: &str, mut handle: F) -> Result<(), TaxonomyError>
where
    R: BufRead,
    F: FnMut(Vec<&str>, usize) -> Result<(), TaxonomyError>,
{
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| TaxonomyError::Parse {
            source_name: source_name.to_string(),
            line: index + 1,
            message: e.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        handle(dmp_fields(&line), index + 1)?;
    }
    Ok(())
}

impl NcbiTaxonomy {
    /// Loads `nodes.dmp`, `names.dmp` and `merged.dmp` from `dir`.
    pub fn from_dump_dir(dir: &Path) -> Result<Self, TaxonomyError> {
        Self::load(
            &dir.join("nodes.dmp"),
            &dir.join("names.dmp"),
            &dir.join("merged.dmp"),
        )
    }

    /// Loads the three dump files.
    ///
    /// # Arguments
    ///
    /// * `nodes` - `nodes.dmp`: taxid, parent and rank
    /// * `names` - `names.dmp`: only scientific names are kept
    /// * `merged` - `merged.dmp`: retired taxid → current taxid
    pub fn load(nodes: &Path, names: &Path, merged: &Path) -> Result<Self, TaxonomyError> {
        info!("Loading NCBI taxonomy from {}", nodes.display());
        let taxonomy = Self::from_readers(open(nodes)?, open(names)?, open(merged)?)?;
        info!(
            "Loaded {} nodes, {} names, {} merged taxids",
            taxonomy.len(),
            taxonomy.names.len(),
            taxonomy.merged.len()
        );
        Ok(taxonomy)
    }

    pub fn from_readers<N, M, G>(nodes: N, names: M, merged: G) -> Result<Self, TaxonomyError>
    where
        N: BufRead,
        M: BufRead,
        G: BufRead,
    {
        let mut taxonomy = NcbiTaxonomy::default();

        for_each_line(nodes, "nodes.dmp", |fields, line| {
            let taxid = parse_taxid(fields.first(), "nodes.dmp", line)?;
            let parent = parse_taxid(fields.get(1), "nodes.dmp", line)?;
            let rank = Rank::parse(fields.get(2).copied().unwrap_or(""));
            if taxid != parent {
                taxonomy.children.entry(parent).or_default().push(taxid);
            }
            taxonomy.nodes.insert(taxid, NodeRecord { parent, rank });
            Ok(())
        })?;

        for_each_line(names, "names.dmp", |fields, line| {
            if fields.get(3).copied() != Some("scientific name") {
                return Ok(());
            }
            let taxid = parse_taxid(fields.first(), "names.dmp", line)?;
            let name = fields.get(1).copied().unwrap_or("").to_string();
            taxonomy.names.insert(taxid, name);
            Ok(())
        })?;

        for_each_line(merged, "merged.dmp", |fields, line| {
            let old = parse_taxid(fields.first(), "merged.dmp", line)?;
            let new = parse_taxid(fields.get(1), "merged.dmp", line)?;
            taxonomy.merged.insert(old, new);
            Ok(())
        })?;

        for children in taxonomy.children.values_mut() {
            children.sort_unstable();
        }
        Ok(taxonomy)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn entry(&self, taxid: u32, record: &NodeRecord) -> LineageEntry {
        LineageEntry {
            taxid,
            name: self.names.get(&taxid).cloned().unwrap_or_default(),
            rank: record.rank.clone(),
        }
    }
}

impl TaxonomyLookup for NcbiTaxonomy {
    fn lookup(&self, taxid: u32) -> Option<TaxonNode> {
        let taxid = self.updated_taxid(taxid);
        let record = self.nodes.get(&taxid)?;

        let mut lineage = vec![self.entry(taxid, record)];
        let mut current = record.parent;
        let mut previous = taxid;
        while current != previous {
            let Some(parent) = self.nodes.get(&current) else {
                debug!("Lineage of {} stops at unknown taxid {}", taxid, current);
                break;
            };
            if lineage.len() > self.nodes.len() {
                warn!("Cycle in the lineage of taxid {}", taxid);
                break;
            }
            lineage.push(self.entry(current, parent));
            previous = current;
            current = parent.parent;
        }
        lineage.reverse();

        Some(TaxonNode {
            taxid,
            name: self.names.get(&taxid).cloned().unwrap_or_default(),
            rank: record.rank.clone(),
            lineage,
        })
    }

    fn updated_taxid(&self, taxid: u32) -> u32 {
        self.merged.get(&taxid).copied().unwrap_or(taxid)
    }

    fn children(&self, taxid: u32) -> Vec<u32> {
        self.children
            .get(&self.updated_taxid(taxid))
            .cloned()
            .unwrap_or_default()
    }
}

/// A small taxonomy shared by the tests of the reporting-names tools.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::NcbiTaxonomy;
    use std::io::Cursor;

    /// (taxid, parent, rank, scientific name)
    pub(crate) const NODES: &[(u32, u32, &str, &str)] = &[
        (1, 1, "no rank", "root"),
        (2, 1, "superkingdom", "Bacteria"),
        (1224, 2, "phylum", "Proteobacteria"),
        (1236, 1224, "class", "Gammaproteobacteria"),
        (91347, 1236, "order", "Enterobacterales"),
        (543, 91347, "family", "Enterobacteriaceae"),
        (561, 543, "genus", "Escherichia"),
        (562, 561, "species", "Escherichia coli"),
        (83333, 562, "strain", "Escherichia coli K-12"),
        (570, 543, "genus", "Klebsiella"),
        (573, 570, "species", "Klebsiella pneumoniae"),
        (1239, 2, "phylum", "Firmicutes"),
        (91061, 1239, "class", "Bacilli"),
        (1385, 91061, "order", "Bacillales"),
        (90964, 1385, "family", "Staphylococcaceae"),
        (1279, 90964, "genus", "Staphylococcus"),
        (1280, 1279, "species", "Staphylococcus aureus"),
        (29388, 1279, "species", "Staphylococcus capitis"),
        (2759, 1, "superkingdom", "Eukaryota"),
        (4751, 2759, "kingdom", "Fungi"),
        (4827, 4751, "order", "Mucorales"),
        (4829, 4827, "family", "Mucoraceae"),
        (4830, 4829, "genus", "Mucor"),
        (29922, 4830, "species", "Mucor mucedo"),
        (4842, 4829, "genus", "Rhizopus"),
        (64495, 4842, "species", "Rhizopus arrhizus"),
        (10239, 1, "superkingdom", "Viruses"),
        (11308, 10239, "family", "Orthomyxoviridae"),
        (197911, 11308, "genus", "Alphainfluenzavirus"),
        (11320, 197911, "species", "Influenza A virus"),
        (114727, 11320, "no rank", "H1N1 subtype"),
        (197912, 11308, "genus", "Betainfluenzavirus"),
        (11520, 197912, "species", "Influenza B virus"),
    ];

    pub(crate) const MERGED: &[(u32, u32)] = &[(12345, 562), (46170, 1280)];

    pub(crate) fn nodes_dmp() -> String {
        NODES
            .iter()
            .map(|(taxid, parent, rank, _)| format!("{}\t|\t{}\t|\t{}\t|\t\t|\n", taxid, parent, rank))
            .collect()
    }

    pub(crate) fn names_dmp() -> String {
        NODES
            .iter()
            .flat_map(|(taxid, _, _, name)| {
                [
                    format!("{}\t|\t{}\t|\t\t|\tscientific name\t|\n", taxid, name),
                    format!("{}\t|\t{} (synonym)\t|\t\t|\tsynonym\t|\n", taxid, name),
                ]
            })
            .collect()
    }

    pub(crate) fn merged_dmp() -> String {
        MERGED
            .iter()
            .map(|(old, new)| format!("{}\t|\t{}\t|\n", old, new))
            .collect()
    }

    pub(crate) fn taxonomy() -> NcbiTaxonomy {
        NcbiTaxonomy::from_readers(
            Cursor::new(nodes_dmp()),
            Cursor::new(names_dmp()),
            Cursor::new(merged_dmp()),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_rank_parse_and_as_str() {
        assert_eq!(Rank::parse("species"), Rank::Species);
        assert_eq!(Rank::parse("no rank"), Rank::NoRank);
        assert_eq!(Rank::parse("subgenus"), Rank::Other("subgenus".to_string()));
        assert_eq!(Rank::Other("clade".to_string()).as_str(), "clade");
        assert_eq!(Rank::Genus.to_string(), "genus");
    }

    #[test]
    fn test_dmp_fields() {
        assert_eq!(dmp_fields("562\t|\t561\t|\tspecies\t|"), vec!["562", "561", "species"]);
        assert_eq!(dmp_fields("1\t|\tall\t|\t\t|\tsynonym\t|\r\n").len(), 4);
    }

    #[test]
    fn test_lookup_builds_root_to_self_lineage() {
        let taxonomy = fixtures::taxonomy();
        let node = taxonomy.lookup(83333).unwrap();
        assert_eq!(node.name, "Escherichia coli K-12");
        assert_eq!(node.rank, Rank::Strain);

        let names: Vec<&str> = node.lineage.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "root",
                "Bacteria",
                "Proteobacteria",
                "Gammaproteobacteria",
                "Enterobacterales",
                "Enterobacteriaceae",
                "Escherichia",
                "Escherichia coli",
                "Escherichia coli K-12"
            ]
        );
        assert_eq!(node.depth(), 9);
        assert!(node.has_ancestor(543));
        assert!(!node.is_viral());
        assert!(taxonomy.lookup(999_999).is_none());
    }

    #[test]
    fn test_merged_and_children() {
        let taxonomy = fixtures::taxonomy();
        assert_eq!(taxonomy.updated_taxid(12345), 562);
        assert_eq!(taxonomy.updated_taxid(562), 562);
        assert_eq!(taxonomy.updated_taxid(7), 7);
        assert_eq!(taxonomy.lookup(46170).unwrap().taxid, 1280);

        assert_eq!(taxonomy.children(1279), vec![1280, 29388]);
        assert_eq!(taxonomy.children(11320), vec![114727]);
        assert!(taxonomy.children(1280).is_empty());
    }

    #[test]
    fn test_genus_of() {
        let taxonomy = fixtures::taxonomy();
        assert_eq!(taxonomy.genus_of(83333).unwrap().name, "Escherichia");
        assert_eq!(taxonomy.genus_of(561).unwrap().taxid, 561);
        assert!(taxonomy.genus_of(543).is_none());
        assert!(taxonomy.lookup(114727).unwrap().is_viral());
    }

    #[test]
    fn test_only_scientific_names_are_kept() {
        let taxonomy = fixtures::taxonomy();
        assert_eq!(taxonomy.name_of(1280).as_deref(), Some("Staphylococcus aureus"));
        assert_eq!(taxonomy.rank_of(1280), Some(Rank::Species));
    }

    #[test]
    fn test_cycle_does_not_hang() {
        let nodes = "5\t|\t6\t|\tgenus\t|\n6\t|\t5\t|\tfamily\t|\n";
        let taxonomy =
            NcbiTaxonomy::from_readers(Cursor::new(nodes), Cursor::new(""), Cursor::new("")).unwrap();
        let node = taxonomy.lookup(5).unwrap();
        assert!(node.depth() <= 3);
    }

    #[test]
    fn test_bad_taxid_is_parse_error() {
        let result = NcbiTaxonomy::from_readers(
            Cursor::new("abc\t|\t1\t|\tgenus\t|\n"),
            Cursor::new(""),
            Cursor::new(""),
        );
        assert!(matches!(result, Err(TaxonomyError::Parse { line: 1, .. })));
    }

    #[test]
    fn test_from_dump_dir() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("nodes.dmp"), fixtures::nodes_dmp()).unwrap();
        fs::write(dir.path().join("names.dmp"), fixtures::names_dmp()).unwrap();
        fs::write(dir.path().join("merged.dmp"), fixtures::merged_dmp()).unwrap();
        let taxonomy = NcbiTaxonomy::from_dump_dir(dir.path()).unwrap();
        assert_eq!(taxonomy.len(), fixtures::NODES.len());

        let missing = NcbiTaxonomy::from_dump_dir(&dir.path().join("nope"));
        assert!(matches!(missing, Err(TaxonomyError::Io { .. })));
    }
}
