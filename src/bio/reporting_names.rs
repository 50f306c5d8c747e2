//! The reporting-names info table: loading, consistency checks and
//! relevance ordering of each row's taxids.

use super::taxonomy::{Rank, TaxonomyLookup};
use crate::io::{tsv_reader_builder, tsv_writer_builder, EMPTY_FIELD};
use csv::StringRecord;
use indexmap::IndexMap;
use itertools::Itertools;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

lazy_static! {
    static ref COMPOUND_ID_REGEX: Regex =
        Regex::new(r"^([0-9]+)_([0-9]+)$").expect("invalid compound id regex");
}

pub const REPORTING_NAME: &str = "reporting_name";
pub const REPORTING_ID: &str = "reporting_id";
pub const TAXIDS: &str = "taxids";
pub const COMPOUND_ID: &str = "compound_id";
pub const CLASS_TYPE: &str = "class_type";
pub const SUBCLASS: &str = "subclass";
pub const NUCLEIC_ACID: &str = "nucleic_acid";
pub const PARENT_REPORTING_NAME: &str = "parent_reporting_name";
pub const CHILDREN_REPORTING_NAMES: &str = "children_reporting_names";
pub const SEMANTIC_GROUP: &str = "semantic_group";

const VIRAL_SUBCLASSES: &[&str] = &[
    "plant_virus",
    "protist_virus",
    "fungal_virus",
    "virophage",
    "viral",
    "endogenous_virus",
    "phage",
    "armored_rna",
];
const NUCLEIC_ACID_TYPES: &[&str] = &["unclear", "RNA", "retro", "DNA"];

/// Number of taxids shown in the reordering log.
const PREVIEW_TAXIDS: usize = 20;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Failed to read table {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write table {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Table {} has no '{column}' column", .path.display())]
    MissingColumn { path: PathBuf, column: String },
}

/// One data row. `line` is the 1-based line in the source file.
#[derive(Debug, Clone)]
pub struct NameRow {
    pub line: usize,
    pub record: StringRecord,
}

#[derive(Debug, Clone)]
pub struct ReportingNamesTable {
    path: PathBuf,
    headers: StringRecord,
    columns: IndexMap<String, usize>,
    pub rows: Vec<NameRow>,
}

impl ReportingNamesTable {
    /// Loads a tab-separated table with a header row. Rows may be ragged.
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let read_error = |source: csv::Error| TableError::Read {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = tsv_reader_builder()
            .flexible(true)
            .quoting(false)
            .from_path(path)
            .map_err(read_error)?;
        let headers = reader.headers().map_err(read_error)?.clone();

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(read_error)?;
            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(index + 2);
            rows.push(NameRow { line, record });
        }
        info!("Loaded {} reporting name(s) from {}", rows.len(), path.display());
        Ok(Self::from_parts(path, headers, rows))
    }

    fn from_parts(path: &Path, headers: StringRecord, rows: Vec<NameRow>) -> Self {
        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        ReportingNamesTable {
            path: path.to_path_buf(),
            headers,
            columns,
            rows,
        }
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    pub fn column(&self, name: &str) -> Result<usize, TableError> {
        self.columns
            .get(name)
            .copied()
            .ok_or_else(|| TableError::MissingColumn {
                path: self.path.clone(),
                column: name.to_string(),
            })
    }

    /// Reporting name → taxids, in table order. Later duplicates are ignored.
    pub fn taxids_by_name(&self) -> Result<IndexMap<String, Vec<String>>, TableError> {
        let name_col = self.column(REPORTING_NAME)?;
        let taxid_col = self.column(TAXIDS)?;
        let mut map = IndexMap::new();
        for row in &self.rows {
            map.entry(field(row, name_col).to_string())
                .or_insert_with(|| split_list(field(row, taxid_col)));
        }
        Ok(map)
    }

    /// Writes the table back out, header first.
    pub fn write(&self, output: &Path) -> Result<(), TableError> {
        let write_error = |source: csv::Error| TableError::Write {
            path: output.to_path_buf(),
            source,
        };
        let mut writer = tsv_writer_builder()
            .flexible(true)
            .quote_style(csv::QuoteStyle::Never)
            .from_path(output)
            .map_err(write_error)?;
        writer.write_record(&self.headers).map_err(write_error)?;
        for row in &self.rows {
            writer.write_record(&row.record).map_err(write_error)?;
        }
        writer.flush().map_err(|e| write_error(e.into()))?;
        Ok(())
    }
}

fn field(row: &NameRow, column: usize) -> &str {
    row.record.get(column).map(str::trim).unwrap_or("")
}

/// Replaces one field of a row, leaving the others untouched.
fn set_field(row: &mut NameRow, column: usize, value: &str) {
    row.record = row
        .record
        .iter()
        .enumerate()
        .map(|(i, old)| if i == column { value } else { old })
        .collect();
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_unset(value: &str) -> bool {
    value.is_empty() || value == EMPTY_FIELD
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    DuplicateReportingName,
    DuplicateTaxid(String),
    DuplicateReportingId(String),
    NonIntegerReportingId(String),
    DuplicateCompoundId(String),
    MalformedCompoundId(String),
    OutdatedCompoundId { compound_id: String, updated: String },
    OutdatedTaxid { taxid: u32, updated: u32 },
    NonNumericTaxid(String),
    RaggedRow { fields: usize, expected: usize },
    EmptyField(&'static str),
    SubclassMismatch { class_type: String, subclass: String },
    UnknownNucleicAcid(String),
}

impl IssueKind {
    pub fn code(&self) -> &'static str {
        match self {
            IssueKind::DuplicateReportingName => "duplicate_reporting_name",
            IssueKind::DuplicateTaxid(_) => "duplicate_taxid",
            IssueKind::DuplicateReportingId(_) => "duplicate_reporting_id",
            IssueKind::NonIntegerReportingId(_) => "non_integer_reporting_id",
            IssueKind::DuplicateCompoundId(_) => "duplicate_compound_id",
            IssueKind::MalformedCompoundId(_) => "malformed_compound_id",
            IssueKind::OutdatedCompoundId { .. } => "outdated_compound_id",
            IssueKind::OutdatedTaxid { .. } => "outdated_taxid",
            IssueKind::NonNumericTaxid(_) => "non_numeric_taxid",
            IssueKind::RaggedRow { .. } => "ragged_row",
            IssueKind::EmptyField(_) => "empty_field",
            IssueKind::SubclassMismatch { .. } => "subclass_mismatch",
            IssueKind::UnknownNucleicAcid(_) => "unknown_nucleic_acid",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::DuplicateReportingName => write!(f, "reporting name appears more than once"),
            IssueKind::DuplicateTaxid(tx) => write!(f, "taxid {} is listed more than once", tx),
            IssueKind::DuplicateReportingId(id) => write!(f, "reporting id {} is not unique", id),
            IssueKind::NonIntegerReportingId(id) => write!(f, "reporting id '{}' is not an integer", id),
            IssueKind::DuplicateCompoundId(id) => write!(f, "compound id {} is not unique", id),
            IssueKind::MalformedCompoundId(id) => {
                write!(f, "compound id '{}' is not <reporting_id>_<taxid>", id)
            }
            IssueKind::OutdatedCompoundId { compound_id, updated } => {
                write!(f, "compound id {} is outdated, expected {}", compound_id, updated)
            }
            IssueKind::OutdatedTaxid { taxid, updated } => {
                write!(f, "taxid {} has been merged into {}", taxid, updated)
            }
            IssueKind::NonNumericTaxid(tx) => write!(f, "taxid '{}' is not numeric", tx),
            IssueKind::RaggedRow { fields, expected } => {
                write!(f, "row has {} field(s), header has {}", fields, expected)
            }
            IssueKind::EmptyField(column) => write!(f, "{} is empty", column),
            IssueKind::SubclassMismatch { class_type, subclass } => {
                write!(f, "subclass '{}' does not fit class '{}'", subclass, class_type)
            }
            IssueKind::UnknownNucleicAcid(value) => {
                write!(f, "nucleic acid '{}' is not one of {}", value, NUCLEIC_ACID_TYPES.join("/"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub line: usize,
    pub reporting_name: String,
    pub kind: IssueKind,
}

fn subclass_fits(class_type: &str, subclass: &str) -> bool {
    match class_type {
        "bacterial" | "fungal" | "parasite" => subclass == class_type,
        "viral" => VIRAL_SUBCLASSES.contains(&subclass),
        _ => true,
    }
}

/// Runs every table check and returns the issues in row order.
///
/// # Arguments
///
/// * `table` - The reporting names table
/// * `taxonomy` - Used to spot merged taxids
///
/// # Returns
///
/// * Issues in row order, or `MissingColumn` when a checked column is absent
pub fn validate(
    table: &ReportingNamesTable,
    taxonomy: &dyn TaxonomyLookup,
) -> Result<Vec<ValidationIssue>, TableError> {
    let name_col = table.column(REPORTING_NAME)?;
    let repid_col = table.column(REPORTING_ID)?;
    let taxid_col = table.column(TAXIDS)?;
    let compound_col = table.column(COMPOUND_ID)?;
    let class_col = table.column(CLASS_TYPE)?;
    let subclass_col = table.column(SUBCLASS)?;
    let nucleic_col = table.column(NUCLEIC_ACID)?;
    let relation_cols = [
        (PARENT_REPORTING_NAME, table.column(PARENT_REPORTING_NAME)?),
        (CHILDREN_REPORTING_NAMES, table.column(CHILDREN_REPORTING_NAMES)?),
        (SEMANTIC_GROUP, table.column(SEMANTIC_GROUP)?),
    ];
    let expected = table.headers().len();

    let mut names = HashSet::new();
    let mut taxids = HashSet::new();
    let mut repids = HashSet::new();
    let mut compound_ids = HashSet::new();
    let mut issues = Vec::new();

    for row in &table.rows {
        let reporting_name = field(row, name_col);
        let mut report = |kind: IssueKind| {
            issues.push(ValidationIssue {
                line: row.line,
                reporting_name: reporting_name.to_string(),
                kind,
            })
        };

        if row.record.len() != expected {
            report(IssueKind::RaggedRow {
                fields: row.record.len(),
                expected,
            });
        }
        if !names.insert(reporting_name.to_string()) {
            report(IssueKind::DuplicateReportingName);
        }

        let repid = field(row, repid_col);
        if !repids.insert(repid.to_string()) {
            report(IssueKind::DuplicateReportingId(repid.to_string()));
        }
        if repid.parse::<i64>().is_err() {
            report(IssueKind::NonIntegerReportingId(repid.to_string()));
        }

        for taxid in split_list(field(row, taxid_col)) {
            if !taxids.insert(taxid.clone()) {
                report(IssueKind::DuplicateTaxid(taxid.clone()));
            }
            match taxid.parse::<u32>() {
                Ok(tx) => {
                    let updated = taxonomy.updated_taxid(tx);
                    if updated != tx {
                        report(IssueKind::OutdatedTaxid { taxid: tx, updated });
                    }
                }
                Err(_) => report(IssueKind::NonNumericTaxid(taxid)),
            }
        }

        let compound_id = field(row, compound_col);
        if !compound_ids.insert(compound_id.to_string()) {
            report(IssueKind::DuplicateCompoundId(compound_id.to_string()));
        }
        let compound_taxid = COMPOUND_ID_REGEX
            .captures(compound_id)
            .and_then(|caps| Some((caps.get(1)?.as_str(), caps[2].parse::<u32>().ok()?)));
        match compound_taxid {
            Some((repid_part, tx)) => {
                let updated = taxonomy.updated_taxid(tx);
                if updated != tx {
                    report(IssueKind::OutdatedCompoundId {
                        compound_id: compound_id.to_string(),
                        updated: format!("{}_{}", repid_part, updated),
                    });
                }
            }
            None => report(IssueKind::MalformedCompoundId(compound_id.to_string())),
        }

        for (column, index) in relation_cols {
            if field(row, index).is_empty() {
                report(IssueKind::EmptyField(column));
            }
        }

        let class_type = field(row, class_col);
        let subclass = field(row, subclass_col).split(',').next().unwrap_or("").trim();
        if !subclass_fits(class_type, subclass) {
            report(IssueKind::SubclassMismatch {
                class_type: class_type.to_string(),
                subclass: subclass.to_string(),
            });
        }
        let nucleic_acid = field(row, nucleic_col);
        if class_type == "viral" && !NUCLEIC_ACID_TYPES.contains(&nucleic_acid) {
            report(IssueKind::UnknownNucleicAcid(nucleic_acid.to_string()));
        }
    }

    if issues.is_empty() {
        info!("{} passed all checks", table.path.display());
    } else {
        warn!("{} issue(s) found in {}", issues.len(), table.path.display());
    }
    Ok(issues)
}

/// Sets the subclass of bacterial, fungal and parasite rows whose first
/// subclass does not match their class type. Viral rows are left for
/// manual review since no single subclass can be inferred.
///
/// # Arguments
///
/// * `table` - Table to fix in place
///
/// # Returns
///
/// * The number of rows changed
pub fn fix_subclasses(table: &mut ReportingNamesTable) -> Result<usize, TableError> {
    let name_col = table.column(REPORTING_NAME)?;
    let class_col = table.column(CLASS_TYPE)?;
    let subclass_col = table.column(SUBCLASS)?;

    let mut fixed = 0;
    for row in &mut table.rows {
        let class_type = field(row, class_col).to_string();
        if !matches!(class_type.as_str(), "bacterial" | "fungal" | "parasite") {
            continue;
        }
        let subclass = field(row, subclass_col).split(',').next().unwrap_or("").trim();
        if subclass_fits(&class_type, subclass) {
            continue;
        }
        info!(
            "Line {}: subclass of '{}' set to {}",
            row.line,
            field(row, name_col),
            class_type
        );
        while row.record.len() <= subclass_col {
            row.record.push_field("");
        }
        set_field(row, subclass_col, &class_type);
        fixed += 1;
    }
    Ok(fixed)
}

pub fn write_issues(issues: &[ValidationIssue], output: &Path) -> anyhow::Result<()> {
    let mut writer = tsv_writer_builder().from_path(output)?;
    writer.write_record(["line", "reporting_name", "check", "message"])?;
    for issue in issues {
        writer.write_record([
            issue.line.to_string(),
            issue.reporting_name.clone(),
            issue.kind.code().to_string(),
            issue.kind.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// A row that declares a parent, children or semantic group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticRelation {
    pub reporting_name: String,
    pub parent: String,
    pub children: String,
    pub semantic_group: String,
    /// `T`/`F` when only a semantic group is set and it does or does not
    /// equal the reporting name; `.` otherwise.
    pub match_flag: &'static str,
}

pub fn semantic_relations(table: &ReportingNamesTable) -> Result<Vec<SemanticRelation>, TableError> {
    let name_col = table.column(REPORTING_NAME)?;
    let parent_col = table.column(PARENT_REPORTING_NAME)?;
    let children_col = table.column(CHILDREN_REPORTING_NAMES)?;
    let group_col = table.column(SEMANTIC_GROUP)?;

    Ok(table
        .rows
        .iter()
        .filter_map(|row| {
            let reporting_name = field(row, name_col);
            let parent = field(row, parent_col);
            let children = field(row, children_col);
            let semantic_group = field(row, group_col);

            let match_flag = if !is_unset(parent) || !is_unset(children) {
                EMPTY_FIELD
            } else if is_unset(semantic_group) {
                return None;
            } else if semantic_group == reporting_name {
                "T"
            } else {
                "F"
            };
            Some(SemanticRelation {
                reporting_name: reporting_name.to_string(),
                parent: parent.to_string(),
                children: children.to_string(),
                semantic_group: semantic_group.to_string(),
                match_flag,
            })
        })
        .collect())
}

pub fn write_semantic_relations(relations: &[SemanticRelation], output: &Path) -> anyhow::Result<()> {
    let mut writer = tsv_writer_builder().from_path(output)?;
    writer.write_record([
        REPORTING_NAME,
        PARENT_REPORTING_NAME,
        CHILDREN_REPORTING_NAMES,
        SEMANTIC_GROUP,
        "rname_sgroup_match_flag",
    ])?;
    for r in relations {
        writer.write_record([
            r.reporting_name.as_str(),
            r.parent.as_str(),
            r.children.as_str(),
            r.semantic_group.as_str(),
            r.match_flag,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Shape of a row's taxid list in terms of species and non-species taxids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelevanceFlag {
    Species,
    MultiSpecies,
    SpeciesAndNonSpecies,
    SpeciesAndMultiNonSpecies,
    MultiSpeciesAndNonSpecies,
    MultiSpeciesAndMultiNonSpecies,
    NoSpecies,
    MultiNonSpecies,
    Empty,
}

impl RelevanceFlag {
    pub fn classify(species: usize, non_species: usize) -> Self {
        match (species, non_species) {
            (0, 0) => RelevanceFlag::Empty,
            (0, 1) => RelevanceFlag::NoSpecies,
            (0, _) => RelevanceFlag::MultiNonSpecies,
            (1, 0) => RelevanceFlag::Species,
            (1, 1) => RelevanceFlag::SpeciesAndNonSpecies,
            (1, _) => RelevanceFlag::SpeciesAndMultiNonSpecies,
            (_, 0) => RelevanceFlag::MultiSpecies,
            (_, 1) => RelevanceFlag::MultiSpeciesAndNonSpecies,
            (_, _) => RelevanceFlag::MultiSpeciesAndMultiNonSpecies,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelevanceFlag::Species => "SPECIES",
            RelevanceFlag::MultiSpecies => "MULTI-SPECIES",
            RelevanceFlag::SpeciesAndNonSpecies => "SPECIES + NON-SPECIES",
            RelevanceFlag::SpeciesAndMultiNonSpecies => "SPECIES + MULTI-NON-SPECIES",
            RelevanceFlag::MultiSpeciesAndNonSpecies => "MULTI-SPECIES + NON-SPECIES",
            RelevanceFlag::MultiSpeciesAndMultiNonSpecies => "MULTI-SPECIES + MULTI-NON-SPECIES",
            RelevanceFlag::NoSpecies => "NO SPECIES",
            RelevanceFlag::MultiNonSpecies => "MULTI-NON-SPECIES",
            RelevanceFlag::Empty => "EMPTY",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RelevanceFlag::Species => "a single species taxid exists",
            RelevanceFlag::MultiSpecies => "multiple species taxids exist",
            RelevanceFlag::SpeciesAndNonSpecies => {
                "a single species taxid and a single non-species taxid exist"
            }
            RelevanceFlag::SpeciesAndMultiNonSpecies => {
                "a single species taxid and multiple non-species taxids exist"
            }
            RelevanceFlag::MultiSpeciesAndNonSpecies => {
                "multiple species taxids and a single non-species taxid exist"
            }
            RelevanceFlag::MultiSpeciesAndMultiNonSpecies => {
                "multiple species taxids and multiple non-species taxids exist"
            }
            RelevanceFlag::NoSpecies => "a single non-species taxid exists",
            RelevanceFlag::MultiNonSpecies => "multiple non-species taxids exist",
            RelevanceFlag::Empty => "no taxids listed",
        }
    }
}

/// Relevance ordering of one row's taxids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxidOrder {
    pub reporting_name: String,
    pub class_type: String,
    pub flag: RelevanceFlag,
    pub species: Vec<String>,
    pub non_species: Vec<String>,
    /// Species first, then non-species.
    pub ordered: Vec<String>,
    pub chosen_rank: Option<Rank>,
}

impl TaxidOrder {
    pub fn chosen(&self) -> Option<&str> {
        self.ordered.first().map(String::as_str)
    }
}

/// Splits `taxids` into species and non-species and sorts each part by
/// lineage depth, then taxid. Taxids the taxonomy does not know (or that
/// are not numeric) come last, in their original order.
pub fn order_taxids(
    reporting_name: &str,
    class_type: &str,
    taxids: &[String],
    taxonomy: &dyn TaxonomyLookup,
) -> TaxidOrder {
    let mut species = Vec::new();
    let mut non_species = Vec::new();
    let mut unknown = Vec::new();

    for taxid in taxids {
        let node = taxid.parse::<u32>().ok().and_then(|tx| taxonomy.lookup(tx));
        match node {
            Some(node) if node.rank == Rank::Species => species.push((node.depth(), node.taxid, taxid)),
            Some(node) => non_species.push((node.depth(), node.taxid, taxid)),
            None => unknown.push(taxid.clone()),
        }
    }
    species.sort();
    non_species.sort();

    let species: Vec<String> = species.into_iter().map(|(_, _, tx)| tx.clone()).collect();
    let non_species: Vec<String> = non_species
        .into_iter()
        .map(|(_, _, tx)| tx.clone())
        .chain(unknown)
        .collect();
    let ordered: Vec<String> = species.iter().chain(non_species.iter()).cloned().collect();
    let chosen_rank = ordered
        .first()
        .and_then(|tx| tx.parse::<u32>().ok())
        .and_then(|tx| taxonomy.rank_of(tx));

    TaxidOrder {
        reporting_name: reporting_name.to_string(),
        class_type: class_type.to_string(),
        flag: RelevanceFlag::classify(species.len(), non_species.len()),
        species,
        non_species,
        ordered,
        chosen_rank,
    }
}

/// Reorders the taxids of every row in place and returns one entry per row.
pub fn reorder_table(
    table: &mut ReportingNamesTable,
    taxonomy: &dyn TaxonomyLookup,
) -> Result<Vec<TaxidOrder>, TableError> {
    let name_col = table.column(REPORTING_NAME)?;
    let taxid_col = table.column(TAXIDS)?;
    let class_col = table.column(CLASS_TYPE).ok();

    let mut orders = Vec::with_capacity(table.rows.len());
    for row in &mut table.rows {
        let class_type = class_col.map(|c| field(row, c)).unwrap_or("");
        let order = order_taxids(
            field(row, name_col),
            class_type,
            &split_list(field(row, taxid_col)),
            taxonomy,
        );

        set_field(row, taxid_col, &order.ordered.join(","));
        orders.push(order);
    }

    let counts = orders.iter().counts_by(|o| o.flag.as_str());
    for (flag, count) in counts.iter().sorted() {
        info!("{}: {} row(s)", flag, count);
    }
    Ok(orders)
}

fn join_or_empty(values: &[String]) -> String {
    if values.is_empty() {
        EMPTY_FIELD.to_string()
    } else {
        values.join(",")
    }
}

pub fn write_taxid_orders(orders: &[TaxidOrder], output: &Path) -> anyhow::Result<()> {
    let mut writer = tsv_writer_builder().from_path(output)?;
    writer.write_record([
        "flag",
        REPORTING_NAME,
        CLASS_TYPE,
        "flag_description",
        "species_tx",
        "non_species_tx",
        "chosen_tx",
        "chosen_rank",
        "first_20_taxids",
    ])?;
    for order in orders {
        let first = &order.ordered[..order.ordered.len().min(PREVIEW_TAXIDS)];
        writer.write_record([
            order.flag.as_str().to_string(),
            order.reporting_name.clone(),
            order.class_type.clone(),
            order.flag.description().to_string(),
            join_or_empty(&order.species),
            join_or_empty(&order.non_species),
            order.chosen().unwrap_or(EMPTY_FIELD).to_string(),
            order
                .chosen_rank
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| EMPTY_FIELD.to_string()),
            join_or_empty(first),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
