//! Command-line interface.
//!
//! Each subcommand loads its inputs, calls into the library modules and
//! prints a one-line summary; the detailed progress goes to the log.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};

use crate::bio::off_profile::{map_off_profile, write_off_profile};
use crate::bio::profile_summary::{read_profile, summarize_profile, write_profile_summary};
use crate::bio::reporting_names::{
    fix_subclasses, reorder_table, semantic_relations, validate, write_issues,
    write_semantic_relations, write_taxid_orders,
};
use crate::bio::{NcbiTaxonomy, ReportingNamesTable};
use crate::checksum::{compare_directories, write_comparison, CompareMode};
use crate::config::ReconcileConfig;
use crate::duplicates::check_directories;
use crate::io::decision_log::{apply_flags_to_blacklist, flags_by_file_name, read_log};
use crate::io::{fill_repids, read_lines, read_manifest, read_release_repids, write_manifest};
use crate::pipeline::{generate_report, ManifestBuilder};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON file with reconciliation settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of worker threads (0 = all cores)
    #[arg(long, global = true, default_value_t = 0)]
    pub threads: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a data vault directory, resolve duplicate accessions and write the manifest
    Reconcile {
        /// Directory to scan recursively
        #[arg(short, long)]
        input: PathBuf,

        /// Prefix for the output file names and the manifest's prefix column
        #[arg(short, long)]
        prefix: String,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Minimum file size in bytes (overrides the config)
        #[arg(long)]
        min_file_size: Option<u64>,

        /// Marker preferred by the tie-breaker (overrides the config)
        #[arg(long)]
        marker: Option<String>,

        /// Print a summary report when done
        #[arg(long)]
        report: bool,
    },

    /// Report files that share a file name across sub-folders
    Duplicates {
        #[arg(short, long)]
        input: PathBuf,

        /// Also list files here whose names are absent from the input directory
        #[arg(short, long)]
        compare: Option<PathBuf>,

        #[arg(short, long, default_value = ".fastq.gz")]
        suffix: String,

        #[arg(short, long, default_value = "duplicates.logfile.tsv")]
        output: PathBuf,
    },

    /// Compare two directories file by file
    Compare {
        #[arg(long)]
        left: PathBuf,

        #[arg(long)]
        right: PathBuf,

        #[arg(short, long, value_enum, default_value_t = CompareMode::Checksum)]
        mode: CompareMode,

        #[arg(short, long, default_value = ".gz")]
        suffix: String,

        #[arg(short, long, default_value = "comparison.tsv")]
        output: PathBuf,
    },

    /// Set the flag column of a blacklist from a decision log
    Blacklist {
        #[arg(short, long)]
        log: PathBuf,

        #[arg(short, long)]
        blacklist: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Check a reporting names table against the NCBI taxonomy
    ValidateNames {
        /// Reporting names info table
        #[arg(short, long)]
        table: PathBuf,

        /// Directory holding nodes.dmp, names.dmp and merged.dmp
        #[arg(long)]
        taxonomy: PathBuf,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Also write a copy of the table with missing bacterial, fungal and
        /// parasite subclasses filled in
        #[arg(long)]
        fixed_table: Option<PathBuf>,
    },

    /// Reorder each reporting name's taxids by relevance
    ReorderTaxids {
        #[arg(short, long)]
        table: PathBuf,

        #[arg(long)]
        taxonomy: PathBuf,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Map profile organisms to related off-profile reporting names
    OffProfile {
        /// One profile reporting name per line
        #[arg(short, long)]
        profile: PathBuf,

        #[arg(short, long)]
        table: PathBuf,

        #[arg(long)]
        taxonomy: PathBuf,

        #[arg(short, long, default_value = "map-off-profile.txt")]
        output: PathBuf,
    },

    /// Summarize a JSON-lines test profile: genus per organism and class counts
    SummarizeProfile {
        #[arg(short, long)]
        profile: PathBuf,

        #[arg(long)]
        taxonomy: PathBuf,

        /// Label used in the output file names, e.g. RPIP_5.8.1
        #[arg(short, long)]
        label: String,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Fill a manifest's repids_expected column from a product-release manifest
    MapRepids {
        #[arg(short, long)]
        manifest: PathBuf,

        /// Release manifest with accession and repids_expected columns
        #[arg(short, long)]
        release: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<ReconcileConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            ReconcileConfig::from_json_file(path)
        }
        None => Ok(ReconcileConfig::default()),
    }
}

fn load_taxonomy(dir: &Path) -> Result<NcbiTaxonomy> {
    let taxonomy = NcbiTaxonomy::from_dump_dir(dir)
        .with_context(|| format!("Failed to load NCBI taxonomy from {}", dir.display()))?;
    if taxonomy.is_empty() {
        anyhow::bail!("No taxa found in {}/nodes.dmp", dir.display());
    }
    Ok(taxonomy)
}

fn create_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))
}

/// Main entry point for CLI
pub fn run_cli(cli: Cli) -> Result<()> {
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure the thread pool")?;
        info!("Using {} threads.", cli.threads);
    }

    match cli.command {
        Commands::Reconcile {
            input,
            prefix,
            output,
            min_file_size,
            marker,
            report,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(min_file_size) = min_file_size {
                config.min_file_size = min_file_size;
            }
            if let Some(marker) = marker {
                config.marker = marker;
            }
            info!("Reconciling {} with {:?}", input.display(), config);

            let builder = ManifestBuilder::new(config);
            let run = builder.process_directory(&input, &prefix, &output)?;
            println!(
                "{} key(s), {} duplicate(s) discarded, {} file(s) rejected",
                run.metrics.keys, run.metrics.discarded_duplicates, run.metrics.rejected_files
            );
            if report {
                println!("{}", generate_report(&run));
            }
            Ok(())
        }
        Commands::Duplicates {
            input,
            compare,
            suffix,
            output,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let report = check_directories(&input, compare.as_deref(), &suffix, &config.marker)?;
            report.write_tsv(&output)?;
            println!(
                "{} duplicate(s) among {} file name(s); written to {}",
                report.duplicate_count(),
                report.distinct_names,
                output.display()
            );
            Ok(())
        }
        Commands::Compare {
            left,
            right,
            mode,
            suffix,
            output,
        } => {
            let rows = compare_directories(&left, &right, &suffix, mode)?;
            write_comparison(&rows, &output)?;
            println!("Compared {} key(s); written to {}", rows.len(), output.display());
            Ok(())
        }
        Commands::Blacklist {
            log,
            blacklist,
            output,
        } => {
            let entries = read_log(&log)?;
            let flags = flags_by_file_name(&entries);
            let updated = apply_flags_to_blacklist(&blacklist, &output, &flags)?;
            println!("Updated {} blacklist row(s); written to {}", updated, output.display());
            Ok(())
        }
        Commands::ValidateNames {
            table,
            taxonomy,
            output,
            fixed_table,
        } => {
            let taxonomy = load_taxonomy(&taxonomy)?;
            let table = ReportingNamesTable::load(&table)?;
            create_output_dir(&output)?;

            let issues = validate(&table, &taxonomy)?;
            let issues_file = output.join("reporting_name_error_log.tsv");
            write_issues(&issues, &issues_file)?;

            let relations = semantic_relations(&table)?;
            let relations_file = output.join("reporting_name_semantic_relations.tsv");
            write_semantic_relations(&relations, &relations_file)?;

            if let Some(fixed_table) = fixed_table {
                let mut table = table;
                let fixed = fix_subclasses(&mut table)?;
                table.write(&fixed_table)?;
                println!(
                    "{} subclass(es) filled in; table written to {}",
                    fixed,
                    fixed_table.display()
                );
            }

            println!(
                "{} issue(s) written to {}; {} semantic relation(s) written to {}",
                issues.len(),
                issues_file.display(),
                relations.len(),
                relations_file.display()
            );
            Ok(())
        }
        Commands::ReorderTaxids {
            table,
            taxonomy,
            output,
        } => {
            let taxonomy = load_taxonomy(&taxonomy)?;
            let mut names = ReportingNamesTable::load(&table)?;
            create_output_dir(&output)?;

            let orders = reorder_table(&mut names, &taxonomy)?;
            let log_file = output.join("reporting_name_tx_rank.tsv");
            write_taxid_orders(&orders, &log_file)?;

            let stem = table
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "reporting_names".to_string());
            let table_file = output.join(format!("{}_taxids_reordered.txt", stem));
            names.write(&table_file)?;
            println!(
                "Reordered {} row(s); table written to {}, log to {}",
                orders.len(),
                table_file.display(),
                log_file.display()
            );
            Ok(())
        }
        Commands::OffProfile {
            profile,
            table,
            taxonomy,
            output,
        } => {
            let taxonomy = load_taxonomy(&taxonomy)?;
            let profile = read_lines(&profile)?;
            let table = ReportingNamesTable::load(&table)?;
            let mapping = map_off_profile(&profile, &table.taxids_by_name()?, &taxonomy);
            write_off_profile(&mapping, &output)?;
            println!(
                "{} profile organism(s) mapped; written to {}",
                mapping.len(),
                output.display()
            );
            Ok(())
        }
        Commands::SummarizeProfile {
            profile,
            taxonomy,
            label,
            output,
        } => {
            let taxonomy = load_taxonomy(&taxonomy)?;
            let entries = read_profile(&profile)?;
            create_output_dir(&output)?;
            let summary = summarize_profile(&entries, &taxonomy);
            let (organisms_file, counts_file) = write_profile_summary(&summary, &output, &label)?;
            println!(
                "{} organism(s) summarized; written to {} and {}",
                summary.organisms.len(),
                organisms_file.display(),
                counts_file.display()
            );
            Ok(())
        }
        Commands::MapRepids {
            manifest,
            release,
            output,
        } => {
            let repids = read_release_repids(&release)?;
            let mut rows = read_manifest(&manifest)?;
            let filled = fill_repids(&mut rows, &repids);
            write_manifest(&rows, &output)?;
            println!(
                "Filled {} of {} row(s); written to {}",
                filled,
                rows.len(),
                output.display()
            );
            Ok(())
        }
    }
}
