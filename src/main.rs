//! Main entry point for vault_reconcile.
//!
//! Reconciles the sequencing files of a data vault into one canonical file
//! per accession, and carries the companion checks used around it:
//! duplicate-name detection, directory comparison, blacklist flagging and
//! the reporting-names taxonomy tools.

mod bio;
mod checksum;
mod cli;
mod config;
mod duplicates;
mod io;
mod pipeline;
mod reconcile;

use anyhow::Result;
use clap::Parser;
use cli::{run_cli, Cli};
use log::info;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("Starting vault_reconcile: {:?}", cli.command);

    run_cli(cli)?;

    info!("Finished successfully.");
    Ok(())
}
