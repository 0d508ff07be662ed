//! CLI command definitions using clap.
//!
//! Defines the operator toolbox:
//! - check: evaluate the pre-cycle rules once
//! - compliance: show or reset the partial-outcome counters
//! - health: run the substrate health analyzers
//! - backup / restore: substrate archives
//! - endpoint: show the inference endpoint marker
//! - config: print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// subloop - unattended cycle orchestrator for a file-backed agent substrate
#[derive(Parser, Debug)]
#[command(name = "subloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate the pre-cycle rules against the substrate and print the actions
    Check,

    /// Show persisted compliance counters
    Compliance {
        /// Clear every tracked precondition
        #[arg(long)]
        reset: bool,
    },

    /// Run the substrate health analyzers once
    Health,

    /// Archive the substrate now
    Backup {
        /// Skip checksum and listing verification
        #[arg(long)]
        no_verify: bool,
    },

    /// Restore the substrate from an archive
    Restore {
        /// Archive to restore (defaults to the newest in the backup directory)
        archive: Option<PathBuf>,
    },

    /// Show the inference endpoint status
    Endpoint,

    /// Print the effective configuration as YAML
    Config,
}
