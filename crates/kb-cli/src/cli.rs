//! CLI argument parsing using clap derive

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// KB command registry - discover, cache, and replicate plugin commands
#[derive(Parser, Debug)]
#[command(name = "kb-registry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace root
    #[arg(long, global = true, default_value = ".", env = "KB_ROOT")]
    pub root: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Scan the workspace for command packages without writing a snapshot
    Discover {
        /// Bypass both discovery cache tiers
        #[arg(long)]
        no_cache: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// List commands from the current snapshot
    List {
        /// Include shadowed and unavailable commands
        #[arg(short, long)]
        all: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Run discovery and publish a new snapshot
    Refresh {
        /// Bypass both discovery cache tiers
        #[arg(long)]
        no_cache: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Show registry health
    Health {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Refresh periodically until interrupted (producer)
    Serve,

    /// Follow the published snapshot until interrupted (consumer)
    Watch,
}
