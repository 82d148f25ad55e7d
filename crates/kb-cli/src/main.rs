//! KB command registry CLI
//!
//! Operator front-end for discovery, snapshots, and replication.
//!
//! # Environment Variables
//!
//! - `KB_ROOT`: workspace root (default: current directory)
//! - `KB_LOG_LEVEL`: log level, overridden by `--verbose`
//! - `RUST_LOG`: log filter when neither of the above is set
//!
//! Logs go to stderr so that `--json` output on stdout stays parseable.

mod cli;
mod commands;
mod context;
mod error;
mod logging;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use context::Context;
use error::{CliError, Result};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let ctx = Context::load(&cli.root).await?;

    let level = logging::resolve_level(cli.verbose, ctx.log_level());
    logging::init(level.as_deref()).map_err(|e| CliError::Logging(e.to_string()))?;
    tracing::debug!(root = %ctx.root().display(), "registry context loaded");

    execute_command(&ctx, cli.command).await
}

async fn execute_command(ctx: &Context, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Discover { no_cache, json } => commands::run_discover(ctx, no_cache, json).await,
        Commands::List { all, json } => commands::run_list(ctx, all, json).await,
        Commands::Refresh { no_cache, json } => commands::run_refresh(ctx, no_cache, json).await,
        Commands::Health { json } => commands::run_health(ctx, json).await,
        Commands::Serve => commands::run_serve(ctx).await,
        Commands::Watch => commands::run_watch(ctx).await,
    }
}
