//! List command implementation

use colored::Colorize;
use kb_core::{RefreshOrigin, SnapshotMode};
use kb_registry::RegisteredCommand;
use kb_snapshot::LoadOrigin;
use serde_json::json;

use crate::context::Context;
use crate::error::Result;

/// List commands from the current snapshot
pub async fn run_list(ctx: &Context, all: bool, json: bool) -> Result<()> {
    let service = ctx.service(SnapshotMode::Consumer);
    let outcome = service.reload().await?;
    let index = service.index();

    let commands: Vec<&RegisteredCommand> = if all {
        index.commands().iter().collect()
    } else {
        index.active()
    };

    if json {
        let out = json!({
            "rev": outcome.snapshot.rev,
            "partial": outcome.snapshot.partial,
            "stale": outcome.snapshot.stale,
            "commands": commands,
            "unavailable": index.unavailable().iter().filter(|_| all).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if outcome.origin == RefreshOrigin::Snapshot(LoadOrigin::Empty) {
        println!("{}", "No registry snapshot".red().bold());
        println!();
        println!("Run {} to build one.", "kb-registry refresh".cyan());
        return Ok(());
    }

    println!(
        "{} {}",
        "Registered Commands".bold(),
        format!("(rev {})", outcome.snapshot.rev).dimmed()
    );
    println!();

    for command in &commands {
        let status = if command.shadowed {
            "shadowed".dimmed()
        } else if !command.available {
            "unavailable".yellow()
        } else {
            "ready".green()
        };
        println!(
            "  {:<24} {:<14} {} ({})",
            command.id().green(),
            command.source.as_str(),
            command.manifest.source_package,
            status
        );
        if !command.manifest.aliases.is_empty() {
            println!(
                "  {:<24} aliases: {}",
                "",
                command.manifest.aliases.join(", ").dimmed()
            );
        }
        if let Some(reason) = &command.unavailable_reason {
            println!("  {:<24} {}", "", reason.yellow());
        }
    }

    if all {
        for unavailable in index.unavailable() {
            println!(
                "  {:<24} {}",
                unavailable.package.yellow(),
                unavailable.reason.dimmed()
            );
        }
    }

    println!();
    if outcome.snapshot.stale {
        println!(
            "{} snapshot is stale; is a producer running?",
            "warning:".yellow().bold()
        );
    }
    println!(
        "{} {} commands. Use {} to include shadowed ones.",
        "Total:".dimmed(),
        commands.len(),
        "--all".cyan()
    );

    Ok(())
}
