//! Refresh command implementation

use colored::Colorize;
use kb_core::SnapshotMode;
use serde_json::json;

use crate::context::Context;
use crate::error::Result;

/// Run one producer refresh and publish the snapshot
pub async fn run_refresh(ctx: &Context, no_cache: bool, json: bool) -> Result<()> {
    let service = ctx.service(SnapshotMode::Producer);
    let outcome = service.refresh(no_cache).await?;

    if json {
        let out = json!({
            "rev": outcome.snapshot.rev,
            "checksum": outcome.snapshot.checksum,
            "partial": outcome.snapshot.partial,
            "commands": outcome.snapshot.manifest_entries.len(),
            "timedOut": outcome.timed_out,
            "health": outcome.health,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for package in &outcome.timed_out {
        println!("{} manifest load for {} timed out", "warning:".yellow().bold(), package);
    }

    println!(
        "{} snapshot rev {} ({} commands{})",
        "Published".green().bold(),
        outcome.snapshot.rev,
        outcome.snapshot.manifest_entries.len(),
        if outcome.snapshot.partial { ", partial" } else { "" }
    );
    println!("{}: {}", "Path".dimmed(), service.snapshots().primary_path().display());

    Ok(())
}
