//! Discover command implementation

use colored::Colorize;
use kb_core::SnapshotMode;
use kb_manifest::ManifestEntry;
use serde_json::json;

use crate::context::Context;
use crate::error::Result;

/// Run discovery and print what was found. Nothing is registered or persisted
/// beyond the discovery cache.
pub async fn run_discover(ctx: &Context, no_cache: bool, json: bool) -> Result<()> {
    let service = ctx.service(SnapshotMode::Producer);
    let discovery = service.discovery().discover(ctx.root(), no_cache).await?;

    if json {
        let out = json!({
            "origin": discovery.origin.as_str(),
            "partial": discovery.partial,
            "timedOut": discovery.timed_out,
            "results": discovery.results,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", "Discovered Packages".bold());
    println!();

    if discovery.results.is_empty() {
        println!("  {} (no command packages found)", "None".dimmed());
        println!();
    }

    for result in &discovery.results {
        let version = result.package_version.as_deref().unwrap_or("-");
        println!(
            "{} {} ({})",
            result.package_name.cyan().bold(),
            version.dimmed(),
            result.source
        );
        for entry in &result.manifests {
            match entry {
                ManifestEntry::Loaded(manifest) => {
                    println!(
                        "  {} {:<24} {}",
                        "+".green(),
                        manifest.id,
                        manifest.describe.dimmed()
                    );
                }
                ManifestEntry::Unavailable(unavailable) => {
                    println!("  {} {}", "!".yellow(), unavailable.reason.yellow());
                    if let Some(hint) = &unavailable.hint {
                        println!("    {} {}", "hint:".dimmed(), hint.cyan());
                    }
                }
            }
        }
        println!();
    }

    for package in &discovery.timed_out {
        println!("{} manifest load for {} timed out", "warning:".yellow().bold(), package);
    }

    println!(
        "{} {} packages ({} pass{})",
        "Total:".dimmed(),
        discovery.results.len(),
        discovery.origin,
        if discovery.partial { ", partial" } else { "" }
    );

    Ok(())
}
