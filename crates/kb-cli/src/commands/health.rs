//! Health command implementation

use colored::Colorize;
use kb_core::SnapshotMode;
use kb_snapshot::HealthStatus;

use crate::context::Context;
use crate::error::Result;

/// Show registry health as seen by a consumer
pub async fn run_health(ctx: &Context, json: bool) -> Result<()> {
    let service = ctx.service(SnapshotMode::Consumer);
    let report = service.reload().await?.health;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let status = match report.status {
        HealthStatus::Healthy => report.status.as_str().green().bold(),
        HealthStatus::Degraded => report.status.as_str().yellow().bold(),
    };
    println!("{}: {}", "Status".bold(), status);
    println!();

    let flag = |set: bool| if set { "yes".yellow() } else { "no".dimmed() };
    println!("{}:       {}", "Rev".dimmed(), report.snapshot.rev);
    println!("{}:   {}", "Partial".dimmed(), flag(report.snapshot.partial));
    println!("{}:     {}", "Stale".dimmed(), flag(report.snapshot.stale));
    println!("{}: {}", "Corrupted".dimmed(), flag(report.snapshot.corrupted));
    println!();

    println!("{}:", "Components".bold());
    for component in &report.components {
        match &component.last_error {
            Some(error) => println!("  {} {:<12} {}", "!".yellow(), component.name, error.red()),
            None => println!("  {} {}", "+".green(), component.name),
        }
    }

    Ok(())
}
