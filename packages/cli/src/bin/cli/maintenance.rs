// ABOUTME: One-shot maintenance commands run outside the server loop
// ABOUTME: A single expiry sweep and runtime orphan reconciliation

use anyhow::Result;
use colored::*;
use dockyard_config::ServiceConfig;
use dockyard_lifecycle::ExpirySweeper;

pub async fn sweep_command(config: ServiceConfig) -> Result<()> {
    let manager = dockyard_cli::build_manager(&config).await?;
    let report = ExpirySweeper::new(manager, config.sweep_interval)
        .sweep_once()
        .await?;

    println!("{}", "Expiry sweep".bold());
    println!("  Expired:   {}", report.expired);
    println!("  Reclaimed: {}", report.reclaimed.to_string().green());
    if report.leaked > 0 {
        println!(
            "  Leaked:    {} (run `dockyard orphans` to remove them)",
            report.leaked.to_string().yellow()
        );
    }
    println!("  Skipped:   {}", report.skipped);
    if report.failed > 0 {
        println!("  Failed:    {}", report.failed.to_string().red());
    }
    Ok(())
}

pub async fn orphans_command(config: ServiceConfig, dry_run: bool) -> Result<()> {
    let manager = dockyard_cli::build_manager(&config).await?;
    let report = manager.cleanup_orphaned_workloads(dry_run).await?;

    if dry_run {
        println!(
            "{} {} orphaned workload(s) found, nothing removed (dry run)",
            "ℹ".cyan(),
            report.found
        );
    } else {
        println!(
            "{} Removed {} of {} orphaned workload(s)",
            "✓".green(),
            report.removed,
            report.found
        );
    }

    for error in &report.errors {
        eprintln!("  {} {}", "✗".red(), error);
    }
    Ok(())
}
