//! One-off mirror sweep.

use crate::context::Context;
use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use repohost_core::{LogSink, MirrorSyncScheduler};
use serde_json::json;
use std::sync::Arc;

/// Fetch every mirror repository once.
pub fn run(ctx: &Context) -> Result<()> {
    let scheduler = MirrorSyncScheduler::new(ctx.catalog.clone(), Arc::new(LogSink));
    if !scheduler.is_ready() {
        println!(
            "{} Mirroring is disabled. Set {} in settings.",
            style("ℹ").blue(),
            style("[mirror] enabled = true").cyan()
        );
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message("Fetching mirrors...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    let report = scheduler.run();
    spinner.finish_and_clear();

    if ctx.json {
        return ctx.print_json(&json!({
            "fetched": report.fetched,
            "skipped": report.skipped,
            "failed": report.failed,
            "refs_updated": report.refs_updated,
            "notifications": report.notifications,
        }));
    }
    println!("{}", style("Mirror Report:").bold());
    println!("  Fetched:       {}", style(report.fetched).green());
    println!("  Skipped:       {}", report.skipped);
    println!(
        "  Failed:        {}",
        if report.failed > 0 {
            style(report.failed).red()
        } else {
            style(report.failed).green()
        }
    );
    println!("  Refs updated:  {}", style(report.refs_updated).cyan());
    println!("  Notifications: {}", report.notifications);
    Ok(())
}
