//! One-off garbage collection sweep.

use crate::context::Context;
use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use repohost_core::GcScheduler;
use serde_json::json;
use std::sync::PoisonError;

/// Run garbage collection over every due repository.
pub fn run(ctx: &Context, force: bool) -> Result<()> {
    if force {
        ctx.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .gc
            .enabled = true;
    }
    let scheduler = GcScheduler::new(ctx.catalog.clone(), ctx.gc_state.clone());
    if !scheduler.is_ready() {
        println!(
            "{} Garbage collection is disabled. Run with {} to collect anyway.",
            style("ℹ").blue(),
            style("--force").cyan()
        );
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message("Collecting garbage...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    let report = scheduler.run();
    spinner.finish_and_clear();

    if ctx.json {
        return ctx.print_json(&json!({
            "examined": report.examined,
            "collected": report.collected,
            "skipped": report.skipped,
            "errors": report.errors,
        }));
    }
    println!("{}", style("Garbage Collection Report:").bold());
    println!("  Repositories examined:  {}", style(report.examined).cyan());
    println!("  Repositories collected: {}", style(report.collected).green());
    println!("  Repositories skipped:   {}", report.skipped);

    if !report.errors.is_empty() {
        println!();
        println!("{}", style("Errors encountered:").red().bold());
        for error in &report.errors {
            println!("  {} {}", style("×").red(), error);
        }
    }
    Ok(())
}
