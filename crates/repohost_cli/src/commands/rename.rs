//! Rename a repository.

use crate::context::{explain, Context};
use anyhow::{bail, Result};
use console::style;

/// Rename `from` to `to`, moving permissions and fork links along.
pub fn run(ctx: &Context, from: &str, to: &str) -> Result<()> {
    let Some(mut record) = ctx.catalog.get(from) else {
        bail!("Repository not found: {}", from);
    };
    let old_name = record.name.clone();
    record.set_name(to);

    let record = ctx
        .catalog
        .update_record(&old_name, record, false)
        .map_err(explain)?;
    if ctx.json {
        return ctx.print_json(&serde_json::to_value(&record)?);
    }
    println!(
        "{} Renamed {} to {}",
        style("✓").green(),
        old_name,
        style(&record.name).cyan()
    );
    if !record.forks.is_empty() {
        println!("  Relinked {} forks", record.forks.len());
    }
    Ok(())
}
