//! Delete a repository.

use crate::context::{explain, Context};
use anyhow::{bail, Result};
use console::style;
use std::io::{self, Write};

/// Delete a repository after confirmation.
pub fn run(ctx: &Context, name: &str, yes: bool) -> Result<()> {
    let Some(record) = ctx.catalog.get(name) else {
        bail!("Repository not found: {}", name);
    };

    if !yes {
        println!();
        println!(
            "{} {}",
            style("⚠").yellow().bold(),
            style("WARNING:").yellow().bold()
        );
        println!("  {} will be permanently deleted.", style(&record.name).cyan());
        if record.has_commits {
            println!("  The repository has history.");
        }
        if !record.forks.is_empty() {
            println!("  {} forks will lose their origin.", record.forks.len());
        }
        println!();
        print!("Continue? [y/N]: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{} Delete cancelled.", style("✓").green());
            return Ok(());
        }
    }

    ctx.catalog.delete(&record.name).map_err(explain)?;
    println!("{} Deleted {}", style("✓").green(), record.name);
    Ok(())
}
