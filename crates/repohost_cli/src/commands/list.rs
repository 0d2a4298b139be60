//! List repositories.

use crate::context::Context;
use anyhow::{bail, Result};
use chrono::Local;
use console::style;

/// List every repository, or those visible to `user`.
pub fn run(ctx: &Context, user: Option<&str>) -> Result<()> {
    let records = match user {
        Some(username) => {
            let Some(user) = ctx.catalog.resolver().directory().user_by_name(username) else {
                bail!("Unknown user: {}", username);
            };
            ctx.catalog.records_for_user(Some(&user))
        }
        None => ctx.catalog.records(),
    };

    if ctx.json {
        return ctx.print_json(&serde_json::to_value(&records)?);
    }

    if records.is_empty() {
        println!("No repositories.");
        return Ok(());
    }
    for record in &records {
        let mut flags = Vec::new();
        if record.is_mirror {
            flags.push("mirror");
        }
        if record.is_fork() {
            flags.push("fork");
        }
        if !record.has_commits {
            flags.push("empty");
        }
        println!(
            "{:<40} {:>10}  {}  {}",
            style(&record.name).cyan(),
            record.size.as_deref().unwrap_or("-"),
            record.last_change.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            style(flags.join(",")).dim()
        );
        if !record.description.is_empty() {
            println!("    {}", record.description);
        }
    }
    println!();
    println!("{} repositories", records.len());
    Ok(())
}
