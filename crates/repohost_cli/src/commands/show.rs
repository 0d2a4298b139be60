//! Show one repository.

use crate::context::Context;
use anyhow::{bail, Result};
use console::style;
use serde_json::json;

/// Print a repository record with its registrants.
pub fn run(ctx: &Context, name: &str) -> Result<()> {
    let Some(record) = ctx.catalog.get(name) else {
        bail!("Repository not found: {}", name);
    };
    let users = ctx.catalog.registrants_for(&record);
    let teams = ctx.catalog.team_registrants_for(&record);
    let stars = ctx.catalog.star_count(&record);

    if ctx.json {
        return ctx.print_json(&json!({
            "record": record,
            "users": users,
            "teams": teams,
            "stars": stars,
        }));
    }

    println!("{}", style(&record.name).bold());
    if !record.description.is_empty() {
        println!("  {}", record.description);
    }
    println!();
    println!("  Owners:        {}", record.owners.join(", "));
    println!("  Restriction:   {}", record.access_restriction.name());
    println!("  Authorization: {}", record.authorization_control.name());
    println!("  HEAD:          {}", record.head.as_deref().unwrap_or("-"));
    println!("  Last change:   {}", record.last_change.to_rfc3339());
    println!("  Size:          {}", record.size.as_deref().unwrap_or("-"));
    println!("  Stars:         {}", stars);
    if let Some(origin) = &record.origin {
        println!("  Origin:        {}", origin);
    }
    if let Some(origin) = record.origin_repository.as_deref().filter(|o| !o.is_empty()) {
        println!("  Forked from:   {}", origin);
    }
    if !record.forks.is_empty() {
        println!("  Forks:         {}", record.forks.len());
    }
    println!(
        "  GC:            every {} days above {}, last {}",
        record.gc_period,
        record.gc_threshold,
        record.last_gc.format("%Y-%m-%d")
    );

    for (title, entries) in [("Users", &users), ("Teams", &teams)] {
        if entries.is_empty() {
            continue;
        }
        println!();
        println!("{}", style(title).bold());
        for entry in entries {
            println!(
                "  {:<24} {:<8} {:?}",
                entry.registrant,
                entry.permission.name(),
                entry.permission_type
            );
        }
    }
    Ok(())
}
