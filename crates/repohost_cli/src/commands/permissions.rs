//! Show effective permissions.

use crate::context::Context;
use anyhow::{bail, Result};
use console::style;

/// Print every repository permission `username` holds.
pub fn run(ctx: &Context, username: &str) -> Result<()> {
    let Some(user) = ctx.catalog.resolver().directory().user_by_name(username) else {
        bail!("Unknown user: {}", username);
    };
    // populate the record cache so owned repositories are found
    ctx.catalog.list();
    let entries = ctx.catalog.effective_permissions(&user);

    if ctx.json {
        return ctx.print_json(&serde_json::to_value(&entries)?);
    }
    if entries.is_empty() {
        println!("{} holds no repository permissions.", user.username);
        return Ok(());
    }
    for entry in &entries {
        let registrant = if entry.is_missing() {
            style(entry.registrant.as_str()).red()
        } else {
            style(entry.registrant.as_str()).cyan()
        };
        println!(
            "{:<40} {:<8} {:?}{}",
            registrant,
            entry.permission.name(),
            entry.permission_type,
            entry
                .source
                .as_deref()
                .map(|s| format!(" ({})", s))
                .unwrap_or_default()
        );
    }
    Ok(())
}
