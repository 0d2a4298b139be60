//! Create and fork repositories.

use crate::context::{explain, Context};
use anyhow::{bail, Result};
use console::style;
use repohost_core::{AccessRestriction, RepositoryRecord};

/// Create an empty repository.
pub fn run(
    ctx: &Context,
    name: &str,
    description: Option<String>,
    owners: &[String],
    restriction: Option<&str>,
) -> Result<()> {
    let mut record = RepositoryRecord::new(name);
    record.description = description.unwrap_or_default();
    record.add_owners(owners.iter().map(String::as_str));
    let default = AccessRestriction::from_name(
        &ctx.catalog.settings().catalog.default_access_restriction,
        AccessRestriction::Push,
    );
    record.access_restriction = restriction
        .map(|r| AccessRestriction::from_name(r, default))
        .unwrap_or(default);

    let record = ctx
        .catalog
        .update_record("", record, true)
        .map_err(explain)?;
    report(ctx, "Created", &record)
}

/// Fork `origin` into the personal project of `username`.
pub fn fork(ctx: &Context, origin: &str, username: &str) -> Result<()> {
    let Some(source) = ctx.catalog.get(origin) else {
        bail!("Repository not found: {}", origin);
    };
    if !source.allow_forks {
        bail!("{} does not allow forks", source.name);
    }
    if let Some(existing) = ctx.catalog.fork_of(username, &source.name) {
        bail!("{} already forked this network as {}", username, existing);
    }

    let leaf = source.name.rsplit('/').next().unwrap_or(&source.name);
    let name = format!("{}/{}", ctx.catalog.namespace().personal_path(username), leaf);
    let mut template = source.clone_as(&name);
    template.add_owner(username);

    let record = ctx
        .catalog
        .update_record("", template, true)
        .map_err(explain)?;
    report(ctx, "Forked", &record)
}

fn report(ctx: &Context, verb: &str, record: &RepositoryRecord) -> Result<()> {
    if ctx.json {
        return ctx.print_json(&serde_json::to_value(record)?);
    }
    println!("{} {} {}", style("✓").green(), verb, style(&record.name).cyan());
    Ok(())
}
