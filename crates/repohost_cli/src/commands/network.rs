//! Show a fork network.

use crate::context::Context;
use anyhow::{bail, Result};
use console::style;
use repohost_core::ForkNode;

/// Print the fork tree containing `name`.
pub fn run(ctx: &Context, name: &str) -> Result<()> {
    let Some(root) = ctx.catalog.network(name) else {
        bail!("Repository not found or its origin is missing: {}", name);
    };
    if ctx.json {
        return ctx.print_json(&serde_json::to_value(&root)?);
    }
    print_node(&root, name, 0);
    println!();
    println!("{} repositories in network", root.count());
    Ok(())
}

fn print_node(node: &ForkNode, selected: &str, depth: usize) {
    let indent = "  ".repeat(depth);
    let marker = if depth == 0 { "" } else { "└─ " };
    let label = if node.record.name.eq_ignore_ascii_case(selected)
        || node.record.display_name().eq_ignore_ascii_case(selected)
    {
        style(node.record.name.as_str()).green().bold()
    } else {
        style(node.record.name.as_str())
    };
    println!("{}{}{}", indent, marker, label);
    for fork in &node.forks {
        print_node(fork, selected, depth + 1);
    }
}
