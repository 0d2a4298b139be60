//! Repohost CLI - Command-line interface for the repository catalog.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod context;

use context::Context;

#[derive(Parser)]
#[command(name = "repohost")]
#[command(about = "Catalog, mirror and maintain hosted git repositories", long_about = None)]
#[command(version)]
struct Cli {
    /// Server settings file
    #[arg(long, global = true, default_value = "settings.toml")]
    config: PathBuf,
    /// Users and teams file
    #[arg(long, global = true, default_value = "users.toml")]
    users: PathBuf,
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List repositories
    List {
        /// Only repositories this user may see
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Show one repository
    Show {
        /// Repository name
        name: String,
    },
    /// Create a repository
    Create {
        /// Repository name, `.git` is appended
        name: String,
        /// Description
        #[arg(short, long)]
        description: Option<String>,
        /// Owner usernames
        #[arg(short, long)]
        owner: Vec<String>,
        /// Access restriction (NONE, PUSH, CLONE, VIEW)
        #[arg(short, long)]
        restriction: Option<String>,
    },
    /// Fork a repository into a user's personal project
    Fork {
        /// Repository to fork
        origin: String,
        /// User receiving the fork
        #[arg(short, long)]
        user: String,
    },
    /// Rename a repository
    Rename {
        /// Current name
        from: String,
        /// New name
        to: String,
    },
    /// Delete a repository
    Delete {
        /// Repository name
        name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the fork network of a repository
    Network {
        /// Any repository in the network
        name: String,
    },
    /// Show a user's effective repository permissions
    Permissions {
        /// Username
        user: String,
    },
    /// Fetch every mirror repository once
    Mirror,
    /// Run one garbage collection sweep
    Gc {
        /// Run even if garbage collection is disabled in settings
        #[arg(long)]
        force: bool,
    },
    /// Run the mirror and garbage collection services until interrupted
    Serve,
}

fn main() -> Result<()> {
    // Initialize tracing subscriber
    // Respects RUST_LOG environment variable (e.g., RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let ctx = Context::open(&cli.config, &cli.users, cli.json)?;

    match cli.command {
        Commands::List { user } => commands::list::run(&ctx, user.as_deref()),
        Commands::Show { name } => commands::show::run(&ctx, &name),
        Commands::Create {
            name,
            description,
            owner,
            restriction,
        } => commands::create::run(&ctx, &name, description, &owner, restriction.as_deref()),
        Commands::Fork { origin, user } => commands::create::fork(&ctx, &origin, &user),
        Commands::Rename { from, to } => commands::rename::run(&ctx, &from, &to),
        Commands::Delete { name, yes } => commands::delete::run(&ctx, &name, yes),
        Commands::Network { name } => commands::network::run(&ctx, &name),
        Commands::Permissions { user } => commands::permissions::run(&ctx, &user),
        Commands::Mirror => commands::mirror::run(&ctx),
        Commands::Gc { force } => commands::gc::run(&ctx, force),
        Commands::Serve => commands::serve::run(ctx),
    }
}
