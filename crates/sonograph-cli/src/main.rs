//! Sonograph CLI - render audio graph descriptions offline.

mod commands;
mod processors;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sonograph")]
#[command(author, version, about = "Offline audio graph renderer", long_about = None)]
struct Cli {
    /// Log render steps (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a graph description to a WAV file
    Render(commands::render::RenderArgs),

    /// Show how an engine provides every node type
    Probe(commands::probe::ProbeArgs),

    /// Validate a graph description without rendering it
    Check(commands::check::CheckArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Probe(args) => commands::probe::run(args),
        Commands::Check(args) => commands::check::run(args),
    }
}
