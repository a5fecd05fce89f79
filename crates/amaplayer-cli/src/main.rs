mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, query::QueryArgs, simulate::SimulateArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "amaplayer",
    about = "AmaPlayer action pipeline — inspect config, build search queries, replay optimistic actions",
    version,
    propagate_version = true
)]
struct Cli {
    /// Directory holding amaplayer.yaml (default: auto-detect)
    #[arg(long, global = true, env = "AMAPLAYER_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show, validate or initialize the pipeline config
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Build the document-store constraints for a profile search
    Query(QueryArgs),

    /// Replay a toggle against a scripted in-memory backend
    Simulate(SimulateArgs),
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Simulate(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    // Logs go to stderr so that --json output stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Query(args) => cmd::query::run(&root, args, cli.json),
        Commands::Simulate(args) => cmd::simulate::run(&root, args, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
