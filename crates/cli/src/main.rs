//! Switchboard CLI: run and inspect multi-agent turns from the shell.
//!
//! Commands:
//! - `validate`: Check a turn request's configs without calling a model
//! - `run`: Execute one turn against the live provider or a recording
//! - `config`: Print the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "switchboard",
    about = "Switchboard: multi-agent turn engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.switchboard/config.toml
    #[arg(short, long, global = true, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the agent, tool and prompt configs of a turn request
    Validate {
        /// Turn request JSON file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Execute one turn and print the result as JSON
    Run {
        /// Turn request JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Answer completions from a recorded JSON array instead of the provider
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Print one JSON event per line as the turn progresses
        #[arg(long)]
        stream: bool,
    },

    /// Show the effective configuration (secrets redacted)
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { input } => commands::validate::run(&config, &input)?,
        Commands::Run {
            input,
            replay,
            stream,
        } => commands::run::run(&config, &input, replay.as_deref(), stream).await?,
        Commands::Config => commands::config_cmd::show(&config)?,
    }

    Ok(())
}
