//! Turnstile CLI — the main entry point.
//!
//! Commands:
//! - `prepare` — Run the context pipeline over a history file
//! - `repair`  — Repair malformed tool-call arguments
//! - `new-id`  — Synthesize tool-call ids
//! - `config`  — Show, locate or validate the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "turnstile",
    about = "Turnstile — prepare conversation history for LLM provider calls",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.turnstile/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sanitize, trim and shape a history file for one provider call
    Prepare(commands::prepare::PrepareArgs),

    /// Repair malformed JSON tool arguments (reads stdin when TEXT is omitted)
    Repair {
        /// The JSON text to repair
        text: Option<String>,
    },

    /// Print synthesized tool-call ids
    NewId {
        /// How many ids to print
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Prepare(args) => commands::prepare::run(args, config_path)?,
        Commands::Repair { text } => commands::repair::run(text)?,
        Commands::NewId { count } => commands::ids::run(count)?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path)?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
        },
    }

    Ok(())
}
