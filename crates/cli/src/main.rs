//! Siloed CLI: the main entry point.
//!
//! Commands:
//! - `serve`: Start the HTTP gateway
//! - `run`: Run one task in the terminal, answering questions on stdin
//! - `history`: List persisted tasks or show one record
//! - `status`: Show configuration and a running gateway's counters
//! - `config`: Show, locate, or validate configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "siloed",
    about = "Siloed: self-refining LLM conversation orchestrator",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $SILOED_CONFIG or ~/.siloed/config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Keep task records in memory only
        #[arg(long)]
        ephemeral: bool,
    },

    /// Run a single task
    Run {
        /// The user input to process
        #[arg(short, long)]
        message: String,

        /// Task identifier (generated when omitted)
        #[arg(short, long)]
        task_id: Option<String>,

        /// Override orchestrator.max_iterations
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Do not persist the task record
        #[arg(long)]
        ephemeral: bool,
    },

    /// List persisted tasks, or print one record
    History {
        /// Task to print in full
        id: Option<String>,
    },

    /// Show configuration and gateway status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API keys redacted)
    Show,
    /// Print the config file path
    Path,
    /// Validate configuration and provider settings
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
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
        Commands::Serve { port, ephemeral } => {
            commands::serve::run(config_path, port, ephemeral).await?
        }
        Commands::Run {
            message,
            task_id,
            max_iterations,
            ephemeral,
        } => commands::run::run(config_path, message, task_id, max_iterations, ephemeral).await?,
        Commands::History { id } => commands::history::run(config_path, id).await?,
        Commands::Status => commands::status::run(config_path).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
        },
    }

    Ok(())
}
