//! codereflect CLI
//!
//! Mirror a file from one terminal to another over TCP and show where the
//! mirrored text diverges from a local reference.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use codereflect_core::Config;

mod commands;
mod decorations;
mod document;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "codereflect")]
#[command(about = "codereflect - mirror a document and highlight where it diverges")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for a sender and highlight where it diverges from a reference file
    Receive {
        /// Reference file
        #[arg(short, long)]
        file: PathBuf,
        /// Port to listen on (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind (defaults to the configured bind address)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Mirror a file to a receiver on every save
    Send {
        /// Receiver address as host:port
        address: String,
        /// File to mirror
        #[arg(short, long)]
        file: PathBuf,
        /// Quiet period after the last change before sending
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
    /// Interactive console for starting and stopping sessions
    Console {
        /// Local document (reference when receiving, mirrored when sending)
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Compare two files once
    Diff {
        /// Reference file
        reference: PathBuf,
        /// File compared against the reference
        incoming: PathBuf,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (port, bind_address, debounce_ms, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands read and write the file themselves
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);

    match cli.command {
        Commands::Receive { file, port, bind } => {
            commands::receive::run(config, file, port, bind, output).await
        }
        Commands::Send {
            address,
            file,
            debounce_ms,
        } => {
            if let Some(debounce_ms) = debounce_ms {
                config.debounce_ms = debounce_ms;
            }
            commands::send::run(config, address, file, output).await
        }
        Commands::Console { file } => commands::console::run(config, file, output).await,
        Commands::Diff {
            reference,
            incoming,
        } => commands::diff::run(reference, incoming, &output),
        Commands::Config { .. } => Ok(()),
    }
}

/// Initialize logging
///
/// Only initializes if CODEREFLECT_LOG environment variable is set.
/// Logs to config.log_file when set, stderr otherwise.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("CODEREFLECT_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "codereflect_core={},codereflect_cli={}",
        log_level, log_level
    ));

    let Some(log_path) = &config.log_file else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
        return;
    };

    let log_file = match File::create(log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    // Initialize file-based logging (ignore error if already initialized)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(log_file))
        .try_init();

    info!("Logging initialized to {:?}", log_path);
}
