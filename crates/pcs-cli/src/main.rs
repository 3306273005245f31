//! pcs-api CLI - command-line front-end for pcs-api-rs
//!
//! Exercises the OAuth2 bootstrap flow (C7) and the storage façade/provider
//! adapters (C8/C9) end to end, without requiring a host application:
//! - `bootstrap` drives the 3-legged OAuth2 dance for a registered app and
//!   saves the resulting credentials.
//! - `login` saves a login/password directly for providers with no OAuth2
//!   surface (RapidShare, CloudMe).
//! - `fs` runs list/upload/download/delete/quota against any registered
//!   provider once credentials have been saved.

use anyhow::Result;
use clap::{Parser, Subcommand};
use pcs_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::bootstrap::BootstrapCommand;
use commands::completions::CompletionsCommand;
use commands::fs::FsCommand;
use commands::login::LoginCommand;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "pcs-api", version, about = "Provider-neutral personal cloud storage client")]
pub struct Cli {
    /// Path to a YAML configuration file (repository location, retry
    /// settings, default log level); falls back to the platform config
    /// directory, then to built-in defaults, when unset or unreadable.
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv); overrides the
    /// configured log level.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the OAuth2 bootstrap flow for an application and save credentials
    Bootstrap(BootstrapCommand),
    /// Save a login/password for a non-OAuth2 provider
    Login(LoginCommand),
    /// File and folder operations
    #[command(subcommand)]
    Fs(FsCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path()),
    };
    for error in config.validate() {
        eprintln!("warning: ignoring invalid configuration: {error}");
    }

    let filter = match cli.verbose {
        0 => config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    let format = if cli.json { OutputFormat::Json } else { OutputFormat::Human };
    let fmt = output::get_formatter(cli.json);

    match cli.command {
        Commands::Bootstrap(cmd) => cmd.execute(&*fmt, &config).await,
        Commands::Login(cmd) => cmd.execute(&*fmt, &config).await,
        Commands::Fs(cmd) => cmd.execute(&*fmt, format, &config).await,
        Commands::Completions(cmd) => cmd.execute(format).await,
    }
}
