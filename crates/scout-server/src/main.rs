mod config;
mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use server::AppState;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Search the web, read the results and summarize them with Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to <config dir>/scout/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(short, long, env = "SCOUT_BIND")]
    bind: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    debug: bool,

    /// Write JSON logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration (credentials masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    debug!(?config, "Configuration loaded");

    match cli.command {
        Some(Commands::Config) => show_config(&config, cli.config.as_deref()),
        None => run_server(config).await,
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    if let Some(path) = &cli.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::sync::Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Header naming the file `Config::load` read: the `--config` path if given,
/// otherwise the default location.
fn config_header(explicit: Option<&Path>) -> String {
    match explicit.map(Path::to_path_buf).or_else(Config::config_path) {
        Some(path) if path.exists() => format!("# Config file: {}", path.display()),
        Some(path) => format!("# Config file: {} (not found, using defaults)", path.display()),
        None => "# Config file: unavailable on this platform".to_string(),
    }
}

fn show_config(config: &Config, explicit: Option<&Path>) -> Result<()> {
    println!("{}", config_header(explicit));
    println!();
    let rendered =
        toml::to_string_pretty(&config.redacted()).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    if config.credentials.gemini_api_key.is_none() || config.credentials.serpapi_key.is_none() {
        info!("No default credentials configured; requests must supply their own keys");
    }

    let bind = config.server.bind.clone();
    let state = AppState::from_config(config, CancellationToken::new())?;
    server::serve(state, &bind).await
}
