use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blockwatch::config::Config;
use blockwatch::models::Country;

mod commands;

#[derive(Parser)]
#[command(
    name = "blockwatch",
    version,
    about = "Checks whether monitored sites are reachable from behind national firewalls",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (environment variables are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run checking cycles and broadcast changes until interrupted
    Run,

    /// Add a target after checking it is reachable without a proxy
    Add {
        /// Site URL; the scheme is forced to https
        url: String,

        /// Skip the direct reachability check
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Bulk insert targets from a file with one URL per line
    Seed {
        /// Seed file path
        file: PathBuf,
    },

    /// Stop monitoring a target
    Remove {
        /// Site URL
        url: String,
    },

    /// Register a SOCKS5 proxy for a country
    AddProxy {
        /// Two-letter country code
        country: Country,

        /// Proxy address as host:port
        addr: String,

        /// Proxy username
        #[arg(long)]
        username: Option<String>,

        /// Proxy password
        #[arg(long)]
        password: Option<String>,
    },

    /// Print the latest reachability of every target for a country
    Report {
        /// Two-letter country code
        country: Country,
    },

    /// Subscribe a chat to change digests
    Subscribe {
        /// Telegram chat id
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },

    /// Unsubscribe a chat from change digests
    Unsubscribe {
        /// Telegram chat id
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env().context("Failed to load configuration from environment")?,
    };
    config.validate().context("Invalid configuration")?;

    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    // Flushes the log file on exit
    let _guard = setup_tracing(
        &format,
        &config.logging.level,
        config.logging.directory.as_deref(),
        cli.verbose,
    )?;

    match cli.command {
        Commands::Run => {
            tracing::info!("Starting run command");
            commands::run(config).await?;
        }

        Commands::Add { url, force } => {
            tracing::info!(url = %url, force = %force, "Starting add command");
            commands::add(config, url, force).await?;
        }

        Commands::Seed { file } => {
            tracing::info!(file = %file.display(), "Starting seed command");
            commands::seed(config, &file).await?;
        }

        Commands::Remove { url } => {
            commands::remove(config, url)?;
        }

        Commands::AddProxy {
            country,
            addr,
            username,
            password,
        } => {
            commands::add_proxy(config, country, addr, username, password)?;
        }

        Commands::Report { country } => {
            commands::report(config, country)?;
        }

        Commands::Subscribe { chat_id } => {
            commands::set_subscription(config, chat_id, true)?;
        }

        Commands::Unsubscribe { chat_id } => {
            commands::set_subscription(config, chat_id, false)?;
        }
    }

    Ok(())
}

fn setup_tracing(
    format: &str,
    level: &str,
    directory: Option<&Path>,
    verbose: bool,
) -> Result<Option<WorkerGuard>> {
    let default_filter = if verbose {
        "blockwatch=debug,info".to_string()
    } else {
        format!("blockwatch={level},warn")
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let (file_layer, guard) = match directory {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("blockwatch")
                .filename_suffix("log")
                .build(dir)
                .with_context(|| format!("Failed to open log directory: {}", dir.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(file_layer)
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(file_layer)
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(guard)
}
