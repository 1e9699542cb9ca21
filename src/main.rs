//! IAM database restore tool
//!
//! Replaces the live `iam` database with the contents of a SQL backup by
//! loading it into a fresh database and swapping names, rolling back when a
//! step fails.

// iamrestore/src/main.rs
mod config;
mod errors;
mod restore;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Overrides, RawJsonConfig, resolve_restore_config};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "iamrestore", version, about = "Restore the IAM database from a SQL backup")]
struct Cli {
    /// SQL backup file to load
    backup_file: PathBuf,

    /// Database server address (default: first non-loopback local address)
    #[arg(long, env = "IAMRESTORE_HOST")]
    host: Option<String>,

    /// Database server port
    #[arg(long, env = "IAMRESTORE_PORT")]
    port: Option<u16>,

    /// Name of the database being replaced
    #[arg(long, env = "IAMRESTORE_DATABASE")]
    database: Option<String>,

    /// SQL client binary, looked up on PATH
    #[arg(long = "client", env = "IAMRESTORE_CLIENT")]
    client_binary: Option<String>,

    /// Connect with certificates from this directory instead of --insecure
    #[arg(long, env = "IAMRESTORE_CERTS_DIR")]
    certs_dir: Option<PathBuf>,

    /// SQL user to connect as
    #[arg(long, env = "IAMRESTORE_USER")]
    user: Option<String>,

    /// JSON config file (default: iamrestore.json if present)
    #[arg(long, env = "IAMRESTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Suffix for the temporary database names (default: current timestamp)
    #[arg(long)]
    suffix: Option<String>,

    /// Per-command timeout in seconds
    #[arg(long = "timeout", env = "IAMRESTORE_TIMEOUT")]
    command_timeout_secs: Option<u64>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            client_binary: self.client_binary.clone(),
            certs_dir: self.certs_dir.clone(),
            user: self.user.clone(),
            command_timeout_secs: self.command_timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(default_level, rust_log.as_deref()))
        .with_target(false)
        .init();

    match run_app(&cli).await {
        Ok(()) => {
            info!("✅ Restore completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ Restore failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` directives when given, otherwise everything at `default_level`.
fn log_filter(default_level: Level, rust_log: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .parse_lossy(rust_log.unwrap_or_default())
}

async fn run_app(cli: &Cli) -> Result<()> {
    let raw_config = RawJsonConfig::load_optional(cli.config.as_deref())
        .context("Failed to load configuration file")?;
    let restore_config = resolve_restore_config(raw_config, cli.overrides())
        .context("Invalid restore configuration")?;

    let report = restore::run_restore_flow(&restore_config, &cli.backup_file, cli.suffix.as_deref())
        .await
        .with_context(|| {
            format!(
                "Restore of '{}' from {} failed",
                restore_config.database,
                cli.backup_file.display()
            )
        })?;

    info!("Database {} now holds the restored data.", report.names.current);
    if let Some(orphaned) = &report.orphaned {
        warn!("Database {} was left behind and can be dropped by hand.", orphaned);
    }
    Ok(())
}
