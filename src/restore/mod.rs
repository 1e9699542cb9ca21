mod logic;
pub(crate) mod db_restore;
pub(crate) mod names;
pub(crate) mod plan;

use std::path::Path;

use chrono::Local;
use tracing::info;

use crate::config::RestoreConfig;
use crate::errors::{AppError, Result};
use crate::utils::command::ProcessRunner;
use crate::utils::{find_executable, host};

pub use logic::RestoreReport;
use logic::perform_restore;

use db_restore::SqlClient;
use names::{NameTriple, timestamp_suffix};

/// Checks that the backup is a readable regular file before any command runs.
pub fn check_backup_source(backup: &Path) -> Result<()> {
    let metadata = std::fs::metadata(backup).map_err(|e| {
        AppError::InvalidInput(format!("backup file {} is not accessible: {}", backup.display(), e))
    })?;
    if !metadata.is_file() {
        return Err(AppError::InvalidInput(format!(
            "backup path {} is not a regular file",
            backup.display()
        )));
    }
    std::fs::File::open(backup).map_err(|e| {
        AppError::InvalidInput(format!("backup file {} is not readable: {}", backup.display(), e))
    })?;
    Ok(())
}

/// Public entry point for the restore process: resolves the target, derives
/// the temporary names and runs the swap against the real client binary.
pub async fn run_restore_flow(
    restore_config: &RestoreConfig,
    backup: &Path,
    suffix: Option<&str>,
) -> Result<RestoreReport> {
    check_backup_source(backup)?;

    let names = match suffix {
        Some(s) => NameTriple::new(&restore_config.database, s)?,
        None => NameTriple::new(&restore_config.database, &timestamp_suffix(Local::now()))?,
    };

    let host = host::resolve_host(restore_config.host.as_deref(), host::ADDRESS_LISTING).await?;

    let program = find_executable(&restore_config.client_binary)?;
    info!("Using database client at {}", program.display());
    info!(
        "Restoring {} on {} from {} (temporary databases {} and {})",
        names.current,
        host,
        backup.display(),
        names.new,
        names.old
    );

    let client = SqlClient::new(program, &host, restore_config);
    let runner = ProcessRunner::new(restore_config.command_timeout);
    perform_restore(&runner, &client, backup, &names).await
}
