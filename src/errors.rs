use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Executable '{name}' not found in PATH: {source}")]
    ExecutableNotFound {
        name: String,
        #[source]
        source: which::Error,
    },

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` failed with {status}: {stderr}")]
    Command {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Command `{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The compensating rename after a failed swap-in did not go through.
    /// `current` is absent and `old` holds the prior data.
    #[error(
        "Rollback failed, manual intervention required: database '{current}' is missing and the previous data is in '{old}' (restored data left in '{new}'): {source}"
    )]
    Unrecovered {
        current: String,
        old: String,
        new: String,
        #[source]
        source: Box<AppError>,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;
