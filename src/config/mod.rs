// iamrestore/src/config/mod.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::errors::{AppError, Result};
use crate::restore::names::validate_identifier;

pub const DEFAULT_DATABASE: &str = "iam";
pub const DEFAULT_CLIENT_BINARY: &str = "cockroach";
pub const DEFAULT_CONFIG_FILE: &str = "iamrestore.json";

// Shape of the optional JSON config file. Every field may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawJsonConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub client_binary: Option<String>,
    pub insecure: Option<bool>,
    pub certs_dir: Option<PathBuf>,
    pub user: Option<String>,
    pub command_timeout_secs: Option<u64>,
}

impl RawJsonConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            AppError::Config(format!(
                "Failed to read config file at {}: {}",
                config_path.display(),
                e
            ))
        })?;
        serde_json::from_str(&config_content).map_err(|e| {
            AppError::Config(format!(
                "Failed to parse JSON from config file at {}: {}",
                config_path.display(),
                e
            ))
        })
    }

    /// Loads `explicit` if given (it must exist), otherwise the default file
    /// when present, otherwise an empty config.
    pub fn load_optional(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from_json(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    debug!("Using config file {}", default_path.display());
                    Self::load_from_json(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Values supplied on the command line or through `IAMRESTORE_*` variables.
/// They take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub client_binary: Option<String>,
    pub certs_dir: Option<PathBuf>,
    pub user: Option<String>,
    pub command_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Security {
    Insecure,
    Certs(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreConfig {
    /// `None` means discover the local address at startup.
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: String,
    pub client_binary: String,
    pub security: Security,
    pub user: Option<String>,
    pub command_timeout: Option<Duration>,
}

pub fn resolve_restore_config(raw: RawJsonConfig, overrides: Overrides) -> Result<RestoreConfig> {
    let database = overrides
        .database
        .or(raw.database)
        .unwrap_or_else(|| DEFAULT_DATABASE.to_string());
    validate_identifier(&database)?;

    let client_binary = overrides
        .client_binary
        .or(raw.client_binary)
        .unwrap_or_else(|| DEFAULT_CLIENT_BINARY.to_string());
    if client_binary.trim().is_empty() {
        return Err(AppError::Config("client_binary cannot be empty.".to_string()));
    }

    let security = match (overrides.certs_dir, raw.insecure, raw.certs_dir) {
        (Some(dir), _, _) => Security::Certs(dir),
        (None, Some(true), _) => Security::Insecure,
        (None, Some(false), Some(dir)) => Security::Certs(dir),
        (None, Some(false), None) => {
            return Err(AppError::Config(
                "insecure is false but no certs_dir is configured.".to_string(),
            ));
        }
        (None, None, Some(dir)) => Security::Certs(dir),
        (None, None, None) => Security::Insecure,
    };

    let host = overrides
        .host
        .or(raw.host)
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty());
    if let Some(h) = &host {
        if h.contains(char::is_whitespace) {
            return Err(AppError::Config(format!("host '{}' contains whitespace.", h)));
        }
    }

    let command_timeout = match overrides.command_timeout_secs.or(raw.command_timeout_secs) {
        Some(0) => {
            return Err(AppError::Config(
                "command_timeout_secs must be greater than zero.".to_string(),
            ));
        }
        Some(secs) => Some(Duration::from_secs(secs)),
        None => None,
    };

    Ok(RestoreConfig {
        host,
        port: overrides.port.or(raw.port),
        database,
        client_binary,
        security,
        user: overrides.user.or(raw.user).filter(|u| !u.is_empty()),
        command_timeout,
    })
}
