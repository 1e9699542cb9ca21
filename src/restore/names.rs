// iamrestore/src/restore/names.rs
use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;

use crate::errors::{AppError, Result};

/// Longest identifier the server accepts without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("static pattern"))
}

/// Checks that `name` can be spliced into a statement unquoted.
pub fn validate_identifier(name: &str) -> Result<()> {
    if !identifier_pattern().is_match(name) {
        return Err(AppError::InvalidInput(format!(
            "'{}' is not a valid database name (expected lowercase letters, digits and underscores)",
            name
        )));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(AppError::InvalidInput(format!(
            "database name '{}' is longer than {} characters",
            name, MAX_IDENTIFIER_LEN
        )));
    }
    Ok(())
}

/// Uniqueness suffix with microsecond resolution, e.g. `20261016_142501_123456`.
pub fn timestamp_suffix(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S_%6f").to_string()
}

/// The three databases involved in one restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTriple {
    pub current: String,
    pub old: String,
    pub new: String,
}

impl NameTriple {
    pub fn new(current: &str, suffix: &str) -> Result<Self> {
        if suffix.is_empty() {
            return Err(AppError::InvalidInput("uniqueness suffix cannot be empty".to_string()));
        }
        let names = Self {
            current: current.to_string(),
            old: format!("{}_old_{}", current, suffix),
            new: format!("{}_new_{}", current, suffix),
        };
        validate_identifier(&names.current)?;
        validate_identifier(&names.old)?;
        validate_identifier(&names.new)?;
        Ok(names)
    }
}
