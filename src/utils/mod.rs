pub mod command;
pub mod host;

use std::path::PathBuf;

use crate::errors::{AppError, Result};
use which::which;

/// Finds an executable in the system PATH. Paths containing a separator are
/// checked as given.
pub fn find_executable(name: &str) -> Result<PathBuf> {
    which(name).map_err(|source| AppError::ExecutableNotFound {
        name: name.to_string(),
        source,
    })
}
