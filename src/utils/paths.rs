//! Application Paths
//!
//! Cross-platform locations for the application's data files.

use std::path::PathBuf;

use crate::utils::error::{AppError, AppResult};

/// Directory name under the platform data directory.
const APP_DIR: &str = "claimlens";

/// The application data directory, created on first use by callers.
pub fn data_dir() -> AppResult<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| AppError::config("could not determine platform data directory"))?;
    Ok(base.join(APP_DIR))
}

/// Path to the SQLite database file.
pub fn database_path() -> AppResult<PathBuf> {
    Ok(data_dir()?.join("claimlens.db"))
}
