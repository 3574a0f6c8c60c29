//! Location of the hishtory data directory and the files inside it.
//!
//! The data directory lives under the user's home directory. Its name defaults
//! to `.hishtory` and can be overridden with the `HISHTORY_PATH` environment
//! variable, which is interpreted relative to the home directory.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory name.
pub const HISHTORY_PATH_ENV: &str = "HISHTORY_PATH";

/// Default data directory name, relative to the home directory.
pub const DEFAULT_DATA_DIR: &str = ".hishtory";

pub const CONFIG_FILE: &str = "config.json";
pub const DB_FILE: &str = ".hishtory.db";
pub const LOG_FILE: &str = "hishtory.log";

/// Resolved home and data directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HishtoryPaths {
    home_dir: PathBuf,
    data_dir: PathBuf,
}

impl HishtoryPaths {
    /// Build paths for an explicit home directory and data directory name.
    pub fn new(home_dir: impl Into<PathBuf>, dir_name: impl AsRef<Path>) -> Self {
        let home_dir = home_dir.into();
        let data_dir = home_dir.join(dir_name);
        Self { home_dir, data_dir }
    }

    /// Resolve paths from the environment.
    pub fn resolve() -> Result<Self> {
        let home_dir = dirs::home_dir().ok_or(Error::HomeDir)?;
        Ok(Self::new(home_dir, data_dir_name()))
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn db_file(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE)
    }

    /// Create the data directory if it does not exist yet.
    pub fn ensure_data_dir(&self) -> Result<()> {
        create_dir_all(&self.data_dir).map_err(|source| Error::CreateDir {
            path: self.data_dir.clone(),
            source,
        })
    }
}

/// Data directory name, honouring `HISHTORY_PATH`.
pub fn data_dir_name() -> String {
    std::env::var(HISHTORY_PATH_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
}

#[cfg(unix)]
fn create_dir_all(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o744)
        .create(path)
}

#[cfg(not(unix))]
fn create_dir_all(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}
