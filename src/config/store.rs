//! Loading and atomically persisting the client configuration file.

use super::types::ClientConfig;
use crate::error::{Error, Result};
use crate::paths::HishtoryPaths;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Reads and writes `config.json` inside the data directory.
///
/// Saves go through a uniquely named staging file in the same directory
/// followed by a rename, so readers always see either the previous or the
/// new record in full. Two processes saving at once are not serialized:
/// whichever rename lands last wins.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    paths: HishtoryPaths,
}

impl ConfigStore {
    pub fn new(paths: &HishtoryPaths) -> Self {
        Self {
            paths: paths.clone(),
        }
    }

    /// Store rooted at the environment's home directory.
    pub fn locate() -> Result<Self> {
        Ok(Self::new(&HishtoryPaths::resolve()?))
    }

    pub fn path(&self) -> PathBuf {
        self.paths.config_file()
    }

    /// Raw bytes of the config file.
    ///
    /// When the read fails, the error lists the files present in the data
    /// directory to make a missing or misplaced config easier to diagnose.
    pub fn contents(&self) -> Result<Vec<u8>> {
        let path = self.path();
        fs::read(&path).map_err(|source| self.read_error(source))
    }

    /// Load the record and fill display defaults.
    pub fn load(&self) -> Result<ClientConfig> {
        let data = self.contents()?;
        let mut config: ClientConfig =
            serde_json::from_slice(&data).map_err(|source| Error::ConfigParse {
                path: self.path(),
                source,
            })?;
        config.apply_defaults();
        Ok(config)
    }

    /// Persist the record, replacing the existing file atomically.
    pub fn save(&self, config: &ClientConfig) -> Result<()> {
        let serialized = serde_json::to_vec(config).map_err(Error::ConfigSerialize)?;
        self.paths.ensure_data_dir()?;

        let path = self.path();
        let staged = staged_path(&path);
        if let Err(source) = write_synced(&staged, &serialized) {
            let _ = fs::remove_file(&staged);
            return Err(Error::ConfigWrite {
                action: "write staged config",
                path: staged,
                source,
            });
        }
        if let Err(source) = fs::rename(&staged, &path) {
            let _ = fs::remove_file(&staged);
            return Err(Error::ConfigWrite {
                action: "replace config file with the updated version",
                path,
                source,
            });
        }
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Write an empty record if no config file exists yet.
    pub fn init_if_absent(&self) -> Result<()> {
        let path = self.path();
        match fs::metadata(&path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, writing an empty one");
                self.save(&ClientConfig::default())
            }
            Err(source) => Err(self.read_error(source)),
        }
    }

    fn read_error(&self, source: io::Error) -> Error {
        let dir = self.paths.data_dir().to_path_buf();
        match list_dir(&dir) {
            Ok(listing) => Error::ConfigRead {
                dir,
                listing,
                source,
            },
            Err(list_source) => Error::ConfigList {
                dir,
                read_error: source,
                list_source,
            },
        }
    }
}

/// `<config>.tmp-<uuid>`, alongside the target so the rename stays on one volume.
fn staged_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".tmp-{}", Uuid::new_v4()));
    PathBuf::from(name)
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Entry names of `dir`, each followed by `", "`.
fn list_dir(dir: &Path) -> io::Result<String> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<io::Result<_>>()?;
    names.sort();
    Ok(names.iter().map(|n| format!("{n}, ")).collect())
}
