//! Immutable context passed to every command.
//!
//! A [`Context`] is a chain of frames. Each `with_*` call returns a new frame
//! layered on top of the receiver; the receiver itself is never changed, so
//! any number of threads can read a context while others derive new ones
//! from it.

use crate::config::{ClientConfig, ConfigStore};
use crate::db::Database;
use crate::error::{ContextKind, Error, Result};
use crate::paths::HishtoryPaths;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A value bound in one context frame.
#[derive(Debug)]
enum Binding {
    Config(ClientConfig),
    Db(Database),
    HomeDir(PathBuf),
}

impl Binding {
    fn as_config(&self) -> Option<&ClientConfig> {
        match self {
            Binding::Config(config) => Some(config),
            _ => None,
        }
    }

    fn as_db(&self) -> Option<&Database> {
        match self {
            Binding::Db(db) => Some(db),
            _ => None,
        }
    }

    fn as_home_dir(&self) -> Option<&Path> {
        match self {
            Binding::HomeDir(home) => Some(home),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Frame {
    binding: Binding,
    parent: Option<Arc<Frame>>,
}

/// Layered, read-only carrier for the active config, datastore and home directory.
#[derive(Debug, Clone, Default)]
pub struct Context {
    head: Option<Arc<Frame>>,
}

/// Stage of [`Context::bootstrap`] that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStage {
    Config,
    Datastore,
    HomeDir,
}

impl fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapStage::Config => write!(f, "retrieve config"),
            BootstrapStage::Datastore => write!(f, "open local DB"),
            BootstrapStage::HomeDir => write!(f, "get homedir"),
        }
    }
}

/// A failure while assembling the initial context.
///
/// No command can run without a context, so the process entry point should
/// report this and exit with a non-zero status.
#[derive(Debug, thiserror::Error)]
#[error("failed to {stage}: {source}")]
pub struct BootstrapError {
    pub stage: BootstrapStage,
    #[source]
    pub source: Error,
}

impl BootstrapError {
    fn at(stage: BootstrapStage) -> impl FnOnce(Error) -> Self {
        move |source| Self { stage, source }
    }
}

impl Context {
    /// A context with no bindings.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the config, open the datastore and resolve the home directory
    /// from the environment.
    pub fn bootstrap() -> std::result::Result<Self, BootstrapError> {
        let paths = HishtoryPaths::resolve().map_err(BootstrapError::at(BootstrapStage::Config))?;
        Self::bootstrap_at(&paths)
    }

    /// Same as [`Context::bootstrap`] with explicit paths.
    pub fn bootstrap_at(paths: &HishtoryPaths) -> std::result::Result<Self, BootstrapError> {
        let config = ConfigStore::new(paths)
            .load()
            .map_err(BootstrapError::at(BootstrapStage::Config))?;
        let db = Database::open_local(paths).map_err(BootstrapError::at(BootstrapStage::Datastore))?;
        let home = paths.home_dir();
        if !home.is_dir() {
            return Err(BootstrapError::at(BootstrapStage::HomeDir)(Error::HomeDir));
        }
        debug!(home = %home.display(), "Bootstrapped context");

        Ok(Self::empty()
            .with_config(config)
            .with_db(db)
            .with_home_dir(home))
    }

    /// Bootstrap from the environment.
    ///
    /// # Panics
    ///
    /// Panics if any bootstrap stage fails. Use [`Context::bootstrap`] to
    /// handle the failure instead.
    pub fn new() -> Self {
        match Self::bootstrap() {
            Ok(ctx) => ctx,
            Err(e) => panic!("{e}"),
        }
    }

    fn with(&self, binding: Binding) -> Self {
        Self {
            head: Some(Arc::new(Frame {
                binding,
                parent: self.head.clone(),
            })),
        }
    }

    pub fn with_config(&self, config: ClientConfig) -> Self {
        self.with(Binding::Config(config))
    }

    pub fn with_db(&self, db: Database) -> Self {
        self.with(Binding::Db(db))
    }

    pub fn with_home_dir(&self, home: impl Into<PathBuf>) -> Self {
        self.with(Binding::HomeDir(home.into()))
    }

    /// Nearest binding `project` accepts, walking from the newest frame.
    /// `kind` only names the value in the error.
    fn lookup<T: ?Sized>(
        &self,
        kind: ContextKind,
        project: fn(&Binding) -> Option<&T>,
    ) -> Result<&T> {
        let mut frame = self.head.as_deref();
        while let Some(f) = frame {
            if let Some(value) = project(&f.binding) {
                return Ok(value);
            }
            frame = f.parent.as_deref();
        }
        Err(Error::MissingContextValue(kind))
    }

    pub fn try_config(&self) -> Result<&ClientConfig> {
        self.lookup(ContextKind::Config, Binding::as_config)
    }

    pub fn try_db(&self) -> Result<&Database> {
        self.lookup(ContextKind::Db, Binding::as_db)
    }

    pub fn try_home_dir(&self) -> Result<&Path> {
        self.lookup(ContextKind::HomeDir, Binding::as_home_dir)
    }

    /// The active config.
    ///
    /// # Panics
    ///
    /// Panics if no config was bound; every command context is expected to
    /// come from [`Context::bootstrap`] or an equivalent setup.
    pub fn config(&self) -> &ClientConfig {
        self.try_config().unwrap_or_else(|e| panic!("{e}"))
    }

    /// The datastore handle.
    ///
    /// # Panics
    ///
    /// Panics if no datastore was bound.
    pub fn db(&self) -> &Database {
        self.try_db().unwrap_or_else(|e| panic!("{e}"))
    }

    /// The user's home directory.
    ///
    /// # Panics
    ///
    /// Panics if no home directory was bound.
    pub fn home_dir(&self) -> &Path {
        self.try_home_dir().unwrap_or_else(|e| panic!("{e}"))
    }
}
