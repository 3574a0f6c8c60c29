//! Error types for the bootstrap layer.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors returned by the config store, path resolution, datastore and
/// context accessors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to get user's home directory")]
    HomeDir,

    #[error("failed to create {} dir: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading the config file failed. `listing` holds the names found in the
    /// config directory at the time of the failure.
    #[error("failed to read config file (files in {}: {listing}): {source}", dir.display())]
    ConfigRead {
        dir: PathBuf,
        listing: String,
        #[source]
        source: io::Error,
    },

    /// Reading the config file failed and the directory could not be listed
    /// either. The listing failure is the reported source.
    #[error("failed to read config file ({read_error}) and failed to list {} too: {list_source}", dir.display())]
    ConfigList {
        dir: PathBuf,
        read_error: io::Error,
        #[source]
        list_source: io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize config: {0}")]
    ConfigSerialize(#[source] serde_json::Error),

    /// Staging or replacing the config file failed.
    #[error("failed to {action} {}: {source}", path.display())]
    ConfigWrite {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open log file {}: {source}", path.display())]
    LogOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    /// A context accessor found no binding for the requested kind.
    #[error("failed to find {0} in context")]
    MissingContextValue(ContextKind),
}

/// Failures while opening, checking or querying the local SQLite datastore.
#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    #[error("failed to connect to the DB at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to ping DB: {0}")]
    Liveness(#[source] rusqlite::Error),

    #[error("failed to migrate DB schema: {0}")]
    Migration(#[source] refinery::Error),

    #[error("failed to create end time index: {0}")]
    Index(#[source] rusqlite::Error),

    #[error("DB query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// The kinds of values a [`crate::context::Context`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Config,
    Db,
    HomeDir,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKind::Config => write!(f, "config"),
            ContextKind::Db => write!(f, "db"),
            ContextKind::HomeDir => write!(f, "homedir"),
        }
    }
}

/// Result type for bootstrap operations.
pub type Result<T> = std::result::Result<T, Error>;
