//! hishtory-core: bootstrap layer for the hishtory shell history client.
//!
//! Provides the pieces every command needs before it can run: the persisted
//! client config, the local SQLite datastore, a rotating log, and a
//! [`context::Context`] carrying them through the call graph.

pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;
pub mod paths;

pub use config::{ClientConfig, ConfigStore};
pub use context::{BootstrapError, Context};
pub use db::Database;
pub use error::{Error, Result};
