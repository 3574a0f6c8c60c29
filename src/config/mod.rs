//! Client configuration.
//!
//! The record lives at `<home>/<data dir>/config.json`:
//! - [`ConfigStore::load`] reads it and fills display defaults
//! - [`ConfigStore::save`] replaces it atomically (staging file + rename)
//! - [`ConfigStore::init_if_absent`] writes an empty record on first run

mod store;
mod types;

pub use store::ConfigStore;
pub use types::*;
