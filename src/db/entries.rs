//! History entry persistence.

use super::Database;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};

/// A recorded shell command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub local_username: String,
    pub hostname: String,
    pub command: String,
    pub current_working_directory: String,
    pub home_directory: String,
    pub exit_code: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub device_id: String,
    pub entry_id: String,
}

const ENTRY_COLUMNS: &str = "local_username, hostname, command, current_working_directory,
     home_directory, exit_code, start_time, end_time, device_id, entry_id";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        local_username: row.get(0)?,
        hostname: row.get(1)?,
        command: row.get(2)?,
        current_working_directory: row.get(3)?,
        home_directory: row.get(4)?,
        exit_code: row.get(5)?,
        start_time: row.get(6)?,
        end_time: row.get(7)?,
        device_id: row.get(8)?,
        entry_id: row.get(9)?,
    })
}

impl Database {
    /// Insert an entry. Returns `false` if an identical entry is already stored.
    pub fn insert_entry(&self, entry: &HistoryEntry) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO history_entries ({ENTRY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    entry.local_username,
                    entry.hostname,
                    entry.command,
                    entry.current_working_directory,
                    entry.home_directory,
                    entry.exit_code,
                    entry.start_time,
                    entry.end_time,
                    entry.device_id,
                    entry.entry_id,
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn count_entries(&self) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM history_entries", [], |row| row.get(0))
        })
    }

    /// Most recent entries by end time, newest first.
    pub fn latest_entries(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM history_entries ORDER BY end_time DESC LIMIT ?1"
            ))?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let entries = stmt
                .query_map([limit], entry_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }
}
