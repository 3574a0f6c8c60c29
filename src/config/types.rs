//! The persisted client configuration record.

use serde::{Deserialize, Deserializer, Serialize};

/// Columns shown by default when the record leaves `displayed_columns` empty.
pub const DEFAULT_DISPLAYED_COLUMNS: [&str; 6] = [
    "Hostname",
    "CWD",
    "Timestamp",
    "Runtime",
    "Exit Code",
    "Command",
];

/// Default timestamp format (chrono `strftime` syntax).
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%b %-d %Y %H:%M:%S %Z";

/// Per-user client configuration.
///
/// Every field is optional on disk. Missing keys and explicit `null`s both
/// deserialize to the field's zero value; [`ClientConfig::apply_defaults`]
/// fills the display settings afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Seed used to derive the sync encryption keys.
    #[serde(deserialize_with = "nullable")]
    pub user_secret: String,

    /// Whether history recording is enabled.
    #[serde(deserialize_with = "nullable")]
    pub is_enabled: bool,

    /// Identifies which device a history entry came from.
    #[serde(deserialize_with = "nullable")]
    pub device_id: String,

    /// Last history line seen, used to skip space-prefixed commands in bash.
    #[serde(deserialize_with = "nullable")]
    pub last_saved_history_line: String,

    /// Entries that could not be uploaded while offline.
    #[serde(deserialize_with = "nullable")]
    pub have_missed_uploads: bool,

    /// Epoch seconds of the first missed upload.
    #[serde(deserialize_with = "nullable")]
    pub missed_upload_timestamp: i64,

    /// Guards against importing the shell's history file twice.
    #[serde(deserialize_with = "nullable")]
    pub have_completed_initial_import: bool,

    #[serde(rename = "enable_control_r_search", deserialize_with = "nullable")]
    pub control_r_search_enabled: bool,

    #[serde(deserialize_with = "nullable")]
    pub displayed_columns: Vec<String>,

    #[serde(deserialize_with = "nullable")]
    pub custom_columns: Vec<CustomColumnDefinition>,

    /// Offline instances never sync.
    #[serde(deserialize_with = "nullable")]
    pub is_offline: bool,

    #[serde(deserialize_with = "nullable")]
    pub filter_duplicate_commands: bool,

    #[serde(deserialize_with = "nullable")]
    pub timestamp_format: String,
}

/// A user-defined column computed by running a shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomColumnDefinition {
    #[serde(deserialize_with = "nullable")]
    pub column_name: String,
    #[serde(deserialize_with = "nullable")]
    pub column_command: String,
}

impl ClientConfig {
    /// Fill empty display settings with their defaults.
    pub fn apply_defaults(&mut self) {
        if self.displayed_columns.is_empty() {
            self.displayed_columns = DEFAULT_DISPLAYED_COLUMNS
                .iter()
                .map(|c| c.to_string())
                .collect();
        }
        if self.timestamp_format.is_empty() {
            self.timestamp_format = DEFAULT_TIMESTAMP_FORMAT.to_string();
        }
    }
}

/// Treat a JSON `null` like a missing key.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
