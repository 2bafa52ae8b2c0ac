/// Error types for Tab Clear
use thiserror::Error;

/// Failures talking to the key-value store
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("Failed to read '{key}': {message}")]
    Read { key: String, message: String },

    #[error("Failed to write '{key}': {message}")]
    Write { key: String, message: String },

    #[error("Failed to decode '{key}': {message}")]
    Decode { key: String, message: String },
}

/// Failures reported by the tab, alarm or runtime APIs
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BrowserError {
    #[error("Failed to query tabs: {0}")]
    Query(String),

    #[error("Failed to remove tab {tab_id}: {message}")]
    Remove { tab_id: i32, message: String },

    #[error("Failed to schedule alarm '{name}': {message}")]
    Schedule { name: String, message: String },
}

/// Failures of a remote classification call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OracleError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API Error: {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Rejections raised when the user saves settings
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SettingsError {
    #[error("Idle time must be at least 1 minute")]
    IdleTime,

    #[error("Minimum tab count must be at least 1")]
    MinTabCount,

    #[error("Native tab idle time must be at least 1 minute")]
    NativeTabIdleTime,

    #[error("History limit must be at least 1")]
    HistoryLimit,

    #[error("An API key is required for remote grouping")]
    MissingApiKey,

    #[error("Invalid patterns: {}", .0.join(", "))]
    InvalidPatterns(Vec<String>),
}

/// Crate-level error
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}
