//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A configured backend exists but this build does not provide it.
    #[error("unsupported setting: {0}")]
    Unsupported(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
