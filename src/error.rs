use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Application-wide error type for devsweep.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Refusing to remove '{}': path is outside every safe root", path.display())]
    UnsafePath { path: PathBuf },

    #[error("Failed to remove '{}': {source}", path.display())]
    Removal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Source '{source_name}' does not support {operation}")]
    Unsupported { source_name: String, operation: &'static str },

    #[error("Unknown cache source '{0}'")]
    UnknownSource(String),

    #[error("Invalid category selector '{0}' (expected SOURCE:CATEGORY)")]
    InvalidCategory(String),

    #[error("Docker error: {0}")]
    Docker(String),

    #[error("Failed to launch editor: {0}")]
    Editor(String),

    #[error("Prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to write configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Invalid protected pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        AppError::Config(msg.into())
    }

    /// True for the one failure that signals a logic bug rather than an
    /// environmental condition.
    pub fn is_unsafe_path(&self) -> bool {
        matches!(self, AppError::UnsafePath { .. })
    }
}
