//! Error types for retro-rl

use thiserror::Error;

/// Result type for retro-rl operations
pub type Result<T> = std::result::Result<T, RetroRlError>;

/// retro-rl error types
///
/// Transport silence is not an error here: the command channel reports a
/// missing reply as `None`. These variants cover failures the bridge loop
/// logs and survives, or that abort startup.
#[derive(Debug, Error)]
pub enum RetroRlError {
    /// Socket setup or send failure
    #[error("IPC error: {0}")]
    IpcError(String),

    /// Screen capture failed or is unavailable
    #[error("Capture error: {0}")]
    CaptureError(String),

    /// Host input injection failed
    #[error("Input error: {0}")]
    InputError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    ConfigError(String),

    /// Filesystem error on an exchange or checkpoint file
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl RetroRlError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        RetroRlError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl From<serde_json::Error> for RetroRlError {
    fn from(err: serde_json::Error) -> Self {
        RetroRlError::SerializationError(err.to_string())
    }
}
