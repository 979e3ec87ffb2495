//! Errors for the fallible edge of the crate: reading and writing
//! configuration files. Playback and building never fail; anomalies are
//! clamped or skipped with a warning.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeedbackError>;

/// Errors from reading or writing configuration.
#[derive(Debug, Error)]
pub enum FeedbackError {
    /// IO error reading or writing a config
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
