//! Structured errors for manifest loading and validation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors emitted while loading or validating a batch manifest.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the manifest file from disk failed.
    #[error("failed to read manifest")]
    Io {
        /// Path of the manifest file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The manifest document was not valid JSON for the expected schema.
    #[error("failed to parse manifest")]
    Parse {
        /// Path of the manifest file when loaded from disk.
        path: Option<PathBuf>,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A manifest field contained an invalid value.
    #[error("invalid value for '{field}': {message}")]
    InvalidField {
        /// Field that failed validation.
        field: &'static str,
        /// Human-readable error description.
        message: String,
    },
    /// Two file mappings resolve to the same output artifact.
    #[error("duplicate output path")]
    DuplicateOutput {
        /// The colliding output path.
        output: PathBuf,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}
