//! Typed models for the batch manifest document.
//!
//! # Design
//! - Mirror the on-disk JSON schema directly; derived values stay as methods.
//! - Defaults keep hand-written manifests short.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level description of one batch protection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchManifest {
    /// Canonical plaintext input protected once per label to anchor its license.
    pub canonical_plaintext: PathBuf,
    /// Directory receiving one protected template artifact per label.
    pub template_dir: PathBuf,
    /// Directory receiving the protected output for every mapped file.
    pub output_dir: PathBuf,
    /// The file → label mapping to execute.
    pub files: Vec<FileMapping>,
    /// Retry policy for transient propagation failures.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Logging settings applied during bootstrap.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl BatchManifest {
    /// Resolve the output artifact path for a mapping.
    ///
    /// Outputs keep the source file name under `output_dir`, matching the
    /// layout produced for template artifacts under `template_dir`.
    #[must_use]
    pub fn output_path_for(&self, mapping: &FileMapping) -> PathBuf {
        let name = mapping
            .source
            .file_name()
            .map_or_else(|| PathBuf::from("unnamed"), PathBuf::from);
        self.output_dir.join(name)
    }

    /// Resolve the template artifact path for a label.
    ///
    /// Template artifacts are named `<label-id>` with the canonical input's
    /// extension, one per distinct label.
    #[must_use]
    pub fn template_path_for(&self, label_id: &str) -> PathBuf {
        let mut name = PathBuf::from(label_id);
        if let Some(extension) = self.canonical_plaintext.extension() {
            name.set_extension(extension);
        }
        self.template_dir.join(name)
    }
}

/// One source file and the label it must be protected under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMapping {
    /// Path of the plaintext source file.
    pub source: PathBuf,
    /// Label identifier assigned by the caller.
    pub label_id: String,
}

impl FileMapping {
    /// Convenience constructor used by tests and fixtures.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>, label_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            label_id: label_id.into(),
        }
    }

    /// Borrow the source path.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }
}

/// Bounded backoff policy for transient propagation failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts per file, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Multiplier applied to the delay after each retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Logging settings applied by the application bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level string (e.g., `info`, `debug`).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format name (`json` or `pretty`); inferred when absent.
    #[serde(default)]
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: None,
        }
    }
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    250
}

const fn default_backoff_multiplier() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}
