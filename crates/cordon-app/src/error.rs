//! # Design
//!
//! - Centralize application-level errors for bootstrap and batch execution.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Environment configuration was missing.
    #[error("missing environment configuration")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: &'static str,
    },
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: cordon_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: cordon_telemetry::TelemetryError,
    },
    /// Every task in the batch failed.
    #[error("batch failed for all tasks")]
    BatchFailed {
        /// Number of failed tasks.
        failed: usize,
        /// Total number of tasks in the batch.
        total: usize,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: cordon_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: cordon_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }
}
