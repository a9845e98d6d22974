//! Error types for protection service operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for protection service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by protection service adapters.
///
/// The transient/terminal split drives the caller's retry policy: transient
/// failures may be retried with bounded backoff, terminal failures end the
/// affected operation immediately.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Network failure while talking to the protection service.
    #[error("protection service network failure")]
    Network {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying transport error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The protection service did not answer within the deadline.
    #[error("protection service timeout")]
    Timeout {
        /// Operation identifier.
        operation: &'static str,
    },
    /// The service rejected the call due to exhausted quota.
    #[error("protection service quota exhausted")]
    Quota {
        /// Operation identifier.
        operation: &'static str,
    },
    /// Authentication or authorization against the service failed.
    #[error("protection service authorization failure")]
    Auth {
        /// Operation identifier.
        operation: &'static str,
    },
    /// The source artifact cannot be protected.
    #[error("invalid source artifact")]
    InvalidSource {
        /// Path of the offending artifact.
        path: PathBuf,
        /// Static reason for the rejection.
        reason: &'static str,
    },
    /// The caller lacks permission to read or write an artifact.
    #[error("artifact permission denied")]
    PermissionDenied {
        /// Path of the artifact.
        path: PathBuf,
    },
    /// Local IO failed while staging or committing an artifact.
    #[error("protection io failure")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl ServiceError {
    /// Whether a retry with backoff is worthwhile for this failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }

    /// Operation identifier attached to the failure, when one exists.
    #[must_use]
    pub const fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Network { operation, .. }
            | Self::Timeout { operation }
            | Self::Quota { operation }
            | Self::Auth { operation }
            | Self::Io { operation, .. } => Some(operation),
            Self::InvalidSource { .. } | Self::PermissionDenied { .. } => None,
        }
    }
}
