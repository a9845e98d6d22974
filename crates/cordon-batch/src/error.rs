//! # Design
//!
//! - Structured, constant-message errors for the batch pipeline.
//! - Failures carry the smallest affected scope: a label for issuance, a file
//!   for propagation.
//! - `FailureKind` gives reports and tests a stable classification.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use cordon_protect::{ContentId, LabelId, ServiceError};
use serde::Serialize;
use thiserror::Error;

/// Errors attached to failed propagation results.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Remote license issuance failed for the task's label.
    ///
    /// Issuance is attempted once per label per run; every task under the
    /// label shares the cached failure.
    #[error("license issuance failed")]
    Issuance {
        /// Label whose issuance failed.
        label_id: LabelId,
        /// The cached service failure, shared by every task under the label.
        #[source]
        source: Arc<ServiceError>,
    },
    /// Applying or committing the cached license failed for this file.
    #[error("license propagation failed")]
    Propagation {
        /// Path the failure applies to.
        path: PathBuf,
        /// Underlying service failure.
        #[source]
        source: ServiceError,
    },
    /// The committed output's content identifier diverged from its template.
    ///
    /// Signals the reuse invariant broke; never downgraded to a plain
    /// propagation failure.
    #[error("content identifier mismatch after commit")]
    ConsistencyViolation {
        /// Committed output that failed verification.
        output_path: PathBuf,
        /// Content identifier recorded on the label's template.
        expected: ContentId,
        /// Content identifier read back from the output.
        actual: ContentId,
    },
    /// No template entry exists for the task's label.
    #[error("label missing from template store")]
    Configuration {
        /// Label absent from the store.
        label_id: LabelId,
    },
    /// The batch was cancelled before this task could run.
    #[error("batch cancelled")]
    Cancelled,
}

impl BatchError {
    /// Stable classification of the failure.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Issuance { .. } => FailureKind::Issuance,
            Self::Propagation { .. } => FailureKind::Propagation,
            Self::ConsistencyViolation { .. } => FailureKind::ConsistencyViolation,
            Self::Configuration { .. } => FailureKind::Configuration,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }

    pub(crate) const fn propagation(path: PathBuf, source: ServiceError) -> Self {
        Self::Propagation { path, source }
    }
}

/// Classification of terminal task failures, stable across error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// License issuance failed for the label.
    Issuance,
    /// Apply or commit failed for the file.
    Propagation,
    /// The output's content identifier diverged from its template.
    ConsistencyViolation,
    /// The label's template was missing when propagation started.
    Configuration,
    /// The batch was cancelled.
    Cancelled,
}

impl FailureKind {
    /// Snake-case name used in reports and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Issuance => "issuance",
            Self::Propagation => "propagation",
            Self::ConsistencyViolation => "consistency_violation",
            Self::Configuration => "configuration",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Render an error with its full source chain, colon-separated.
///
/// Events and reports need one line per failure; constant-message errors keep
/// their context in the chain.
#[must_use]
pub fn render_error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
