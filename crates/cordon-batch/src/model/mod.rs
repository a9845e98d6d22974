//! Domain models for the batch protection pipeline.
//!
//! # Design
//! - `TemplateEntry` owns its label's `LicenseHandle`; everything else borrows.
//! - Results stay terminal: one `PropagationResult` per task, produced once.

use std::collections::HashSet;
use std::path::PathBuf;

use cordon_config::BatchManifest;
use cordon_protect::{ContentId, LabelId, LicenseHandle};
use uuid::Uuid;

use crate::error::BatchError;

/// Immutable inputs for one batch protection run.
#[derive(Copy, Clone)]
pub struct BatchRequest<'a> {
    /// Identifier of the batch run, used for event correlation.
    pub batch_id: Uuid,
    /// Validated manifest describing the file → label mapping and locations.
    pub manifest: &'a BatchManifest,
}

/// One file to protect under one label. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    /// Plaintext source artifact.
    pub source_path: PathBuf,
    /// Destination of the protected output.
    pub output_path: PathBuf,
    /// Label the output must carry.
    pub label_id: LabelId,
}

impl FileTask {
    /// Derive the ordered task list from a manifest, preserving input order.
    #[must_use]
    pub fn from_manifest(manifest: &BatchManifest) -> Vec<Self> {
        manifest
            .files
            .iter()
            .map(|mapping| Self {
                source_path: mapping.source.clone(),
                output_path: manifest.output_path_for(mapping),
                label_id: LabelId::new(mapping.label_id.clone()),
            })
            .collect()
    }
}

/// The single issued license anchoring one label for the current run.
///
/// Exactly one entry exists per distinct label per run; it owns the label's
/// `LicenseHandle` and every propagation borrows the handle from here.
#[derive(Debug)]
pub struct TemplateEntry {
    /// Label the license was issued for.
    pub label_id: LabelId,
    /// The issued license handle, re-applied to every file under the label.
    pub license: LicenseHandle,
    /// Content identifier derived from the issued license.
    pub content_id: ContentId,
    /// Location of the committed template artifact kept as an audit record.
    pub template_path: PathBuf,
}

/// Terminal outcome of propagating one file.
#[derive(Debug)]
pub enum PropagationOutcome {
    /// The output committed and verified against the template's content id.
    Success {
        /// Content identifier read back from the committed output.
        content_id: ContentId,
    },
    /// The file could not be protected.
    Failed {
        /// The failure, classified by [`crate::FailureKind`].
        error: BatchError,
    },
}

/// One task paired with its terminal outcome.
#[derive(Debug)]
pub struct PropagationResult {
    /// The task this result belongs to.
    pub task: FileTask,
    /// Success or typed failure.
    pub outcome: PropagationOutcome,
}

impl PropagationResult {
    /// Build a success result.
    #[must_use]
    pub const fn succeeded(task: FileTask, content_id: ContentId) -> Self {
        Self {
            task,
            outcome: PropagationOutcome::Success { content_id },
        }
    }

    /// Build a failure result.
    #[must_use]
    pub const fn failed(task: FileTask, error: BatchError) -> Self {
        Self {
            task,
            outcome: PropagationOutcome::Failed { error },
        }
    }

    /// Whether the task committed and verified successfully.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, PropagationOutcome::Success { .. })
    }

    /// Content identifier of the committed output, when successful.
    #[must_use]
    pub const fn content_id(&self) -> Option<&ContentId> {
        match &self.outcome {
            PropagationOutcome::Success { content_id } => Some(content_id),
            PropagationOutcome::Failed { .. } => None,
        }
    }

    /// The failure, when the task did not succeed.
    #[must_use]
    pub const fn error(&self) -> Option<&BatchError> {
        match &self.outcome {
            PropagationOutcome::Success { .. } => None,
            PropagationOutcome::Failed { error } => Some(error),
        }
    }
}

/// Complete, ordered report for one batch run.
#[derive(Debug)]
pub struct BatchReport {
    /// Identifier of the batch run.
    pub batch_id: Uuid,
    /// One result per input task, in input order.
    pub results: Vec<PropagationResult>,
}

impl BatchReport {
    /// Number of tasks that succeeded.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Number of tasks that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Whether every task in the batch failed.
    #[must_use]
    pub fn is_total_failure(&self) -> bool {
        !self.results.is_empty() && self.succeeded() == 0
    }
}

/// Distinct labels across the task list, in first-appearance order.
#[must_use]
pub fn distinct_labels(tasks: &[FileTask]) -> Vec<LabelId> {
    let mut seen = HashSet::new();
    let mut labels = Vec::new();
    for task in tasks {
        if seen.insert(task.label_id.clone()) {
            labels.push(task.label_id.clone());
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use cordon_config::FileMapping;

    fn manifest() -> BatchManifest {
        cordon_config::parse_manifest(
            r#"{
                "canonical_plaintext": "input/canonical.txt",
                "template_dir": "templates",
                "output_dir": "output",
                "files": [
                    {"source": "input/a.txt", "label_id": "l1"},
                    {"source": "input/b.txt", "label_id": "l1"},
                    {"source": "input/c.txt", "label_id": "l2"}
                ]
            }"#,
        )
        .expect("sample manifest")
    }

    #[test]
    fn tasks_follow_manifest_order_and_derive_outputs() {
        let manifest = manifest();
        let tasks = FileTask::from_manifest(&manifest);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].output_path, PathBuf::from("output/a.txt"));
        assert_eq!(tasks[2].label_id, LabelId::new("l2"));
    }

    #[test]
    fn distinct_labels_preserve_first_appearance_order() {
        let manifest = manifest();
        let tasks = FileTask::from_manifest(&manifest);
        let labels = distinct_labels(&tasks);
        assert_eq!(labels, vec![LabelId::new("l1"), LabelId::new("l2")]);
    }

    #[test]
    fn report_counts_partition_results() {
        let manifest = manifest();
        let tasks = FileTask::from_manifest(&manifest);
        let mut tasks = tasks.into_iter();
        let ok_task = tasks.next().expect("task");
        let failed_task = tasks.next().expect("task");

        let report = BatchReport {
            batch_id: Uuid::nil(),
            results: vec![
                PropagationResult::succeeded(ok_task, ContentId::new("cid-1")),
                PropagationResult::failed(failed_task, BatchError::Cancelled),
            ],
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_total_failure());
    }

    #[test]
    fn unnamed_sources_still_resolve_an_output() {
        let manifest = manifest();
        let mapping = FileMapping::new("..", "l1");
        let output = manifest.output_path_for(&mapping);
        assert_eq!(output, PathBuf::from("output/unnamed"));
    }
}
