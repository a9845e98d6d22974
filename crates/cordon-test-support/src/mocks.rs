//! Scripted in-memory protection client for exercising the batch pipeline.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use cordon_protect::{
    ContentId, IssuedLicense, LabelId, LicenseHandle, PreparedFile, ProtectionClient, ServiceError,
    ServiceResult,
};

/// Scripted protection client.
///
/// Records every call, mints deterministic license tokens and content
/// identifiers per issuance, and supports failure injection: permanent
/// issuance failures per label, a budget of transient commit failures, and
/// corrupted read-backs per output path.
#[derive(Clone, Default)]
pub struct MockProtectionClient {
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    issue_seq: AtomicUsize,
    apply_calls: AtomicUsize,
    commit_calls: AtomicUsize,
    read_calls: AtomicUsize,
    issue_calls: Mutex<Vec<String>>,
    failing_labels: Mutex<HashSet<String>>,
    transient_commit_failures: AtomicUsize,
    issued: Mutex<HashMap<String, String>>,
    committed: Mutex<HashMap<PathBuf, String>>,
    corrupted: Mutex<HashMap<PathBuf, String>>,
    write_artifacts: AtomicBool,
}

impl MockProtectionClient {
    /// Construct a well-behaved client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make issuance fail permanently for `label`.
    #[must_use]
    pub fn fail_issuance_for(self, label: impl Into<String>) -> Self {
        lock(&self.state.failing_labels).insert(label.into());
        self
    }

    /// Fail the next `count` commits with a transient timeout.
    #[must_use]
    pub fn with_transient_commit_failures(self, count: usize) -> Self {
        self.state
            .transient_commit_failures
            .store(count, Ordering::SeqCst);
        self
    }

    /// Write template and output artifacts to disk alongside the recorded
    /// state. Only use with paths rooted in a temporary directory.
    #[must_use]
    pub fn with_artifact_writes(self) -> Self {
        self.state.write_artifacts.store(true, Ordering::SeqCst);
        self
    }

    /// Report a corrupted content identifier when `path` is read back.
    pub fn corrupt_output(&self, path: impl Into<PathBuf>, content_id: impl Into<String>) {
        lock(&self.state.corrupted).insert(path.into(), content_id.into());
    }

    /// Total issuance calls observed.
    #[must_use]
    pub fn issue_count(&self) -> usize {
        lock(&self.state.issue_calls).len()
    }

    /// Issuance calls observed for one label.
    #[must_use]
    pub fn issue_count_for(&self, label: &str) -> usize {
        lock(&self.state.issue_calls)
            .iter()
            .filter(|seen| seen.as_str() == label)
            .count()
    }

    /// Total apply calls observed.
    #[must_use]
    pub fn apply_count(&self) -> usize {
        self.state.apply_calls.load(Ordering::SeqCst)
    }

    /// Total commit calls observed.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.state.commit_calls.load(Ordering::SeqCst)
    }

    /// Total read-back calls observed.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.state.read_calls.load(Ordering::SeqCst)
    }

    fn writes_artifacts(&self) -> bool {
        self.state.write_artifacts.load(Ordering::SeqCst)
    }
}

/// Lock a mock-state mutex, tolerating poisoning from panicked test tasks.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_artifact(path: &Path, contents: &str) -> ServiceResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ServiceError::Io {
            operation: "create_dir",
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, contents).map_err(|source| ServiceError::Io {
        operation: "write_artifact",
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl ProtectionClient for MockProtectionClient {
    async fn issue_license(
        &self,
        _plaintext_path: &Path,
        label_id: &LabelId,
        artifact_path: &Path,
    ) -> ServiceResult<IssuedLicense> {
        lock(&self.state.issue_calls).push(label_id.to_string());
        if lock(&self.state.failing_labels).contains(label_id.as_str()) {
            return Err(ServiceError::Network {
                operation: "issue_license",
                source: io::Error::other("injected issuance failure").into(),
            });
        }

        let sequence = self.state.issue_seq.fetch_add(1, Ordering::SeqCst);
        let token = format!("pl-{label_id}-{sequence}");
        let content_id = format!("cid-{label_id}-{sequence}");
        lock(&self.state.issued).insert(token.clone(), content_id.clone());

        if self.writes_artifacts() {
            write_artifact(
                artifact_path,
                &format!("cordon-template\nlabel: {label_id}\ncontent_id: {content_id}\n"),
            )?;
        }

        Ok(IssuedLicense {
            handle: LicenseHandle::from_token(token),
            content_id: ContentId::new(content_id),
            artifact_path: artifact_path.to_path_buf(),
        })
    }

    async fn apply_license(
        &self,
        source_path: &Path,
        label_id: &LabelId,
        handle: &LicenseHandle,
    ) -> ServiceResult<PreparedFile> {
        self.state.apply_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PreparedFile {
            token: handle.token().to_string(),
            source_path: source_path.to_path_buf(),
            label_id: label_id.clone(),
        })
    }

    async fn commit(&self, prepared: PreparedFile, output_path: &Path) -> ServiceResult<()> {
        self.state.commit_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.state.transient_commit_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .transient_commit_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(ServiceError::Timeout {
                operation: "commit",
            });
        }

        let content_id = lock(&self.state.issued)
            .get(&prepared.token)
            .cloned()
            .unwrap_or_else(|| "cid-unknown".to_string());
        lock(&self.state.committed).insert(output_path.to_path_buf(), content_id.clone());

        if self.writes_artifacts() {
            write_artifact(
                output_path,
                &format!(
                    "cordon-protected\nlabel: {}\ncontent_id: {content_id}\n",
                    prepared.label_id
                ),
            )?;
        }
        Ok(())
    }

    async fn read_content_id(&self, path: &Path) -> ServiceResult<ContentId> {
        self.state.read_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(corrupted) = lock(&self.state.corrupted).get(path) {
            return Ok(ContentId::new(corrupted.clone()));
        }

        lock(&self.state.committed)
            .get(path)
            .map(|content_id| ContentId::new(content_id.clone()))
            .ok_or_else(|| ServiceError::Io {
                operation: "read_content_id",
                path: path.to_path_buf(),
                source: io::Error::other("no committed artifact at path"),
            })
    }
}
