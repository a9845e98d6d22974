//! Per-file license propagation with bounded retry and read-back verification.

use std::sync::Arc;
use std::time::Duration;

use cordon_config::RetryPolicy;
use cordon_events::{Event, EventBus};
use cordon_protect::{ContentId, ProtectionClient, ServiceResult};
use cordon_telemetry::Metrics;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{BatchError, render_error_chain};
use crate::model::{FileTask, PropagationResult, TemplateEntry};

/// Applies a label's cached license to one file, commits the output and
/// verifies the committed content identifier against the template's.
#[derive(Clone)]
pub struct PropagationWorker {
    client: Arc<dyn ProtectionClient>,
    events: EventBus,
    metrics: Metrics,
    retry: RetryPolicy,
}

impl PropagationWorker {
    /// Construct a worker with the batch's retry policy.
    #[must_use]
    pub fn new(
        client: Arc<dyn ProtectionClient>,
        events: EventBus,
        metrics: Metrics,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            events,
            metrics,
            retry,
        }
    }

    /// Propagate the template's license onto `task`, producing its terminal
    /// result.
    ///
    /// The license handle is borrowed from the template entry; the entry stays
    /// owned by the store for the lifetime of the run.
    pub async fn propagate(
        &self,
        batch_id: Uuid,
        task: FileTask,
        template: Arc<TemplateEntry>,
    ) -> PropagationResult {
        let _ = self.events.publish(Event::PropagationStarted {
            batch_id,
            source_path: task.source_path.display().to_string(),
            label_id: task.label_id.to_string(),
        });

        match self.execute(&task, &template).await {
            Ok(content_id) => {
                let _ = self.events.publish(Event::PropagationCompleted {
                    batch_id,
                    output_path: task.output_path.display().to_string(),
                    label_id: task.label_id.to_string(),
                    content_id: content_id.to_string(),
                });
                info!(
                    output_path = %task.output_path.display(),
                    label_id = %task.label_id,
                    content_id = %content_id,
                    "file protected under shared license"
                );
                PropagationResult::succeeded(task, content_id)
            }
            Err(error) => {
                self.publish_failure(batch_id, &task, &error);
                PropagationResult::failed(task, error)
            }
        }
    }

    async fn execute(
        &self,
        task: &FileTask,
        template: &TemplateEntry,
    ) -> Result<ContentId, BatchError> {
        self.commit_with_retry(task, template)
            .await
            .map_err(|source| BatchError::propagation(task.source_path.clone(), source))?;

        let actual = self
            .read_back_with_retry(task)
            .await
            .map_err(|source| BatchError::propagation(task.output_path.clone(), source))?;

        if actual == template.content_id {
            self.metrics.inc_propagation_step("verify", "completed");
            Ok(actual)
        } else {
            self.metrics.inc_propagation_step("verify", "failed");
            Err(BatchError::ConsistencyViolation {
                output_path: task.output_path.clone(),
                expected: template.content_id.clone(),
                actual,
            })
        }
    }

    /// Apply and commit as one retryable unit: `commit` consumes the prepared
    /// state, so a failed commit re-applies before trying again.
    async fn commit_with_retry(
        &self,
        task: &FileTask,
        template: &TemplateEntry,
    ) -> ServiceResult<()> {
        let mut attempt = 1;
        loop {
            match self.apply_and_commit(task, template).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    self.metrics.inc_propagation_retry();
                    warn!(
                        source_path = %task.source_path.display(),
                        attempt,
                        error = %render_error_chain(&err),
                        "transient propagation failure, backing off"
                    );
                    sleep(backoff_delay(&self.retry, attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn apply_and_commit(&self, task: &FileTask, template: &TemplateEntry) -> ServiceResult<()> {
        let prepared = match self
            .client
            .apply_license(&task.source_path, &task.label_id, &template.license)
            .await
        {
            Ok(prepared) => {
                self.metrics.inc_propagation_step("apply", "completed");
                prepared
            }
            Err(err) => {
                self.metrics.inc_propagation_step("apply", "failed");
                return Err(err);
            }
        };

        match self.client.commit(prepared, &task.output_path).await {
            Ok(()) => {
                self.metrics.inc_propagation_step("commit", "completed");
                Ok(())
            }
            Err(err) => {
                self.metrics.inc_propagation_step("commit", "failed");
                Err(err)
            }
        }
    }

    async fn read_back_with_retry(&self, task: &FileTask) -> ServiceResult<ContentId> {
        let mut attempt = 1;
        loop {
            match self.client.read_content_id(&task.output_path).await {
                Ok(content_id) => {
                    self.metrics.inc_propagation_step("read_back", "completed");
                    return Ok(content_id);
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    self.metrics.inc_propagation_retry();
                    warn!(
                        output_path = %task.output_path.display(),
                        attempt,
                        error = %render_error_chain(&err),
                        "transient read-back failure, backing off"
                    );
                    sleep(backoff_delay(&self.retry, attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.metrics.inc_propagation_step("read_back", "failed");
                    return Err(err);
                }
            }
        }
    }

    fn publish_failure(&self, batch_id: Uuid, task: &FileTask, error: &BatchError) {
        if let BatchError::ConsistencyViolation {
            output_path,
            expected,
            actual,
        } = error
        {
            self.metrics.inc_consistency_violation();
            let _ = self.events.publish(Event::ConsistencyViolation {
                batch_id,
                output_path: output_path.display().to_string(),
                label_id: task.label_id.to_string(),
                expected_content_id: expected.to_string(),
                actual_content_id: actual.to_string(),
            });
        } else {
            let _ = self.events.publish(Event::PropagationFailed {
                batch_id,
                source_path: task.source_path.display().to_string(),
                label_id: task.label_id.to_string(),
                message: render_error_chain(error),
            });
        }
        warn!(
            source_path = %task.source_path.display(),
            label_id = %task.label_id,
            kind = error.kind().as_str(),
            error = %render_error_chain(error),
            "propagation failed"
        );
    }
}

fn backoff_delay(retry: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = u64::from(retry.backoff_multiplier).saturating_pow(exponent);
    Duration::from_millis(retry.initial_backoff_ms.saturating_mul(factor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use async_trait::async_trait;
    use cordon_protect::{IssuedLicense, LabelId, LicenseHandle, PreparedFile, ServiceError};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClient {
        apply_calls: AtomicUsize,
        commit_calls: AtomicUsize,
        transient_commit_failures: AtomicUsize,
        terminal_apply_failure: bool,
        committed_content_id: String,
    }

    impl ScriptedClient {
        fn new(committed_content_id: &str) -> Self {
            Self {
                apply_calls: AtomicUsize::new(0),
                commit_calls: AtomicUsize::new(0),
                transient_commit_failures: AtomicUsize::new(0),
                terminal_apply_failure: false,
                committed_content_id: committed_content_id.to_string(),
            }
        }

        fn with_transient_commit_failures(self, count: usize) -> Self {
            self.transient_commit_failures.store(count, Ordering::SeqCst);
            self
        }

        fn with_terminal_apply_failure(mut self) -> Self {
            self.terminal_apply_failure = true;
            self
        }
    }

    #[async_trait]
    impl ProtectionClient for ScriptedClient {
        async fn issue_license(
            &self,
            _plaintext_path: &Path,
            _label_id: &LabelId,
            _artifact_path: &Path,
        ) -> ServiceResult<IssuedLicense> {
            unreachable!("propagation never issues licenses")
        }

        async fn apply_license(
            &self,
            source_path: &Path,
            label_id: &LabelId,
            handle: &LicenseHandle,
        ) -> ServiceResult<PreparedFile> {
            self.apply_calls.fetch_add(1, Ordering::SeqCst);
            if self.terminal_apply_failure {
                return Err(ServiceError::InvalidSource {
                    path: source_path.to_path_buf(),
                    reason: "unsupported container",
                });
            }
            Ok(PreparedFile {
                token: handle.token().to_string(),
                source_path: source_path.to_path_buf(),
                label_id: label_id.clone(),
            })
        }

        async fn commit(&self, _prepared: PreparedFile, _output_path: &Path) -> ServiceResult<()> {
            self.commit_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.transient_commit_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_commit_failures
                    .store(remaining - 1, Ordering::SeqCst);
                return Err(ServiceError::Timeout {
                    operation: "commit",
                });
            }
            Ok(())
        }

        async fn read_content_id(&self, _path: &Path) -> ServiceResult<ContentId> {
            Ok(ContentId::new(self.committed_content_id.clone()))
        }
    }

    fn sample_task() -> FileTask {
        FileTask {
            source_path: PathBuf::from("input/a.txt"),
            output_path: PathBuf::from("output/a.txt"),
            label_id: LabelId::new("l1"),
        }
    }

    fn sample_template(content_id: &str) -> Arc<TemplateEntry> {
        Arc::new(TemplateEntry {
            label_id: LabelId::new("l1"),
            license: LicenseHandle::from_token("pl-l1"),
            content_id: ContentId::new(content_id),
            template_path: PathBuf::from("templates/l1.txt"),
        })
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            backoff_multiplier: 2,
        }
    }

    fn worker(client: Arc<ScriptedClient>) -> (PropagationWorker, EventBus) {
        let events = EventBus::with_capacity(64);
        let metrics = Metrics::new().expect("metrics registry");
        (
            PropagationWorker::new(client, events.clone(), metrics, fast_retry()),
            events,
        )
    }

    #[tokio::test]
    async fn successful_propagation_verifies_against_template() {
        let client = Arc::new(ScriptedClient::new("cid-l1"));
        let (worker, _events) = worker(Arc::clone(&client));

        let result = worker
            .propagate(Uuid::new_v4(), sample_task(), sample_template("cid-l1"))
            .await;

        assert!(result.is_success());
        assert_eq!(result.content_id(), Some(&ContentId::new("cid-l1")));
        assert_eq!(client.apply_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.commit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_commit_failures_retry_until_bound() {
        let client = Arc::new(ScriptedClient::new("cid-l1").with_transient_commit_failures(2));
        let (worker, _events) = worker(Arc::clone(&client));

        let result = worker
            .propagate(Uuid::new_v4(), sample_task(), sample_template("cid-l1"))
            .await;

        assert!(result.is_success(), "third attempt should succeed");
        assert_eq!(client.commit_calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            client.apply_calls.load(Ordering::SeqCst),
            3,
            "commit consumes prepared state, so each retry re-applies"
        );
    }

    #[tokio::test]
    async fn exhausted_retries_fail_with_propagation_kind() {
        let client = Arc::new(ScriptedClient::new("cid-l1").with_transient_commit_failures(5));
        let (worker, _events) = worker(Arc::clone(&client));

        let result = worker
            .propagate(Uuid::new_v4(), sample_task(), sample_template("cid-l1"))
            .await;

        let error = result.error().expect("propagation should fail");
        assert_eq!(error.kind(), FailureKind::Propagation);
        assert_eq!(
            client.commit_calls.load(Ordering::SeqCst),
            3,
            "attempts stay within the configured bound"
        );
    }

    #[tokio::test]
    async fn terminal_failures_are_not_retried() {
        let client = Arc::new(ScriptedClient::new("cid-l1").with_terminal_apply_failure());
        let (worker, _events) = worker(Arc::clone(&client));

        let result = worker
            .propagate(Uuid::new_v4(), sample_task(), sample_template("cid-l1"))
            .await;

        let error = result.error().expect("propagation should fail");
        assert_eq!(error.kind(), FailureKind::Propagation);
        assert_eq!(client.apply_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn content_id_mismatch_is_consistency_violation() {
        let client = Arc::new(ScriptedClient::new("cid-someone-else"));
        let (worker, events) = worker(client);
        let mut stream = events.subscribe(None);

        let result = worker
            .propagate(Uuid::new_v4(), sample_task(), sample_template("cid-l1"))
            .await;

        let error = result.error().expect("verification should fail");
        assert_eq!(error.kind(), FailureKind::ConsistencyViolation);

        let mut saw_violation = false;
        while let Some(envelope) = stream.next().await {
            if let Event::ConsistencyViolation {
                expected_content_id,
                actual_content_id,
                ..
            } = envelope.event
            {
                assert_eq!(expected_content_id, "cid-l1");
                assert_eq!(actual_content_id, "cid-someone-else");
                saw_violation = true;
                break;
            }
        }
        assert!(saw_violation, "violation event published");
    }
}
