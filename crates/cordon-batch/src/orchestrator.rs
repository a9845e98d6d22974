//! Batch orchestration: phase barrier, cancellation and ordered reporting.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use cordon_events::{Event, EventBus};
use cordon_protect::{ProtectionClient, ServiceError};
use cordon_telemetry::Metrics;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::coordinator::IssuanceCoordinator;
use crate::error::BatchError;
use crate::model::{
    BatchReport, BatchRequest, FileTask, PropagationResult, distinct_labels,
};
use crate::propagate::PropagationWorker;
use crate::store::TemplateStore;

const HEALTH_COMPONENT: &str = "batch";

/// Cancellation handle for one batch run.
///
/// Cancelling before phase 1 completes fails every task; cancelling during
/// phase 2 lets in-flight propagations finish and prevents new ones from
/// starting.
#[derive(Clone, Default)]
pub struct BatchHandle {
    cancelled: Arc<AtomicBool>,
}

impl BatchHandle {
    /// Construct a fresh, uncancelled handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the batch.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

enum Pending {
    Ready(PropagationResult),
    Running(FileTask, JoinHandle<PropagationResult>),
}

/// Drives a batch run through its two phases and assembles the ordered report.
pub struct BatchOrchestrator {
    client: Arc<dyn ProtectionClient>,
    events: EventBus,
    metrics: Metrics,
    health_degraded: Arc<Mutex<bool>>,
}

impl BatchOrchestrator {
    /// Construct an orchestrator over a protection service client.
    #[must_use]
    pub fn new(client: Arc<dyn ProtectionClient>, events: EventBus, metrics: Metrics) -> Self {
        Self {
            client,
            events,
            metrics,
            health_degraded: Arc::new(Mutex::new(false)),
        }
    }

    /// Execute the batch described by `request`.
    ///
    /// Phase 1 resolves every distinct label to a single template license;
    /// propagation for a label never begins before that label's slot is
    /// resolved. The returned report carries one result per input file, in
    /// input order, regardless of execution concurrency.
    pub async fn run_batch(
        &self,
        request: BatchRequest<'_>,
        cancel: &BatchHandle,
    ) -> BatchReport {
        let batch_id = request.batch_id;
        let tasks = FileTask::from_manifest(request.manifest);
        let labels = distinct_labels(&tasks);

        let _ = self.events.publish(Event::BatchStarted {
            batch_id,
            file_count: tasks.len(),
            label_count: labels.len(),
        });
        info!(
            batch_id = %batch_id,
            files = tasks.len(),
            labels = labels.len(),
            "starting batch protection run"
        );
        self.metrics
            .set_files_pending(i64::try_from(tasks.len()).unwrap_or(i64::MAX));

        if cancel.is_cancelled() {
            return self.cancelled_report(batch_id, tasks);
        }

        // Phase 1: template issuance. Completion is a hard barrier.
        let store = Arc::new(TemplateStore::new());
        let coordinator = IssuanceCoordinator::new(
            Arc::clone(&self.client),
            Arc::clone(&store),
            self.events.clone(),
            self.metrics.clone(),
        );
        let phase_started = Instant::now();
        coordinator
            .ensure_templates(batch_id, request.manifest, &labels)
            .await;
        self.metrics
            .observe_template_phase_latency(phase_started.elapsed());

        // Cancellation before the barrier invalidates every template.
        if cancel.is_cancelled() {
            return self.cancelled_report(batch_id, tasks);
        }

        // Phase 2: concurrent propagation, reported in input order.
        let worker = PropagationWorker::new(
            Arc::clone(&self.client),
            self.events.clone(),
            self.metrics.clone(),
            request.manifest.retry,
        );
        let phase_started = Instant::now();
        let mut pending = Vec::with_capacity(tasks.len());
        for task in tasks {
            pending.push(self.dispatch(batch_id, task, &store, &worker, cancel).await);
        }

        let mut results = Vec::with_capacity(pending.len());
        for slot in pending {
            match slot {
                Pending::Ready(result) => results.push(result),
                Pending::Running(fallback, handle) => match handle.await {
                    Ok(result) => results.push(result),
                    Err(err) => {
                        error!(
                            error = %err,
                            source_path = %fallback.source_path.display(),
                            "propagation task join failed"
                        );
                        let source_path = fallback.source_path.clone();
                        results.push(PropagationResult::failed(
                            fallback,
                            BatchError::propagation(
                                source_path.clone(),
                                ServiceError::Io {
                                    operation: "propagation_task",
                                    path: source_path,
                                    source: io::Error::other(err),
                                },
                            ),
                        ));
                    }
                },
            }
        }
        self.metrics
            .observe_propagation_phase_latency(phase_started.elapsed());
        self.metrics.set_files_pending(0);

        let report = BatchReport { batch_id, results };
        let _ = self.events.publish(Event::BatchCompleted {
            batch_id,
            succeeded: report.succeeded(),
            failed: report.failed(),
        });
        if report.failed() == 0 {
            self.mark_recovered();
        } else {
            self.mark_degraded();
        }
        info!(
            batch_id = %batch_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "batch protection run finished"
        );
        report
    }

    /// Route one task: immediate failure for unresolved or failed labels,
    /// a spawned propagation otherwise.
    async fn dispatch(
        &self,
        batch_id: Uuid,
        task: FileTask,
        store: &Arc<TemplateStore>,
        worker: &PropagationWorker,
        cancel: &BatchHandle,
    ) -> Pending {
        match store.lookup(&task.label_id).await {
            None => {
                let label_id = task.label_id.clone();
                warn!(
                    source_path = %task.source_path.display(),
                    label_id = %label_id,
                    "label missing from template store"
                );
                Pending::Ready(PropagationResult::failed(
                    task,
                    BatchError::Configuration { label_id },
                ))
            }
            Some(Err(source)) => {
                let label_id = task.label_id.clone();
                Pending::Ready(PropagationResult::failed(
                    task,
                    BatchError::Issuance { label_id, source },
                ))
            }
            Some(Ok(entry)) => {
                if cancel.is_cancelled() {
                    return Pending::Ready(PropagationResult::failed(task, BatchError::Cancelled));
                }
                let worker = worker.clone();
                let cancel = cancel.clone();
                let fallback = task.clone();
                let handle = tokio::spawn(async move {
                    if cancel.is_cancelled() {
                        return PropagationResult::failed(task, BatchError::Cancelled);
                    }
                    worker.propagate(batch_id, task, entry).await
                });
                Pending::Running(fallback, handle)
            }
        }
    }

    fn cancelled_report(&self, batch_id: Uuid, tasks: Vec<FileTask>) -> BatchReport {
        let _ = self.events.publish(Event::BatchCancelled { batch_id });
        info!(batch_id = %batch_id, "batch cancelled");
        self.metrics.set_files_pending(0);
        self.metrics.set_labels_pending(0);
        let results = tasks
            .into_iter()
            .map(|task| PropagationResult::failed(task, BatchError::Cancelled))
            .collect();
        BatchReport { batch_id, results }
    }

    fn mark_degraded(&self) {
        let mut degraded = self
            .health_degraded
            .lock()
            .expect("health flag mutex poisoned");
        if !*degraded {
            *degraded = true;
            let _ = self.events.publish(Event::HealthChanged {
                degraded: vec![HEALTH_COMPONENT.to_string()],
            });
        }
    }

    fn mark_recovered(&self) {
        let mut degraded = self
            .health_degraded
            .lock()
            .expect("health flag mutex poisoned");
        if *degraded {
            *degraded = false;
            let _ = self.events.publish(Event::HealthChanged { degraded: vec![] });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use async_trait::async_trait;
    use cordon_config::BatchManifest;
    use cordon_protect::{
        ContentId, IssuedLicense, LabelId, LicenseHandle, PreparedFile, ServiceResult,
    };
    use std::path::Path;
    use uuid::Uuid;

    /// Client that flips the batch's cancellation flag from inside a chosen
    /// remote call, then behaves normally.
    struct CancellingClient {
        cancel: BatchHandle,
        cancel_on_issue: bool,
    }

    #[async_trait]
    impl ProtectionClient for CancellingClient {
        async fn issue_license(
            &self,
            _plaintext_path: &Path,
            label_id: &LabelId,
            artifact_path: &Path,
        ) -> ServiceResult<IssuedLicense> {
            if self.cancel_on_issue {
                self.cancel.cancel();
            }
            Ok(IssuedLicense {
                handle: LicenseHandle::from_token(format!("pl-{label_id}")),
                content_id: ContentId::new(format!("cid-{label_id}")),
                artifact_path: artifact_path.to_path_buf(),
            })
        }

        async fn apply_license(
            &self,
            source_path: &Path,
            label_id: &LabelId,
            handle: &LicenseHandle,
        ) -> ServiceResult<PreparedFile> {
            if !self.cancel_on_issue {
                self.cancel.cancel();
            }
            Ok(PreparedFile {
                token: handle.token().to_string(),
                source_path: source_path.to_path_buf(),
                label_id: label_id.clone(),
            })
        }

        async fn commit(&self, _prepared: PreparedFile, _output_path: &Path) -> ServiceResult<()> {
            Ok(())
        }

        async fn read_content_id(&self, _path: &Path) -> ServiceResult<ContentId> {
            Ok(ContentId::new("cid-l1"))
        }
    }

    fn manifest() -> BatchManifest {
        cordon_config::parse_manifest(
            r#"{
                "canonical_plaintext": "input/canonical.txt",
                "template_dir": "templates",
                "output_dir": "output",
                "files": [
                    {"source": "input/a.txt", "label_id": "l1"},
                    {"source": "input/b.txt", "label_id": "l1"},
                    {"source": "input/c.txt", "label_id": "l1"}
                ]
            }"#,
        )
        .expect("sample manifest")
    }

    fn orchestrator(client: Arc<dyn ProtectionClient>) -> (BatchOrchestrator, EventBus) {
        let events = EventBus::with_capacity(64);
        let metrics = Metrics::new().expect("metrics registry");
        (
            BatchOrchestrator::new(client, events.clone(), metrics),
            events,
        )
    }

    #[tokio::test]
    async fn cancel_before_phase_one_fails_all_tasks() {
        let cancel = BatchHandle::new();
        let client = Arc::new(CancellingClient {
            cancel: cancel.clone(),
            cancel_on_issue: true,
        });
        let (orchestrator, events) = orchestrator(client);
        let manifest = manifest();
        let mut stream = events.subscribe(None);

        let report = orchestrator
            .run_batch(
                BatchRequest {
                    batch_id: Uuid::new_v4(),
                    manifest: &manifest,
                },
                &cancel,
            )
            .await;

        assert_eq!(report.results.len(), 3);
        for result in &report.results {
            let error = result.error().expect("task should be cancelled");
            assert_eq!(error.kind(), FailureKind::Cancelled);
        }

        let mut saw_cancelled = false;
        while let Some(envelope) = stream.next().await {
            if matches!(envelope.event, Event::BatchCancelled { .. }) {
                saw_cancelled = true;
                break;
            }
        }
        assert!(saw_cancelled, "cancellation event published");
    }

    #[tokio::test]
    async fn cancel_during_phase_two_stops_new_work() {
        let cancel = BatchHandle::new();
        let client = Arc::new(CancellingClient {
            cancel: cancel.clone(),
            cancel_on_issue: false,
        });
        let (orchestrator, _events) = orchestrator(client);
        let manifest = manifest();

        let report = orchestrator
            .run_batch(
                BatchRequest {
                    batch_id: Uuid::new_v4(),
                    manifest: &manifest,
                },
                &cancel,
            )
            .await;

        // The first task reaches the service, flips the flag mid-flight and is
        // allowed to finish; tasks that had not started observe the flag.
        assert!(
            report.results[0].is_success(),
            "in-flight propagation finishes after cancellation"
        );
        for result in &report.results[1..] {
            let error = result.error().expect("later tasks should be cancelled");
            assert_eq!(error.kind(), FailureKind::Cancelled);
        }
    }

    #[tokio::test]
    async fn pre_cancelled_batch_never_calls_the_service() {
        struct PanickingClient;

        #[async_trait]
        impl ProtectionClient for PanickingClient {
            async fn issue_license(
                &self,
                _plaintext_path: &Path,
                _label_id: &LabelId,
                _artifact_path: &Path,
            ) -> ServiceResult<IssuedLicense> {
                unreachable!("cancelled batch must not issue")
            }

            async fn apply_license(
                &self,
                _source_path: &Path,
                _label_id: &LabelId,
                _handle: &LicenseHandle,
            ) -> ServiceResult<PreparedFile> {
                unreachable!("cancelled batch must not apply")
            }

            async fn commit(
                &self,
                _prepared: PreparedFile,
                _output_path: &Path,
            ) -> ServiceResult<()> {
                unreachable!("cancelled batch must not commit")
            }

            async fn read_content_id(&self, _path: &Path) -> ServiceResult<ContentId> {
                unreachable!("cancelled batch must not read")
            }
        }

        let cancel = BatchHandle::new();
        cancel.cancel();
        let (orchestrator, _events) = orchestrator(Arc::new(PanickingClient));
        let manifest = manifest();

        let report = orchestrator
            .run_batch(
                BatchRequest {
                    batch_id: Uuid::new_v4(),
                    manifest: &manifest,
                },
                &cancel,
            )
            .await;

        assert_eq!(report.failed(), 3);
        assert!(report.is_total_failure());
    }
}
