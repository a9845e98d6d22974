//! Application bootstrap: dependency wiring, batch execution and reporting.

use std::sync::Arc;

use cordon_batch::{
    BatchHandle, BatchOrchestrator, BatchReport, BatchRequest, render_error_chain,
};
use cordon_config::{BatchManifest, load_manifest};
use cordon_events::EventBus;
use cordon_protect::ProtectionClient;
use cordon_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, Metrics, init_logging};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::envelope::EnvelopeProtectionClient;
use crate::error::{AppError, AppResult};

/// Environment variable naming the batch manifest to execute.
const MANIFEST_ENV: &str = "CORDON_MANIFEST";

/// Dependencies required to bootstrap the Cordon application.
pub(crate) struct BootstrapDependencies {
    pub(crate) logging: LoggingConfig<'static>,
    pub(crate) manifest: BatchManifest,
    pub(crate) events: EventBus,
    pub(crate) telemetry: Metrics,
    pub(crate) client: Arc<dyn ProtectionClient>,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment for the binary
    /// entrypoint.
    pub(crate) async fn from_env() -> AppResult<Self> {
        let manifest_path = std::env::var(MANIFEST_ENV).map_err(|_| AppError::MissingEnv {
            name: MANIFEST_ENV,
        })?;
        let manifest = load_manifest(&manifest_path)
            .await
            .map_err(|err| AppError::config("manifest.load", err))?;

        let logging = logging_config(&manifest);
        let events = EventBus::new();
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        let client: Arc<dyn ProtectionClient> = Arc::new(EnvelopeProtectionClient::new());

        Ok(Self {
            logging,
            manifest,
            events,
            telemetry,
            client,
        })
    }
}

/// Entry point for the Cordon application boot sequence.
///
/// # Errors
///
/// Returns an error if dependency construction fails or every task in the
/// batch fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env().await?;
    run_app_with(dependencies).await
}

/// Boot sequence that relies entirely on injected dependencies to simplify testing.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    init_logging(&dependencies.logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("batch");

    info!("Cordon batch bootstrap starting");

    let BootstrapDependencies {
        logging: _,
        manifest,
        events,
        telemetry,
        client,
    } = dependencies;

    let event_logger = spawn_event_logger(events.clone(), telemetry.clone());
    let orchestrator = BatchOrchestrator::new(client, events.clone(), telemetry.clone());

    let cancel = BatchHandle::new();
    let signal_task = spawn_cancellation_watch(cancel.clone());

    let request = BatchRequest {
        batch_id: Uuid::new_v4(),
        manifest: &manifest,
    };
    let report = orchestrator.run_batch(request, &cancel).await;
    render_report(&report);

    if !signal_task.is_finished() {
        signal_task.abort();
    }
    if !event_logger.is_finished() {
        event_logger.abort();
    }

    if report.is_total_failure() {
        return Err(AppError::BatchFailed {
            failed: report.failed(),
            total: report.results.len(),
        });
    }
    Ok(())
}

/// Derive the logging configuration from manifest settings.
fn logging_config(manifest: &BatchManifest) -> LoggingConfig<'static> {
    let level: &'static str = Box::leak(manifest.logging.level.clone().into_boxed_str());
    let format = manifest
        .logging
        .format
        .as_deref()
        .map_or_else(LogFormat::infer, LogFormat::from_name);
    LoggingConfig {
        level,
        format,
        build_sha: cordon_telemetry::build_sha(),
    }
}

/// Forward domain events into structured logs and the event counter.
fn spawn_event_logger(events: EventBus, telemetry: Metrics) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = events.subscribe(None);
        while let Some(envelope) = stream.next().await {
            telemetry.inc_event(envelope.event.kind());
            debug!(event = envelope.event.kind(), id = envelope.id, "domain event");
        }
    })
}

/// Cancel the batch when the process receives an interrupt.
fn spawn_cancellation_watch(cancel: BatchHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling batch");
            cancel.cancel();
        }
    })
}

fn render_report(report: &BatchReport) {
    for result in &report.results {
        if let Some(content_id) = result.content_id() {
            info!(
                file = %result.task.source_path.display(),
                output = %result.task.output_path.display(),
                label_id = %result.task.label_id,
                content_id = %content_id,
                "protected"
            );
        } else if let Some(error) = result.error() {
            warn!(
                file = %result.task.source_path.display(),
                label_id = %result.task.label_id,
                kind = error.kind().as_str(),
                error = %render_error_chain(error),
                "failed"
            );
        }
    }
    info!(
        batch_id = %report.batch_id,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "batch report complete"
    );
}
