//! License issuance coordination: at most one issuance per label per run.

use std::path::PathBuf;
use std::sync::Arc;

use cordon_config::BatchManifest;
use cordon_events::{Event, EventBus};
use cordon_protect::{LabelId, ProtectionClient, ServiceError};
use cordon_telemetry::Metrics;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::render_error_chain;
use crate::model::TemplateEntry;
use crate::store::{TemplateOutcome, TemplateStore};

/// Drives phase 1: issues one protection license per distinct label and
/// records the resulting template entries in the shared store.
#[derive(Clone)]
pub struct IssuanceCoordinator {
    client: Arc<dyn ProtectionClient>,
    store: Arc<TemplateStore>,
    events: EventBus,
    metrics: Metrics,
}

impl IssuanceCoordinator {
    /// Construct a coordinator over a shared template store.
    #[must_use]
    pub fn new(
        client: Arc<dyn ProtectionClient>,
        store: Arc<TemplateStore>,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            store,
            events,
            metrics,
        }
    }

    /// Resolve every label in `labels`, issuing concurrently across labels.
    ///
    /// Issuance failures are cached in the store rather than returned; phase 2
    /// consumers observe them through their label's slot. Completion of this
    /// method is the hard barrier between the two phases.
    pub async fn ensure_templates(
        &self,
        batch_id: Uuid,
        manifest: &BatchManifest,
        labels: &[LabelId],
    ) {
        self.metrics
            .set_labels_pending(i64::try_from(labels.len()).unwrap_or(i64::MAX));

        let mut handles = Vec::with_capacity(labels.len());
        for label_id in labels {
            let coordinator = self.clone();
            let canonical = manifest.canonical_plaintext.clone();
            let template_path = manifest.template_path_for(label_id.as_str());
            let label_id = label_id.clone();
            handles.push(tokio::spawn(async move {
                let _ = coordinator
                    .ensure_label(batch_id, canonical, template_path, label_id)
                    .await;
            }));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "issuance task join failed");
            }
        }

        self.metrics.set_labels_pending(0);
    }

    /// Resolve one label, coalescing concurrent requests onto a single
    /// in-flight issuance.
    ///
    /// # Errors
    ///
    /// Returns the label's cached issuance failure, shared by every consumer
    /// of the label for the rest of the run.
    pub async fn ensure_label(
        &self,
        batch_id: Uuid,
        canonical: PathBuf,
        template_path: PathBuf,
        label_id: LabelId,
    ) -> TemplateOutcome {
        self.store
            .get_or_issue(&label_id, || {
                self.issue(batch_id, canonical, template_path, label_id.clone())
            })
            .await
    }

    async fn issue(
        &self,
        batch_id: Uuid,
        canonical: PathBuf,
        template_path: PathBuf,
        label_id: LabelId,
    ) -> Result<TemplateEntry, ServiceError> {
        let _ = self.events.publish(Event::IssuanceStarted {
            batch_id,
            label_id: label_id.to_string(),
        });
        info!(label_id = %label_id, "issuing protection license");

        match self
            .client
            .issue_license(&canonical, &label_id, &template_path)
            .await
        {
            Ok(issued) => {
                self.metrics.inc_issuance("issued");
                let _ = self.events.publish(Event::TemplateIssued {
                    batch_id,
                    label_id: label_id.to_string(),
                    content_id: issued.content_id.to_string(),
                    template_path: issued.artifact_path.display().to_string(),
                });
                info!(
                    label_id = %label_id,
                    content_id = %issued.content_id,
                    "template license issued"
                );
                Ok(TemplateEntry {
                    label_id,
                    license: issued.handle,
                    content_id: issued.content_id,
                    template_path: issued.artifact_path,
                })
            }
            Err(err) => {
                self.metrics.inc_issuance("failed");
                let message = render_error_chain(&err);
                let _ = self.events.publish(Event::IssuanceFailed {
                    batch_id,
                    label_id: label_id.to_string(),
                    message: message.clone(),
                });
                warn!(label_id = %label_id, error = %message, "license issuance failed");
                Err(err)
            }
        }
    }
}
