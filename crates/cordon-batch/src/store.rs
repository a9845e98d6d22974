//! In-memory template store with coalesced per-label initialisation.
//!
//! # Design
//! - One slot per label; the slot is a `tokio::sync::OnceCell`, so concurrent
//!   requests for an unresolved label block on a single in-flight issuance
//!   instead of firing duplicate remote calls.
//! - The map lock is held only to find or create a slot, never across the
//!   issuance call itself; different labels initialise concurrently.
//! - Failures are cached with the same lifetime as successes: a label that
//!   failed issuance stays failed for the rest of the run.

use std::collections::HashMap;
use std::sync::Arc;

use cordon_protect::{LabelId, ServiceError};
use tokio::sync::{OnceCell, RwLock};

use crate::model::TemplateEntry;

/// Cached per-label outcome: the issued template entry, or the issuance
/// failure shared by every task under the label.
pub type TemplateOutcome = Result<Arc<TemplateEntry>, Arc<ServiceError>>;

/// Process-scoped cache mapping each label to its single issued license.
///
/// The store lives for one batch run; a fresh run starts empty and always
/// re-issues.
#[derive(Default)]
pub struct TemplateStore {
    slots: RwLock<HashMap<LabelId, Arc<OnceCell<TemplateOutcome>>>>,
}

impl TemplateStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the label's outcome, running `issue` at most once per label.
    ///
    /// Concurrent callers for the same unresolved label coalesce onto the
    /// first caller's issuance; callers for other labels proceed
    /// independently.
    ///
    /// # Errors
    ///
    /// Returns the label's cached issuance failure; once cached, the failure
    /// is permanent for the run.
    pub async fn get_or_issue<F, Fut>(&self, label_id: &LabelId, issue: F) -> TemplateOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TemplateEntry, ServiceError>>,
    {
        let slot = self.slot(label_id).await;
        slot.get_or_init(|| async { issue().await.map(Arc::new).map_err(Arc::new) })
            .await
            .clone()
    }

    /// Look up a previously resolved outcome without triggering issuance.
    pub async fn lookup(&self, label_id: &LabelId) -> Option<TemplateOutcome> {
        let slots = self.slots.read().await;
        slots.get(label_id).and_then(|slot| slot.get().cloned())
    }

    /// Number of labels with a resolved outcome.
    pub async fn resolved(&self) -> usize {
        let slots = self.slots.read().await;
        slots.values().filter(|slot| slot.get().is_some()).count()
    }

    async fn slot(&self, label_id: &LabelId) -> Arc<OnceCell<TemplateOutcome>> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(label_id) {
                return Arc::clone(slot);
            }
        }

        let mut slots = self.slots.write().await;
        Arc::clone(
            slots
                .entry(label_id.clone())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }
}
