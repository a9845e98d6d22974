#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Protection-license reuse engine for compound file families.
//!
//! The pipeline runs in two phases: the issuance coordinator protects one
//! canonical plaintext per distinct label to anchor a single protection
//! license (phase 1), then propagation workers re-apply each label's cached
//! license to every mapped file and verify that the committed outputs share
//! the template's content identifier (phase 2).
//!
//! Layout: `model/` (tasks, template entries, results), `store.rs` (coalesced
//! per-label template slots), `coordinator.rs` (single-issuance guarantee),
//! `propagate.rs` (per-file license application with bounded retry),
//! `orchestrator.rs` (phase barrier, cancellation, ordered reporting),
//! `error.rs` (the batch error taxonomy).

pub mod coordinator;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod propagate;
pub mod store;

pub use coordinator::IssuanceCoordinator;
pub use error::{BatchError, FailureKind, render_error_chain};
pub use model::{
    BatchReport, BatchRequest, FileTask, PropagationOutcome, PropagationResult, TemplateEntry,
    distinct_labels,
};
pub use orchestrator::{BatchHandle, BatchOrchestrator};
pub use propagate::PropagationWorker;
pub use store::{TemplateOutcome, TemplateStore};
