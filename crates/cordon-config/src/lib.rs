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

//! Batch manifest loading and validation for Cordon.
//!
//! Layout: `model.rs` (typed manifest models), `validate.rs`
//! (validation helpers), `loader.rs` (filesystem loading and parsing).

pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_manifest, parse_manifest};
pub use model::{BatchManifest, FileMapping, LoggingSettings, RetryPolicy};
pub use validate::validate_manifest;
