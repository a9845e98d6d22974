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
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Binary entrypoint that wires the Cordon services together and executes the
//! batch described by `CORDON_MANIFEST`.

use cordon_app::{AppResult, run_app};

/// Bootstraps the Cordon application and blocks until the batch completes.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
