//! Telemetry primitives shared across the Cordon workspace.
//!
//! This crate centralises logging and metrics so the batch pipeline and the
//! application binary adopt a consistent observability story.
//!
//! Layout: `init.rs` (tracing subscriber setup), `metrics.rs` (Prometheus
//! registry and snapshot), `error.rs` (telemetry error type).

pub mod error;
pub mod init;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use init::{GlobalContextGuard, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
