//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes a minimal set of counters/gauges relevant to the batch pipeline.

use std::sync::Arc;
use std::time::Duration;

use prometheus::core::Collector;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use serde::Serialize;

use crate::error::{TelemetryError, TelemetryResult};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    events_emitted_total: IntCounterVec,
    issuance_total: IntCounterVec,
    propagation_steps_total: IntCounterVec,
    propagation_retries_total: IntCounter,
    consistency_violations_total: IntCounter,
    labels_pending: IntGauge,
    files_pending: IntGauge,
    template_phase_latency_ms: IntGauge,
    propagation_phase_latency_ms: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Labels still waiting on template issuance.
    pub labels_pending: i64,
    /// Files still waiting on propagation.
    pub files_pending: i64,
    /// Latest template phase latency (ms).
    pub template_phase_latency_ms: i64,
    /// Latest propagation phase latency (ms).
    pub propagation_phase_latency_ms: i64,
    /// Total propagation retries performed.
    pub propagation_retries_total: u64,
    /// Total content identifier mismatches observed.
    pub consistency_violations_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let events_emitted_total = counter_vec(
            "events_emitted_total",
            "Domain events emitted by type",
            &["type"],
        )?;
        let issuance_total = counter_vec(
            "issuance_total",
            "Protection license issuance calls by outcome",
            &["outcome"],
        )?;
        let propagation_steps_total = counter_vec(
            "propagation_steps_total",
            "Propagation steps executed by status",
            &["step", "status"],
        )?;
        let propagation_retries_total = counter(
            "propagation_retries_total",
            "Propagation attempts retried after transient failures",
        )?;
        let consistency_violations_total = counter(
            "consistency_violations_total",
            "Committed outputs whose content id diverged from the template",
        )?;
        let labels_pending = gauge("labels_pending", "Labels awaiting template issuance")?;
        let files_pending = gauge("files_pending", "Files awaiting propagation")?;
        let template_phase_latency_ms = gauge(
            "template_phase_latency_ms",
            "Time spent issuing templates for the current batch (ms)",
        )?;
        let propagation_phase_latency_ms = gauge(
            "propagation_phase_latency_ms",
            "Time spent propagating licenses for the current batch (ms)",
        )?;

        register(&registry, "events_emitted_total", &events_emitted_total)?;
        register(&registry, "issuance_total", &issuance_total)?;
        register(
            &registry,
            "propagation_steps_total",
            &propagation_steps_total,
        )?;
        register(
            &registry,
            "propagation_retries_total",
            &propagation_retries_total,
        )?;
        register(
            &registry,
            "consistency_violations_total",
            &consistency_violations_total,
        )?;
        register(&registry, "labels_pending", &labels_pending)?;
        register(&registry, "files_pending", &files_pending)?;
        register(
            &registry,
            "template_phase_latency_ms",
            &template_phase_latency_ms,
        )?;
        register(
            &registry,
            "propagation_phase_latency_ms",
            &propagation_phase_latency_ms,
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                events_emitted_total,
                issuance_total,
                propagation_steps_total,
                propagation_retries_total,
                consistency_violations_total,
                labels_pending,
                files_pending,
                template_phase_latency_ms,
                propagation_phase_latency_ms,
            }),
        })
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Increment the issuance counter for the given outcome.
    pub fn inc_issuance(&self, outcome: &str) {
        self.inner
            .issuance_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Increment the propagation step counter.
    pub fn inc_propagation_step(&self, step: &str, status: &str) {
        self.inner
            .propagation_steps_total
            .with_label_values(&[step, status])
            .inc();
    }

    /// Increment the propagation retry counter.
    pub fn inc_propagation_retry(&self) {
        self.inner.propagation_retries_total.inc();
    }

    /// Increment the consistency violation counter.
    pub fn inc_consistency_violation(&self) {
        self.inner.consistency_violations_total.inc();
    }

    /// Set the pending label gauge.
    pub fn set_labels_pending(&self, count: i64) {
        self.inner.labels_pending.set(count);
    }

    /// Set the pending file gauge.
    pub fn set_files_pending(&self, count: i64) {
        self.inner.files_pending.set(count);
    }

    /// Record the observed latency of the template issuance phase.
    pub fn observe_template_phase_latency(&self, duration: Duration) {
        self.inner
            .template_phase_latency_ms
            .set(Self::duration_to_ms(duration));
    }

    /// Record the observed latency of the propagation phase.
    pub fn observe_propagation_phase_latency(&self, duration: Duration) {
        self.inner
            .propagation_phase_latency_ms
            .set(Self::duration_to_ms(duration));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            labels_pending: self.inner.labels_pending.get(),
            files_pending: self.inner.files_pending.get(),
            template_phase_latency_ms: self.inner.template_phase_latency_ms.get(),
            propagation_phase_latency_ms: self.inner.propagation_phase_latency_ms.get(),
            propagation_retries_total: self.inner.propagation_retries_total.get(),
            consistency_violations_total: self.inner.consistency_violations_total.get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

fn counter(name: &'static str, help: &str) -> TelemetryResult<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn counter_vec(
    name: &'static str,
    help: &str,
    labels: &[&str],
) -> TelemetryResult<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn gauge(name: &'static str, help: &str) -> TelemetryResult<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> TelemetryResult<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}
