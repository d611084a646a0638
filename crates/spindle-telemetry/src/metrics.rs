//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters/histograms/gauges the Stage Runner and Ripping
//!   Stage need: stage transition counts, rip duration, queue depth.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across the pipeline.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    stage_transitions_total: IntCounterVec,
    notifications_sent_total: IntCounterVec,
    rip_duration_seconds: Histogram,
    queue_depth: IntGauge,
    cache_hits_total: IntCounterVec,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Current queue depth across every non-terminal status.
    pub queue_depth: i64,
    /// Total rips that completed successfully.
    pub rip_duration_count: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built
    /// or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let stage_transitions_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("spindle_stage_transitions_total", "Stage status transitions by stage and outcome"),
                &["stage", "outcome"],
            ),
            "spindle_stage_transitions_total",
        )?;
        let notifications_sent_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("spindle_notifications_sent_total", "Outbound notifications by event class"),
                &["event"],
            ),
            "spindle_notifications_sent_total",
        )?;
        let rip_duration_seconds = register(
            &registry,
            Histogram::with_opts(HistogramOpts::new(
                "spindle_rip_duration_seconds",
                "Wall-clock duration of a completed title rip",
            )),
            "spindle_rip_duration_seconds",
        )?;
        let queue_depth = register(
            &registry,
            IntGauge::with_opts(Opts::new("spindle_queue_depth", "Queue items not yet in a terminal status")),
            "spindle_queue_depth",
        )?;
        let cache_hits_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("spindle_rip_cache_hits_total", "Rip cache lookups by hit/miss"),
                &["result"],
            ),
            "spindle_rip_cache_hits_total",
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                stage_transitions_total,
                notifications_sent_total,
                rip_duration_seconds,
                queue_depth,
                cache_hits_total,
            }),
        })
    }

    /// Increment the stage transition counter.
    pub fn inc_stage_transition(&self, stage: &str, outcome: &str) {
        self.inner
            .stage_transitions_total
            .with_label_values(&[stage, outcome])
            .inc();
    }

    /// Increment the outbound notification counter for `event`.
    pub fn inc_notification_sent(&self, event: &str) {
        self.inner.notifications_sent_total.with_label_values(&[event]).inc();
    }

    /// Record a completed rip's duration.
    pub fn observe_rip_duration(&self, duration: Duration) {
        self.inner.rip_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Set the queue depth gauge.
    pub fn set_queue_depth(&self, depth: i64) {
        self.inner.queue_depth.set(depth);
    }

    /// Increment the rip cache hit/miss counter. `result` is `"hit"` or `"miss"`.
    pub fn inc_cache_lookup(&self, result: &str) {
        self.inner.cache_hits_total.with_label_values(&[result]).inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
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
            queue_depth: self.inner.queue_depth.get(),
            rip_duration_count: self.inner.rip_duration_seconds.get_sample_count(),
        }
    }
}

fn register<T: prometheus::core::Collector + Clone + 'static>(
    registry: &Registry,
    built: std::result::Result<T, prometheus::Error>,
    name: &'static str,
) -> Result<T> {
    let collector = built.map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    Ok(collector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_snapshot_reflects_updates() {
        let metrics = Metrics::new().unwrap();
        metrics.inc_stage_transition("identify", "completed");
        metrics.inc_notification_sent("rip_completed");
        metrics.observe_rip_duration(Duration::from_secs(900));
        metrics.set_queue_depth(3);
        metrics.inc_cache_lookup("hit");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queue_depth, 3);
        assert_eq!(snapshot.rip_duration_count, 1);

        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("spindle_stage_transitions_total"));
        assert!(rendered.contains("spindle_rip_duration_seconds"));
        assert!(rendered.contains("spindle_rip_cache_hits_total"));
    }
}
