//! Prometheus metrics for the bus.
//!
//! All metrics follow the naming convention: `smsg_<area>_<metric>_<unit>`.
//! Bus counters live on each [`Bus`](smsg_bus::Bus) as atomics;
//! [`record_bus_snapshot`] mirrors them into the gauges below so that they
//! can be scraped.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, HistogramVec, IntGauge, Registry,
    TextEncoder,
};
use smsg_bus::BusMetricsSnapshot;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BROADCAST CHANNEL
    // =========================================================================

    pub static ref EVENTS_PUBLISHED: IntGauge = IntGauge::new(
        "smsg_broadcast_events_published_total",
        "Broadcasts that reached at least one subscriber"
    ).expect("metric creation failed");

    pub static ref EVENTS_DROPPED: IntGauge = IntGauge::new(
        "smsg_broadcast_events_dropped_total",
        "Broadcasts published to a topic with no subscribers"
    ).expect("metric creation failed");

    pub static ref DELIVERIES: IntGauge = IntGauge::new(
        "smsg_broadcast_deliveries_total",
        "Individual broadcast handler runs"
    ).expect("metric creation failed");

    pub static ref BROADCAST_FAILURES: IntGauge = IntGauge::new(
        "smsg_broadcast_handler_failures_total",
        "Broadcast handler runs that returned an error or panicked"
    ).expect("metric creation failed");

    // =========================================================================
    // CALL CHANNEL
    // =========================================================================

    pub static ref CALLS_DEFERRED: IntGauge = IntGauge::new(
        "smsg_call_deferred_total",
        "invoke calls that scheduled a handler"
    ).expect("metric creation failed");

    pub static ref CALLS_SYNC: IntGauge = IntGauge::new(
        "smsg_call_sync_total",
        "invoke_sync calls that ran a handler"
    ).expect("metric creation failed");

    pub static ref CALL_FAILURES: IntGauge = IntGauge::new(
        "smsg_call_handler_failures_total",
        "Call handler runs that returned an error or panicked"
    ).expect("metric creation failed");

    pub static ref CALLS_UNHANDLED: IntGauge = IntGauge::new(
        "smsg_call_unhandled_total",
        "Calls to a topic with no registered handler"
    ).expect("metric creation failed");

    pub static ref DUPLICATE_REGISTRATIONS: IntGauge = IntGauge::new(
        "smsg_call_duplicate_registrations_total",
        "register calls refused because the topic already had a handler"
    ).expect("metric creation failed");

    /// Round-trip latency of `invoke`, labelled by handler kind
    pub static ref CALL_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "smsg_call_latency_seconds",
            "Time from invoke until the pending result resolves"
        ).buckets(exponential_buckets(0.00001, 2.0, 16).expect("valid buckets")),
        &["mode"]  // mode: deferred/sync
    ).expect("metric creation failed");
}

/// Handle to the registry all bus metrics are registered in.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    registry: Registry,
}

impl MetricsHandle {
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
    }
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; metrics that are already registered are
/// skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Broadcast
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(EVENTS_DROPPED.clone()),
        Box::new(DELIVERIES.clone()),
        Box::new(BROADCAST_FAILURES.clone()),
        // Call
        Box::new(CALLS_DEFERRED.clone()),
        Box::new(CALLS_SYNC.clone()),
        Box::new(CALL_FAILURES.clone()),
        Box::new(CALLS_UNHANDLED.clone()),
        Box::new(DUPLICATE_REGISTRATIONS.clone()),
        Box::new(CALL_LATENCY.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: REGISTRY.clone(),
    })
}

/// Copy a bus counter snapshot into the exported gauges.
pub fn record_bus_snapshot(snapshot: &BusMetricsSnapshot) {
    EVENTS_PUBLISHED.set(saturating_i64(snapshot.events_published));
    EVENTS_DROPPED.set(saturating_i64(snapshot.events_dropped));
    DELIVERIES.set(saturating_i64(snapshot.deliveries));
    BROADCAST_FAILURES.set(saturating_i64(snapshot.broadcast_failures));
    CALLS_DEFERRED.set(saturating_i64(snapshot.calls_deferred));
    CALLS_SYNC.set(saturating_i64(snapshot.calls_sync));
    CALL_FAILURES.set(saturating_i64(snapshot.call_failures));
    CALLS_UNHANDLED.set(saturating_i64(snapshot.calls_unhandled));
    DUPLICATE_REGISTRATIONS.set(saturating_i64(snapshot.duplicate_registrations));
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Observes the elapsed time into a histogram when dropped.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start a [`HistogramTimer`] on the given histogram.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
