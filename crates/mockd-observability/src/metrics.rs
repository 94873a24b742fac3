//! Prometheus metrics registry
//!
//! All metrics carry the `mockd_` prefix. The registry is a plain struct so
//! tests can build isolated instances; the process-wide one lives behind
//! [`global_metrics`].

use once_cell::sync::Lazy;
use prometheus::{
    Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

/// Histogram buckets covering 1ms..10s
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Metrics registry for one mockd instance
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    started: Instant,

    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,
    pub match_hits_total: IntCounter,
    pub match_misses_total: IntCounter,
    pub active_connections: IntGaugeVec,
    pub mocks_total: IntGaugeVec,
    pub uptime_seconds: Gauge,
    pub chaos_faults_total: IntCounterVec,
}

impl MetricsRegistry {
    /// Create a registry with every metric registered
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "mockd_requests_total",
                "Total requests by method, normalized path, and status",
            ),
            &["method", "path", "status"],
        )
        .expect("requests_total metric");

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "mockd_request_duration_seconds",
                "Request duration in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["method", "path"],
        )
        .expect("request_duration_seconds metric");

        let match_hits_total = IntCounter::new(
            "mockd_match_hits_total",
            "Requests answered by a matched mock",
        )
        .expect("match_hits_total metric");

        let match_misses_total = IntCounter::new(
            "mockd_match_misses_total",
            "Requests that matched no mock and no stateful route",
        )
        .expect("match_misses_total metric");

        let active_connections = IntGaugeVec::new(
            Opts::new(
                "mockd_active_connections",
                "Live connections by protocol",
            ),
            &["protocol"],
        )
        .expect("active_connections metric");

        let mocks_total = IntGaugeVec::new(
            Opts::new("mockd_mocks_total", "Registered mocks by type"),
            &["type"],
        )
        .expect("mocks_total metric");

        let uptime_seconds = Gauge::new("mockd_uptime_seconds", "Seconds since process start")
            .expect("uptime_seconds metric");

        let chaos_faults_total = IntCounterVec::new(
            Opts::new("mockd_chaos_faults_total", "Chaos faults fired by type"),
            &["fault"],
        )
        .expect("chaos_faults_total metric");

        for collector in [
            Box::new(requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(request_duration_seconds.clone()),
            Box::new(match_hits_total.clone()),
            Box::new(match_misses_total.clone()),
            Box::new(active_connections.clone()),
            Box::new(mocks_total.clone()),
            Box::new(uptime_seconds.clone()),
            Box::new(chaos_faults_total.clone()),
        ] {
            registry.register(collector).expect("register metric");
        }

        // Runtime/process counters for cross-language dashboard parity.
        #[cfg(target_os = "linux")]
        {
            let _ = registry.register(Box::new(
                prometheus::process_collector::ProcessCollector::for_self(),
            ));
        }

        Self {
            registry: Arc::new(registry),
            started: Instant::now(),
            requests_total,
            request_duration_seconds,
            match_hits_total,
            match_misses_total,
            active_connections,
            mocks_total,
            uptime_seconds,
            chaos_faults_total,
        }
    }

    /// Record one finished HTTP request
    pub fn record_request(&self, method: &str, path: &str, status: u16, duration_seconds: f64) {
        let status = status.to_string();
        self.requests_total
            .with_label_values(&[method, path, &status])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_seconds);
    }

    /// Update the per-type mock gauges after a registry change
    pub fn set_mock_counts<'a>(&self, counts: impl Iterator<Item = (&'a str, usize)>) {
        for (kind, count) in counts {
            self.mocks_total
                .with_label_values(&[kind])
                .set(count as i64);
        }
    }

    /// Adjust the live-connection gauge for a protocol
    pub fn connection_opened(&self, protocol: &str) {
        self.active_connections.with_label_values(&[protocol]).inc();
    }

    /// Counterpart of [`Self::connection_opened`]
    pub fn connection_closed(&self, protocol: &str) {
        self.active_connections.with_label_values(&[protocol]).dec();
    }

    /// Record a fired chaos fault
    pub fn record_chaos_fault(&self, fault: &str) {
        self.chaos_faults_total.with_label_values(&[fault]).inc();
    }

    /// Render the Prometheus text exposition format
    pub fn encode_text(&self) -> String {
        self.uptime_seconds.set(self.started.elapsed().as_secs_f64());
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }

    /// The underlying registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: Lazy<MetricsRegistry> = Lazy::new(MetricsRegistry::new);

/// The process-wide metrics registry
pub fn global_metrics() -> &'static MetricsRegistry {
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_metrics_appear_in_exposition() {
        let metrics = MetricsRegistry::new();
        metrics.record_request("GET", "/api/users", 200, 0.012);
        metrics.match_hits_total.inc();
        let text = metrics.encode_text();
        assert!(text.contains("mockd_requests_total"));
        assert!(text.contains("mockd_request_duration_seconds"));
        assert!(text.contains("mockd_match_hits_total 1"));
        assert!(text.contains("mockd_uptime_seconds"));
    }

    #[test]
    fn mock_counts_are_gauges() {
        let metrics = MetricsRegistry::new();
        metrics.set_mock_counts([("http", 3), ("ws", 1)].into_iter());
        metrics.set_mock_counts([("http", 2)].into_iter());
        let text = metrics.encode_text();
        assert!(text.contains("mockd_mocks_total{type=\"http\"} 2"));
        assert!(text.contains("mockd_mocks_total{type=\"ws\"} 1"));
    }

    #[test]
    fn connection_gauge_tracks_open_close() {
        let metrics = MetricsRegistry::new();
        metrics.connection_opened("ws");
        metrics.connection_opened("ws");
        metrics.connection_closed("ws");
        let text = metrics.encode_text();
        assert!(text.contains("mockd_active_connections{protocol=\"ws\"} 1"));
    }
}
