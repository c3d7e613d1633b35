//! Dispatch metrics.
//!
//! Lock-free counters keyed by pattern: request counts, error counts and
//! latency sums, recorded by the session on every dispatch and exportable
//! in Prometheus text format.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-pattern dispatch metrics collector.
#[derive(Clone)]
pub struct MetricsCollector {
    /// Total dispatches by pattern.
    dispatch_counts: Arc<dashmap::DashMap<String, AtomicU64>>,
    /// Total failed dispatches by pattern.
    error_counts: Arc<dashmap::DashMap<String, AtomicU64>>,
    /// Dispatch latencies (sum in microseconds).
    latency_sums: Arc<dashmap::DashMap<String, AtomicU64>>,
    /// Collector start time.
    start_time: Arc<Instant>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            dispatch_counts: Arc::new(dashmap::DashMap::new()),
            error_counts: Arc::new(dashmap::DashMap::new()),
            latency_sums: Arc::new(dashmap::DashMap::new()),
            start_time: Arc::new(Instant::now()),
        }
    }

    /// Record one dispatch with its latency and outcome.
    pub fn record_dispatch(&self, pattern: &str, latency: Duration, success: bool) {
        self.dispatch_counts
            .entry(pattern.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);

        let micros = latency.as_micros() as u64;
        self.latency_sums
            .entry(pattern.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(micros, Ordering::Relaxed);

        if !success {
            self.error_counts
                .entry(pattern.to_string())
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dispatch_count(&self, pattern: &str) -> u64 {
        self.dispatch_counts
            .get(pattern)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn error_count(&self, pattern: &str) -> u64 {
        self.error_counts
            .get(pattern)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Average dispatch latency for a pattern in microseconds.
    pub fn avg_latency_micros(&self, pattern: &str) -> Option<f64> {
        let count = self.dispatch_count(pattern);
        if count == 0 {
            return None;
        }

        let sum = self
            .latency_sums
            .get(pattern)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0);

        Some(sum as f64 / count as f64)
    }

    /// Error rate (0.0 to 1.0) for a pattern.
    pub fn error_rate(&self, pattern: &str) -> f64 {
        let total = self.dispatch_count(pattern);
        if total == 0 {
            return 0.0;
        }

        self.error_count(pattern) as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP strand_dispatches_total Total number of dispatches\n");
        output.push_str("# TYPE strand_dispatches_total counter\n");
        for entry in self.dispatch_counts.iter() {
            let count = entry.value().load(Ordering::Relaxed);
            output.push_str(&format!(
                "strand_dispatches_total{{pattern=\"{}\"}} {}\n",
                entry.key(),
                count
            ));
        }

        output.push_str("# HELP strand_errors_total Total number of failed dispatches\n");
        output.push_str("# TYPE strand_errors_total counter\n");
        for entry in self.error_counts.iter() {
            let count = entry.value().load(Ordering::Relaxed);
            output.push_str(&format!(
                "strand_errors_total{{pattern=\"{}\"}} {}\n",
                entry.key(),
                count
            ));
        }

        output.push_str("# HELP strand_latency_microseconds_sum Sum of dispatch latencies\n");
        output.push_str("# TYPE strand_latency_microseconds_sum counter\n");
        for entry in self.latency_sums.iter() {
            let sum = entry.value().load(Ordering::Relaxed);
            output.push_str(&format!(
                "strand_latency_microseconds_sum{{pattern=\"{}\"}} {}\n",
                entry.key(),
                sum
            ));
        }

        output.push_str("# HELP strand_uptime_seconds Server uptime in seconds\n");
        output.push_str("# TYPE strand_uptime_seconds gauge\n");
        output.push_str(&format!("strand_uptime_seconds {}\n", self.uptime_seconds()));

        output
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
