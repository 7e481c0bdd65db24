//! Outcome aggregation and statistics.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Consecutive transport-level failures before the run-level
/// unreachable-host warning is raised.
const UNREACHABLE_THRESHOLD: u64 = 25;

/// Pass/fail tallies for one named check.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CheckStats {
    pub passed: u64,
    pub failed: u64,
}

/// Collects per-call outcomes during a run.
pub struct MetricsCollector {
    histogram: Histogram<u64>,
    checks: BTreeMap<String, CheckStats>,
    requests_total: u64,
    requests_success: u64,
    requests_failed: u64,
    consecutive_transport_failures: u64,
    unreachable_warned: bool,
    first_request_time: Option<Instant>,
    last_request_time: Option<Instant>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new(3).expect("Failed to create histogram"),
            checks: BTreeMap::new(),
            requests_total: 0,
            requests_success: 0,
            requests_failed: 0,
            consecutive_transport_failures: 0,
            unreachable_warned: false,
            first_request_time: None,
            last_request_time: None,
        }
    }

    /// Record a call that got an HTTP response and passed its check.
    pub fn record_pass(&mut self, check: &str, latency_us: u64) {
        self.requests_total += 1;
        self.requests_success += 1;
        self.histogram.record(latency_us).ok();
        self.checks.entry(check.to_string()).or_default().passed += 1;
        self.consecutive_transport_failures = 0;
        self.touch();
    }

    /// Record a failed call. `transport_error` is true when no HTTP
    /// response was received at all (connect failure, timeout).
    pub fn record_fail(&mut self, check: &str, latency_us: u64, transport_error: bool) {
        self.requests_total += 1;
        self.requests_failed += 1;
        self.checks.entry(check.to_string()).or_default().failed += 1;
        if transport_error {
            self.consecutive_transport_failures += 1;
        } else {
            // The host answered, just not with a 200.
            self.histogram.record(latency_us).ok();
            self.consecutive_transport_failures = 0;
        }
        self.touch();
    }

    fn touch(&mut self) {
        let now = Instant::now();
        if self.first_request_time.is_none() {
            self.first_request_time = Some(now);
        }
        self.last_request_time = Some(now);
    }

    /// True exactly once, when transport failures have been sustained long
    /// enough that the target host looks unreachable.
    pub fn take_unreachable_warning(&mut self) -> bool {
        if !self.unreachable_warned
            && self.consecutive_transport_failures >= UNREACHABLE_THRESHOLD
        {
            self.unreachable_warned = true;
            return true;
        }
        false
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total
    }

    /// Generate final run results.
    pub fn results(&self, scenario_name: String, max_vus: u32) -> RunResults {
        let duration = self
            .last_request_time
            .and_then(|last| self.first_request_time.map(|first| last.duration_since(first)))
            .unwrap_or_default();

        let duration_secs = duration.as_secs_f64();
        let rps = if duration_secs > 0.0 {
            self.requests_total as f64 / duration_secs
        } else {
            0.0
        };

        RunResults {
            timestamp: chrono::Utc::now().to_rfc3339(),
            scenario_name,
            duration_secs,
            total_requests: self.requests_total,
            successful_requests: self.requests_success,
            failed_requests: self.requests_failed,
            requests_per_second: rps,
            latency_p50: self.histogram.value_at_percentile(50.0) as f64 / 1000.0,
            latency_p90: self.histogram.value_at_percentile(90.0) as f64 / 1000.0,
            latency_p95: self.histogram.value_at_percentile(95.0) as f64 / 1000.0,
            latency_p99: self.histogram.value_at_percentile(99.0) as f64 / 1000.0,
            latency_min: self.histogram.min() as f64 / 1000.0,
            latency_max: self.histogram.max() as f64 / 1000.0,
            latency_avg: self.histogram.mean() / 1000.0,
            checks: self.checks.clone(),
            max_vus,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Final run results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResults {
    pub timestamp: String,
    pub scenario_name: String,
    pub duration_secs: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub requests_per_second: f64,

    // Latency percentiles (ms)
    pub latency_p50: f64,
    pub latency_p90: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub latency_min: f64,
    pub latency_max: f64,
    pub latency_avg: f64,

    /// Pass/fail counts keyed by check name.
    pub checks: BTreeMap<String, CheckStats>,
    pub max_vus: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_check_aggregation() {
        let mut collector = MetricsCollector::new();
        collector.record_pass("Streams Write OK", 1_000);
        collector.record_pass("Streams Write OK", 2_000);
        collector.record_fail("Streams Write OK", 3_000, false);
        collector.record_pass("Streams KNN OK", 500);

        let results = collector.results("test".to_string(), 10);
        assert_eq!(results.total_requests, 4);
        assert_eq!(results.successful_requests, 3);
        assert_eq!(results.failed_requests, 1);

        let write = results.checks.get("Streams Write OK").unwrap();
        assert_eq!(write.passed, 2);
        assert_eq!(write.failed, 1);
        let knn = results.checks.get("Streams KNN OK").unwrap();
        assert_eq!(knn.passed, 1);
        assert_eq!(knn.failed, 0);
    }

    #[test]
    fn test_unreachable_warning_fires_once_after_sustained_failures() {
        let mut collector = MetricsCollector::new();
        for _ in 0..UNREACHABLE_THRESHOLD - 1 {
            collector.record_fail("Geo Write OK", 0, true);
            assert!(!collector.take_unreachable_warning());
        }
        collector.record_fail("Geo Write OK", 0, true);
        assert!(collector.take_unreachable_warning());
        collector.record_fail("Geo Write OK", 0, true);
        assert!(!collector.take_unreachable_warning(), "warning repeated");
    }

    #[test]
    fn test_any_response_resets_unreachable_streak() {
        let mut collector = MetricsCollector::new();
        for _ in 0..UNREACHABLE_THRESHOLD - 1 {
            collector.record_fail("Geo Write OK", 0, true);
        }
        // A 500 is still a response; the host is reachable.
        collector.record_fail("Geo Write OK", 400, false);
        collector.record_fail("Geo Write OK", 0, true);
        assert!(!collector.take_unreachable_warning());
    }
}
