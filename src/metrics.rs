//! Assembly metrics collection
//!
//! Lock-free counters describing fetch, correlation and resolution work
//! across every request an assembler has served.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Assembly metrics collector
///
/// Thread-safe; shared between the assembler, its fetch workers and the
/// correlation task through an `Arc`.
pub struct AssemblyMetrics {
    // === Fetch Counters ===
    /// Fragments received from fetch streams
    fragments_received: AtomicU64,
    /// Fragments rejected by validation or insertion
    fragments_rejected: AtomicU64,
    /// Encoded bytes received
    bytes_received: AtomicU64,
    /// Sub-queries issued
    sub_queries_issued: AtomicU64,
    /// Sub-queries whose stream ran to completion
    sub_queries_completed: AtomicU64,
    /// Stream errors reported by fetch workers
    stream_errors: AtomicU64,

    // === Correlation Counters ===
    /// Batches handed to the correlator
    batches_correlated: AtomicU64,
    /// Blocks produced by correlation
    blocks_correlated: AtomicU64,
    /// Super-domains produced by collision resolution
    super_domains: AtomicU64,

    // === Health ===
    /// Poll timeouts while producers were still active
    buffer_stalls: AtomicU64,
    /// Requests that ran out of time
    timeouts: AtomicU64,
    /// Requests assembled into a table
    requests_completed: AtomicU64,

    // === Latency Tracking (simple average) ===
    /// Sum of assembly latencies in microseconds
    latency_sum_us: AtomicU64,
    /// Count of latency samples
    latency_count: AtomicU64,

    /// When metrics collection started
    start_time: Instant,
}

impl AssemblyMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            fragments_received: AtomicU64::new(0),
            fragments_rejected: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            sub_queries_issued: AtomicU64::new(0),
            sub_queries_completed: AtomicU64::new(0),
            stream_errors: AtomicU64::new(0),
            batches_correlated: AtomicU64::new(0),
            blocks_correlated: AtomicU64::new(0),
            super_domains: AtomicU64::new(0),
            buffer_stalls: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            requests_completed: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    // === Recording Methods ===

    /// Record one fragment received
    #[inline]
    pub fn record_fragment(&self, bytes: u64) {
        self.fragments_received.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .bytes_received
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_add(bytes))
            });
    }

    /// Record fragments rejected
    #[inline]
    pub fn record_rejected(&self, count: u64) {
        self.fragments_rejected.fetch_add(count, Ordering::Relaxed);
    }

    /// Record sub-queries issued
    #[inline]
    pub fn record_sub_queries(&self, count: u64) {
        self.sub_queries_issued.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a sub-query stream finishing
    #[inline]
    pub fn record_sub_query_completed(&self) {
        self.sub_queries_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stream error
    #[inline]
    pub fn record_stream_error(&self) {
        self.stream_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one correlated batch
    #[inline]
    pub fn record_batch(&self) {
        self.batches_correlated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of resolution
    #[inline]
    pub fn record_resolution(&self, blocks: u64, super_domains: u64) {
        self.blocks_correlated.fetch_add(blocks, Ordering::Relaxed);
        self.super_domains.fetch_add(super_domains, Ordering::Relaxed);
    }

    /// Record a poll timeout while producers were active
    #[inline]
    pub fn record_stall(&self) {
        self.buffer_stalls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request running out of time
    #[inline]
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed request
    #[inline]
    pub fn record_completed(&self, latency: Duration) {
        self.requests_completed.fetch_add(1, Ordering::Relaxed);
        let latency_us = latency.as_micros() as u64;
        let _ = self
            .latency_sum_us
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_add(latency_us))
            });
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    // === Query Methods ===

    /// Get total fragments received
    pub fn fragments_received(&self) -> u64 {
        self.fragments_received.load(Ordering::Relaxed)
    }

    /// Get total bytes received
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Get total timeouts
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Get average assembly latency in microseconds
    pub fn avg_latency_us(&self) -> u64 {
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        let count = self.latency_count.load(Ordering::Relaxed);
        if count > 0 {
            sum / count
        } else {
            0
        }
    }

    /// Get uptime since metrics collection started
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get a complete metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fragments_received: self.fragments_received.load(Ordering::Relaxed),
            fragments_rejected: self.fragments_rejected.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            sub_queries_issued: self.sub_queries_issued.load(Ordering::Relaxed),
            sub_queries_completed: self.sub_queries_completed.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
            batches_correlated: self.batches_correlated.load(Ordering::Relaxed),
            blocks_correlated: self.blocks_correlated.load(Ordering::Relaxed),
            super_domains: self.super_domains.load(Ordering::Relaxed),
            buffer_stalls: self.buffer_stalls.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            requests_completed: self.requests_completed.load(Ordering::Relaxed),
            avg_latency_us: self.avg_latency_us(),
            uptime: self.uptime(),
        }
    }
}

impl Default for AssemblyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AssemblyMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssemblyMetrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Complete metrics snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// Fragments received
    pub fragments_received: u64,
    /// Fragments rejected
    pub fragments_rejected: u64,
    /// Encoded bytes received
    pub bytes_received: u64,
    /// Sub-queries issued
    pub sub_queries_issued: u64,
    /// Sub-queries completed
    pub sub_queries_completed: u64,
    /// Stream errors
    pub stream_errors: u64,
    /// Batches correlated
    pub batches_correlated: u64,
    /// Blocks correlated
    pub blocks_correlated: u64,
    /// Super-domains resolved
    pub super_domains: u64,
    /// Buffer stalls
    pub buffer_stalls: u64,
    /// Requests timed out
    pub timeouts: u64,
    /// Requests completed
    pub requests_completed: u64,
    /// Average assembly latency in microseconds
    pub avg_latency_us: u64,
    /// Time since metrics collection started
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Fraction of received fragments that were rejected (0.0 - 1.0)
    pub fn rejection_rate(&self) -> f64 {
        if self.fragments_received > 0 {
            self.fragments_rejected as f64 / self.fragments_received as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = AssemblyMetrics::new();
        assert_eq!(metrics.fragments_received(), 0);
        assert_eq!(metrics.timeouts(), 0);
    }

    #[test]
    fn test_record_fragments() {
        let metrics = AssemblyMetrics::new();
        metrics.record_fragment(100);
        metrics.record_fragment(50);
        metrics.record_rejected(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fragments_received, 2);
        assert_eq!(snapshot.bytes_received, 150);
        assert!((snapshot.rejection_rate() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_avg_latency() {
        let metrics = AssemblyMetrics::new();
        assert_eq!(metrics.avg_latency_us(), 0);
        metrics.record_completed(Duration::from_micros(1000));
        metrics.record_completed(Duration::from_micros(3000));
        assert_eq!(metrics.avg_latency_us(), 2000);
        assert_eq!(metrics.snapshot().requests_completed, 2);
    }

    #[test]
    fn test_resolution_counters() {
        let metrics = AssemblyMetrics::new();
        metrics.record_resolution(5, 1);
        metrics.record_stall();
        metrics.record_timeout();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.blocks_correlated, 5);
        assert_eq!(snapshot.super_domains, 1);
        assert_eq!(snapshot.buffer_stalls, 1);
        assert_eq!(snapshot.timeouts, 1);
    }
}
