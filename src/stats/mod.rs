//! Statistics collection
//!
//! Every completed operation is folded into one [`AggregateStats`] owned by the
//! [`StatsCollector`]. Workers record concurrently; the collector serializes
//! updates behind a `Mutex`, so counts and byte totals are exact and a
//! [`snapshot`](StatsCollector::snapshot) is consistent at any time.
//!
//! Derived metrics (mean latency, IOPS, throughput, percentiles) are computed on
//! demand from the raw aggregates, never stored incrementally.
//!
//! # Example
//!
//! ```
//! use magicsmoke::engine::{OperationRequest, OperationResult, OperationType};
//! use magicsmoke::stats::StatsCollector;
//! use std::time::Duration;
//!
//! let collector = StatsCollector::new();
//! let request = OperationRequest { sequence: 0, offset: 0, op_type: OperationType::Read };
//! let streak = collector.record(&OperationResult::from_transfer(&request, 4096, 4096, Duration::from_micros(80)));
//! assert_eq!(streak, 0);
//!
//! let stats = collector.snapshot();
//! assert_eq!(stats.operations, 1);
//! assert_eq!(stats.bytes, 4096);
//! ```

pub mod histogram;
pub mod live;

use crate::engine::{OperationResult, OperationType, Outcome};
use crate::error::OperationError;
use crate::util::time::{calculate_iops, calculate_throughput};
use histogram::LatencyHistogram;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Running totals for a benchmark run
///
/// `operations == successes + failures` holds after every update, and `bytes`
/// only grows on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub operations: u64,
    pub successes: u64,
    pub failures: u64,

    /// Bytes moved by successful operations
    pub bytes: u64,

    pub reads: u64,
    pub writes: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,

    /// Failures where fewer bytes than requested were transferred
    pub short_transfers: u64,

    /// Failures reported by the OS
    pub io_errors: u64,

    /// Sum of all operation latencies, failures included
    pub total_latency: Duration,
    pub min_latency: Option<Duration>,
    pub max_latency: Duration,

    /// Failures since the last success, across all workers
    pub consecutive_failures: u64,

    pub flushes: u64,
    pub flush_failures: u64,

    pub latency: LatencyHistogram,
}

impl AggregateStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one result in and return the consecutive-failure streak
    pub fn record(&mut self, result: &OperationResult) -> u64 {
        self.operations += 1;
        match result.op_type {
            OperationType::Read => self.reads += 1,
            OperationType::Write => self.writes += 1,
        }

        match &result.outcome {
            Outcome::Success { bytes } => {
                self.successes += 1;
                self.bytes += bytes;
                match result.op_type {
                    OperationType::Read => self.read_bytes += bytes,
                    OperationType::Write => self.write_bytes += bytes,
                }
                self.consecutive_failures = 0;
            }
            Outcome::Failure(err) => {
                self.failures += 1;
                match err {
                    OperationError::ShortTransfer { .. } => self.short_transfers += 1,
                    OperationError::Io { .. } => self.io_errors += 1,
                }
                self.consecutive_failures += 1;
            }
        }

        self.total_latency += result.elapsed;
        self.min_latency = Some(match self.min_latency {
            Some(min) => min.min(result.elapsed),
            None => result.elapsed,
        });
        self.max_latency = self.max_latency.max(result.elapsed);
        self.latency.record(result.elapsed);

        self.consecutive_failures
    }

    pub fn record_flush(&mut self, ok: bool) {
        self.flushes += 1;
        if !ok {
            self.flush_failures += 1;
        }
    }

    /// Cumulative latency / operation count
    pub fn mean_latency(&self) -> Duration {
        if self.operations == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_latency.as_nanos() / self.operations as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    /// Minimum latency, zero when nothing was recorded
    pub fn min(&self) -> Duration {
        self.min_latency.unwrap_or(Duration::ZERO)
    }

    /// Latency at a percentile, clamped to the recorded `[min, max]`
    ///
    /// Histogram buckets report their lower edge, which can fall below the
    /// smallest sample actually seen (everything under 2us shares bucket 0).
    pub fn percentile(&self, percentile: f64) -> Duration {
        if self.operations == 0 {
            return Duration::ZERO;
        }
        self.latency.percentile(percentile).clamp(self.min(), self.max_latency)
    }

    /// Operations per second over a wall-clock window
    pub fn iops(&self, wall_clock: Duration) -> f64 {
        calculate_iops(self.operations, wall_clock)
    }

    /// Successful bytes per second over a wall-clock window
    pub fn throughput(&self, wall_clock: Duration) -> f64 {
        calculate_throughput(self.bytes, wall_clock)
    }
}

/// Thread-safe accumulator shared by all workers of a run
#[derive(Debug, Default)]
pub struct StatsCollector {
    inner: Mutex<AggregateStats>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    // A worker that panicked mid-update cannot leave the counters half-written
    // (every field update is a plain add), so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, AggregateStats> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one result; returns the global consecutive-failure streak
    pub fn record(&self, result: &OperationResult) -> u64 {
        self.lock().record(result)
    }

    pub fn record_flush(&self, ok: bool) {
        self.lock().record_flush(ok);
    }

    /// Point-in-time copy of the aggregates
    pub fn snapshot(&self) -> AggregateStats {
        self.lock().clone()
    }

    /// Operations recorded so far, without copying the histogram
    pub fn operations(&self) -> u64 {
        self.lock().operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OperationRequest;
    use std::sync::Arc;

    fn result(op_type: OperationType, transferred: usize, micros: u64) -> OperationResult {
        let request = OperationRequest { sequence: 0, offset: 0, op_type };
        OperationResult::from_transfer(&request, 64, transferred, Duration::from_micros(micros))
    }

    fn io_failure(op_type: OperationType) -> OperationResult {
        let request = OperationRequest { sequence: 0, offset: 0, op_type };
        let err = std::io::Error::from_raw_os_error(libc::EIO);
        OperationResult::new(&request, Outcome::Failure(OperationError::from_io(&err)), Duration::from_micros(5))
    }

    #[test]
    fn test_record_success_and_failures() {
        let mut stats = AggregateStats::new();

        stats.record(&result(OperationType::Read, 64, 10));
        stats.record(&result(OperationType::Write, 64, 30));
        stats.record(&result(OperationType::Read, 10, 20));
        stats.record(&io_failure(OperationType::Write));

        assert_eq!(stats.operations, 4);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.operations, stats.successes + stats.failures);
        assert_eq!(stats.bytes, 128);
        assert_eq!(stats.read_bytes, 64);
        assert_eq!(stats.write_bytes, 64);
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.short_transfers, 1);
        assert_eq!(stats.io_errors, 1);
    }

    #[test]
    fn test_invariants_hold_after_every_record() {
        let mut stats = AggregateStats::new();
        let mut last_bytes = 0;
        for i in 0..200u64 {
            let transferred = if i % 7 == 0 { 3 } else { 64 };
            stats.record(&result(OperationType::Read, transferred, i));
            assert_eq!(stats.operations, stats.successes + stats.failures);
            assert!(stats.bytes >= last_bytes);
            last_bytes = stats.bytes;
        }
    }

    #[test]
    fn test_consecutive_failures_reset_on_success() {
        let mut stats = AggregateStats::new();
        assert_eq!(stats.record(&io_failure(OperationType::Read)), 1);
        assert_eq!(stats.record(&result(OperationType::Read, 1, 1)), 2);
        assert_eq!(stats.record(&result(OperationType::Read, 64, 1)), 0);
        assert_eq!(stats.record(&io_failure(OperationType::Read)), 1);
    }

    #[test]
    fn test_latency_aggregates() {
        let mut stats = AggregateStats::new();
        assert_eq!(stats.mean_latency(), Duration::ZERO);
        assert_eq!(stats.min(), Duration::ZERO);

        for micros in [10, 20, 30] {
            stats.record(&result(OperationType::Read, 64, micros));
        }

        assert_eq!(stats.min(), Duration::from_micros(10));
        assert_eq!(stats.max_latency, Duration::from_micros(30));
        assert_eq!(stats.mean_latency(), Duration::from_micros(20));
        assert_eq!(stats.total_latency, Duration::from_micros(60));
        assert_eq!(stats.latency.len(), 3);
    }

    #[test]
    fn test_rates() {
        let mut stats = AggregateStats::new();
        for _ in 0..100 {
            stats.record(&result(OperationType::Read, 64, 1));
        }
        assert_eq!(stats.iops(Duration::from_secs(10)), 10.0);
        assert_eq!(stats.throughput(Duration::from_secs(2)), 3200.0);
        assert_eq!(stats.iops(Duration::ZERO), 0.0);
    }

    #[test]
    fn test_flush_counting() {
        let collector = StatsCollector::new();
        collector.record_flush(true);
        collector.record_flush(false);

        let stats = collector.snapshot();
        assert_eq!(stats.flushes, 2);
        assert_eq!(stats.flush_failures, 1);
        assert_eq!(stats.operations, 0);
    }

    #[test]
    fn test_percentiles_never_below_min() {
        let mut stats = AggregateStats::new();
        let request = OperationRequest { sequence: 0, offset: 0, op_type: OperationType::Read };
        for _ in 0..3 {
            stats.record(&OperationResult::from_transfer(&request, 64, 64, Duration::from_nanos(1900)));
        }

        for p in [0.0, 50.0, 99.0, 100.0] {
            assert_eq!(stats.percentile(p), Duration::from_nanos(1900), "p{}", p);
        }
        assert_eq!(AggregateStats::new().percentile(50.0), Duration::ZERO);
    }

    #[test]
    fn test_percentiles_within_min_max() {
        let mut stats = AggregateStats::new();
        let request = OperationRequest { sequence: 0, offset: 0, op_type: OperationType::Read };
        for micros in [3, 7, 150, 151, 900] {
            stats.record(&OperationResult::from_transfer(&request, 64, 64, Duration::from_micros(micros)));
        }

        for p in [0.0, 25.0, 50.0, 90.0, 100.0] {
            let value = stats.percentile(p);
            assert!(value >= stats.min() && value <= stats.max_latency, "p{} = {:?}", p, value);
        }
    }

    #[test]
    fn test_concurrent_recording_is_exact() {
        let collector = Arc::new(StatsCollector::new());

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let collector = Arc::clone(&collector);
                scope.spawn(move || {
                    let op_type = if worker % 2 == 0 { OperationType::Read } else { OperationType::Write };
                    for _ in 0..1000 {
                        collector.record(&result(op_type, 64, 2));
                    }
                });
            }
        });

        let stats = collector.snapshot();
        assert_eq!(stats.operations, 8000);
        assert_eq!(stats.bytes, 8000 * 64);
        assert_eq!(stats.reads, 4000);
        assert_eq!(stats.writes, 4000);
        assert_eq!(collector.operations(), 8000);
    }
}
