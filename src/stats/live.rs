//! Live progress reporting
//!
//! While a run is in progress, a monitor thread periodically snapshots the
//! collector and turns consecutive snapshots into interval rates with
//! [`LiveStats`]. The results, and in verbose mode every single operation, go to
//! a [`ProgressObserver`]. The default observer, [`LogObserver`], writes them
//! through `tracing`.
//!
//! # Example
//!
//! ```
//! use magicsmoke::stats::AggregateStats;
//! use magicsmoke::stats::live::LiveStats;
//!
//! let mut live = LiveStats::new();
//! let snapshot = live.update(&AggregateStats::new());
//! assert_eq!(snapshot.operations, 0);
//! assert_eq!(live.update_count(), 1);
//! ```

use crate::engine::{OperationResult, Outcome};
use crate::stats::AggregateStats;
use crate::util::time::{calculate_iops, calculate_throughput, format_duration, format_rate, format_throughput};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Receives progress events from a running benchmark
///
/// Called from worker and monitor threads, hence `Send + Sync`. Both methods
/// default to doing nothing.
pub trait ProgressObserver: Send + Sync {
    /// One operation finished (only called in verbose mode)
    fn on_operation(&self, _worker: usize, _result: &OperationResult) {}

    /// Periodic progress update
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
}

/// Progress at one point in time, with rates since the previous update
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Time since the run started
    pub elapsed: Duration,

    pub operations: u64,
    pub failures: u64,
    pub bytes: u64,
    pub mean_latency: Duration,

    /// Window the rates below were measured over
    pub interval: Duration,
    pub read_iops: f64,
    pub write_iops: f64,
    pub read_throughput: f64,
    pub write_throughput: f64,
}

#[derive(Debug, Clone, Copy)]
struct LiveSample {
    at: Instant,
    reads: u64,
    writes: u64,
    read_bytes: u64,
    write_bytes: u64,
}

impl LiveSample {
    fn zero(at: Instant) -> Self {
        Self { at, reads: 0, writes: 0, read_bytes: 0, write_bytes: 0 }
    }

    fn from_stats(at: Instant, stats: &AggregateStats) -> Self {
        Self {
            at,
            reads: stats.reads,
            writes: stats.writes,
            read_bytes: stats.read_bytes,
            write_bytes: stats.write_bytes,
        }
    }
}

/// Turns successive aggregate snapshots into interval rates
#[derive(Debug)]
pub struct LiveStats {
    start: Instant,
    last: LiveSample,
    update_count: u64,
}

impl LiveStats {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Tracker whose elapsed time counts from `start`
    pub fn starting_at(start: Instant) -> Self {
        Self {
            start,
            last: LiveSample::zero(start),
            update_count: 0,
        }
    }

    /// Take a new snapshot and compute rates since the previous one
    pub fn update(&mut self, stats: &AggregateStats) -> ProgressSnapshot {
        let now = Instant::now();
        let current = LiveSample::from_stats(now, stats);
        let interval = now.duration_since(self.last.at);

        let snapshot = ProgressSnapshot {
            elapsed: now.duration_since(self.start),
            operations: stats.operations,
            failures: stats.failures,
            bytes: stats.bytes,
            mean_latency: stats.mean_latency(),
            interval,
            read_iops: calculate_iops(current.reads.saturating_sub(self.last.reads), interval),
            write_iops: calculate_iops(current.writes.saturating_sub(self.last.writes), interval),
            read_throughput: calculate_throughput(
                current.read_bytes.saturating_sub(self.last.read_bytes),
                interval,
            ),
            write_throughput: calculate_throughput(
                current.write_bytes.saturating_sub(self.last.write_bytes),
                interval,
            ),
        };

        self.last = current;
        self.update_count += 1;
        snapshot
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }
}

impl Default for LiveStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer that logs progress through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_operation(&self, worker: usize, result: &OperationResult) {
        match &result.outcome {
            Outcome::Success { bytes } => debug!(
                worker,
                sequence = result.sequence,
                op = %result.op_type,
                offset = result.offset,
                bytes,
                latency = %format_duration(result.elapsed),
                "Operation complete"
            ),
            Outcome::Failure(err) => debug!(
                worker,
                sequence = result.sequence,
                op = %result.op_type,
                offset = result.offset,
                error = %err,
                latency = %format_duration(result.elapsed),
                "Operation failed"
            ),
        }
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        info!(
            "[{:>4}s] R: {} ({}) W: {} ({}) Lat: {} Ops: {} Errors: {}",
            snapshot.elapsed.as_secs(),
            format_rate(snapshot.read_iops),
            format_throughput(snapshot.read_throughput),
            format_rate(snapshot.write_iops),
            format_throughput(snapshot.write_throughput),
            format_duration(snapshot.mean_latency),
            snapshot.operations,
            snapshot.failures,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{OperationRequest, OperationType};

    fn stats_with(reads: u64, writes: u64) -> AggregateStats {
        let mut stats = AggregateStats::new();
        for i in 0..reads + writes {
            let op_type = if i < reads { OperationType::Read } else { OperationType::Write };
            let request = OperationRequest { sequence: i, offset: 0, op_type };
            stats.record(&OperationResult::from_transfer(&request, 4096, 4096, Duration::from_micros(100)));
        }
        stats
    }

    #[test]
    fn test_live_stats_interval_rates() {
        let start = Instant::now() - Duration::from_secs(2);
        let mut live = LiveStats::starting_at(start);

        let snapshot = live.update(&stats_with(200, 100));
        assert_eq!(snapshot.operations, 300);
        assert_eq!(snapshot.bytes, 300 * 4096);
        assert!(snapshot.elapsed >= Duration::from_secs(2));
        // ~2 second window
        assert!(snapshot.read_iops > 90.0 && snapshot.read_iops <= 100.0);
        assert!(snapshot.write_iops > 45.0 && snapshot.write_iops <= 50.0);
        assert_eq!(live.update_count(), 1);
    }

    #[test]
    fn test_live_stats_uses_deltas() {
        let mut live = LiveStats::new();
        live.update(&stats_with(50, 0));

        // Same totals again: nothing happened in this window
        let snapshot = live.update(&stats_with(50, 0));
        assert_eq!(snapshot.read_iops, 0.0);
        assert_eq!(snapshot.read_throughput, 0.0);
        assert_eq!(snapshot.operations, 50);
        assert_eq!(live.update_count(), 2);
    }

    #[test]
    fn test_log_observer_does_not_panic() {
        let observer = LogObserver;
        let request = OperationRequest { sequence: 1, offset: 512, op_type: OperationType::Read };
        observer.on_operation(0, &OperationResult::from_transfer(&request, 512, 512, Duration::from_micros(3)));
        observer.on_operation(0, &OperationResult::from_transfer(&request, 512, 0, Duration::from_micros(3)));
        observer.on_progress(&LiveStats::new().update(&stats_with(1, 1)));
    }
}
