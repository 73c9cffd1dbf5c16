//! Benchmark orchestration
//!
//! The [`Coordinator`] turns a validated [`Config`] and a resolved
//! [`TargetHandle`] into a [`RunReport`]. Worker 0 runs on the calling thread;
//! any extra workers run on scoped threads that borrow the shared
//! [`RunControl`] and [`StatsCollector`]. In verbose mode a monitor thread
//! snapshots the collector every progress interval.
//!
//! # Example
//!
//! ```no_run
//! use magicsmoke::config::Config;
//! use magicsmoke::coordinator::Coordinator;
//! use magicsmoke::target::resolver::resolve;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut config = Config::default();
//! config.target.path = Some("/dev/sdb".into());
//! config.workload.read = true;
//! config.workload.operation_size = Some(4096);
//!
//! let target = resolve("/dev/sdb".as_ref(), &config.resolve_options()?)?;
//! let report = Coordinator::new(config, Arc::new(target)).run()?;
//! println!("{:.0} IOPS", report.iops());
//! # Ok(())
//! # }
//! ```

use crate::config::validator::validate_geometry;
use crate::config::workload::RunBound;
use crate::config::Config;
use crate::engine::sync::SyncEngine;
use crate::engine::IOEngine;
use crate::error::AbortReason;
use crate::stats::live::{LiveStats, ProgressObserver};
use crate::stats::{AggregateStats, StatsCollector};
use crate::target::{TargetDescriptor, TargetHandle};
use crate::worker::{Worker, WorkerSettings};
use crate::Result;
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Run-scoped cancellation flag
///
/// Cloning shares the flag. Setting it stops every worker before its next
/// operation; operations already in flight complete.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State shared by the workers of one run
///
/// Hands out sequence numbers so that exactly `limit` operations are issued
/// across all workers, and carries the abort flag.
#[derive(Debug)]
pub struct RunControl {
    limit: u64,
    issued: AtomicU64,
    cancel: CancelToken,
    aborted: AtomicBool,
    abort: Mutex<Option<AbortReason>>,
}

impl RunControl {
    pub fn new(limit: u64, cancel: CancelToken) -> Self {
        Self {
            limit,
            issued: AtomicU64::new(0),
            cancel,
            aborted: AtomicBool::new(false),
            abort: Mutex::new(None),
        }
    }

    /// Claim the next sequence number, or `None` when the run should stop
    pub fn claim(&self) -> Option<u64> {
        if self.is_stopped() {
            return None;
        }
        let limit = self.limit;
        self.issued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .ok()
    }

    /// Stop the run; the first reason recorded wins
    pub fn abort(&self, reason: AbortReason) {
        let mut slot = self.abort.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(reason);
        }
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.aborted.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Sequence numbers handed out so far
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn take_abort(&self) -> Option<AbortReason> {
        self.abort.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take()
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The action count was exhausted
    Completed,

    /// Stopped by the cancel token before the action count was reached
    Cancelled,

    Aborted(AbortReason),
}

impl Completion {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Completion::Aborted(_))
    }
}

impl std::fmt::Display for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Completed => write!(f, "completed"),
            Completion::Cancelled => write!(f, "cancelled"),
            Completion::Aborted(reason) => write!(f, "aborted: {}", reason),
        }
    }
}

/// Everything known about a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub target: TargetDescriptor,
    pub operation_size: u64,
    pub bound: RunBound,

    /// Seed actually used (resolved from entropy if none was given)
    pub seed: u64,

    pub threads: usize,
    pub granularity: u64,

    /// Only meaningful for mixed runs
    pub read_percent: u8,

    pub stats: AggregateStats,

    /// From the first operation to the end of the final flush
    pub wall_clock: Duration,

    pub completion: Completion,
}

impl RunReport {
    pub fn iops(&self) -> f64 {
        self.stats.iops(self.wall_clock)
    }

    /// Bytes per second
    pub fn throughput(&self) -> f64 {
        self.stats.throughput(self.wall_clock)
    }
}

type EngineFactory<E> = Box<dyn Fn(usize) -> E + Send + Sync>;

/// Runs one benchmark against one target
pub struct Coordinator<E: IOEngine = SyncEngine> {
    config: Config,
    target: Arc<TargetHandle>,
    make_engine: EngineFactory<E>,
    observer: Option<Arc<dyn ProgressObserver>>,
    cancel: CancelToken,
}

impl Coordinator<SyncEngine> {
    /// Coordinator using positioned synchronous IO
    pub fn new(config: Config, target: Arc<TargetHandle>) -> Self {
        Self::with_engine(config, target, |_| SyncEngine::new())
    }
}

impl<E: IOEngine> Coordinator<E> {
    /// Coordinator with a custom engine; `make_engine` is called once per worker id
    pub fn with_engine<F>(config: Config, target: Arc<TargetHandle>, make_engine: F) -> Self
    where
        F: Fn(usize) -> E + Send + Sync + 'static,
    {
        Self {
            config,
            target,
            make_engine: Box::new(make_engine),
            observer: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops this run when cancelled
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Execute the benchmark
    ///
    /// Errors only for problems detected before the first operation (geometry,
    /// buffer allocation) or a panicking worker. Per-operation failures and
    /// aborts end up in the report.
    pub fn run(&self) -> Result<RunReport> {
        let workload = &self.config.workload;
        let descriptor = self.target.descriptor().clone();
        validate_geometry(workload, &descriptor)?;

        let seed = workload.seed.resolve();
        let threads = self.config.workers.threads.max(1);
        let settings = WorkerSettings::from_workload(workload, descriptor.alignment, self.config.runtime.fail_fast, seed);

        let mut workers = (0..threads)
            .map(|id| Worker::new(id, Arc::clone(&self.target), &settings, (self.make_engine)(id)))
            .collect::<Result<Vec<_>>>()
            .context("Failed to set up workers")?;

        let control = RunControl::new(workload.actions.limit(), self.cancel.clone());
        let collector = StatsCollector::new();
        let verbose = self.config.output.verbose;
        let op_observer = if verbose { self.observer.as_deref() } else { None };

        info!(
            path = %descriptor.path.display(),
            kind = %descriptor.kind,
            capacity = descriptor.capacity,
            operation_size = settings.operation_size,
            granularity = settings.granularity,
            access = %descriptor.access,
            threads,
            seed,
            actions = %workload.actions,
            "Starting benchmark"
        );

        let started_at = Utc::now();
        let start = Instant::now();
        let mut panicked = 0usize;

        thread::scope(|scope| {
            let (stop_tx, stop_rx) = mpsc::channel::<()>();

            if let (true, Some(observer)) = (verbose, self.observer.as_deref()) {
                let collector = &collector;
                let interval = self.config.output.progress_interval();
                scope.spawn(move || {
                    let mut live = LiveStats::starting_at(start);
                    loop {
                        match stop_rx.recv_timeout(interval) {
                            Err(RecvTimeoutError::Timeout) => observer.on_progress(&live.update(&collector.snapshot())),
                            _ => break,
                        }
                    }
                    observer.on_progress(&live.update(&collector.snapshot()));
                });
            }

            let (first, rest) = workers.split_at_mut(1);
            let handles: Vec<_> = rest
                .iter_mut()
                .map(|worker| {
                    let control = &control;
                    let collector = &collector;
                    scope.spawn(move || worker.run(control, collector, op_observer))
                })
                .collect();

            first[0].run(&control, &collector, op_observer);

            for handle in handles {
                if handle.join().is_err() {
                    panicked += 1;
                }
            }
            drop(stop_tx);
        });

        if panicked > 0 {
            bail!("{} worker thread(s) panicked", panicked);
        }

        if workload.flush.at_end && descriptor.access.allows_write() && !control.is_aborted() {
            debug!("Final flush");
            workers[0].flush(&collector);
        }
        let wall_clock = start.elapsed();

        let completion = match control.take_abort() {
            Some(reason) => Completion::Aborted(reason),
            None if control.issued() < control.limit() => Completion::Cancelled,
            None => Completion::Completed,
        };

        let stats = collector.snapshot();
        match &completion {
            Completion::Aborted(reason) => warn!(operations = stats.operations, "Run aborted: {}", reason),
            other => info!(operations = stats.operations, failures = stats.failures, "Run {}", other),
        }

        Ok(RunReport {
            started_at,
            target: descriptor,
            operation_size: settings.operation_size,
            bound: workload.actions,
            seed,
            threads,
            granularity: settings.granularity,
            read_percent: workload.read_percent,
            stats,
            wall_clock,
            completion,
        })
    }
}
