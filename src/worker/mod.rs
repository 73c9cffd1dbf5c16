//! Worker dispatch loop
//!
//! A [`Worker`] is one sequential stream of operations: claim a sequence number,
//! pick a direction, pick an offset, execute, record. It owns everything that
//! is per-stream (offset generator, direction chooser, buffers, IO engine) and
//! shares only the target, the run control block and the statistics collector.
//!
//! Workers stop when the run's operation budget is used up, when the run is
//! cancelled, or when any worker triggers an abort. The check happens before
//! each new operation; an operation already in flight always completes and is
//! recorded.

use crate::config::workload::{FlushPolicy, WritePattern};
use crate::config::WorkloadConfig;
use crate::coordinator::RunControl;
use crate::distribution::uniform::UniformDistribution;
use crate::distribution::{direction_stream, OffsetGenerator};
use crate::engine::{IOEngine, OperationRequest, OperationType, Outcome};
use crate::error::{AbortReason, OperationError};
use crate::stats::live::ProgressObserver;
use crate::stats::StatsCollector;
use crate::target::{AccessMode, TargetHandle};
use crate::util::buffer::AlignedBuffer;
use crate::Result;
use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a worker decides between reading and writing
#[derive(Debug)]
enum Direction {
    Fixed(OperationType),

    /// Weighted coin flip per operation
    Mixed { read_percent: u8, rng: Xoshiro256PlusPlus },
}

impl Direction {
    fn new(access: AccessMode, read_percent: u8, seed: u64, worker: usize) -> Self {
        match access {
            AccessMode::Read => Direction::Fixed(OperationType::Read),
            AccessMode::Write => Direction::Fixed(OperationType::Write),
            AccessMode::ReadWrite => Direction::Mixed {
                read_percent,
                rng: direction_stream(seed, worker),
            },
        }
    }

    #[inline]
    fn next(&mut self) -> OperationType {
        match self {
            Direction::Fixed(op_type) => *op_type,
            Direction::Mixed { read_percent, rng } => {
                if rng.gen_range(0..100u8) < *read_percent {
                    OperationType::Read
                } else {
                    OperationType::Write
                }
            }
        }
    }
}

/// Per-worker settings derived from the run configuration
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub operation_size: u64,
    pub granularity: u64,
    pub read_percent: u8,
    pub write_pattern: WritePattern,
    pub flush: FlushPolicy,

    /// Consecutive-failure threshold (0 disables)
    pub fail_fast: u64,

    /// Run seed; each worker derives its own streams from it
    pub seed: u64,
}

impl WorkerSettings {
    pub fn from_workload(workload: &WorkloadConfig, device_alignment: u64, fail_fast: u64, seed: u64) -> Self {
        let operation_size = workload.operation_size();
        Self {
            operation_size,
            granularity: workload.alignment.granularity(operation_size, device_alignment),
            read_percent: workload.read_percent,
            write_pattern: workload.write_pattern,
            flush: workload.flush,
            fail_fast,
            seed,
        }
    }
}

/// One sequential dispatch loop
pub struct Worker<E: IOEngine> {
    id: usize,
    target: Arc<TargetHandle>,
    engine: E,
    offsets: OffsetGenerator<UniformDistribution>,
    direction: Direction,

    /// Destination of reads
    read_buffer: Option<AlignedBuffer>,

    /// Payload of writes, filled once
    write_buffer: Option<AlignedBuffer>,

    flush: FlushPolicy,
    fail_fast: u64,

    operations: u64,
    writes: u64,
}

impl<E: IOEngine> Worker<E> {
    /// Set up a worker; all allocation happens here, outside the measured loop
    pub fn new(id: usize, target: Arc<TargetHandle>, settings: &WorkerSettings, engine: E) -> Result<Self> {
        let access = target.access();
        let offsets = OffsetGenerator::new(
            target.capacity(),
            settings.operation_size,
            settings.granularity,
            UniformDistribution::for_worker(settings.seed, id),
        )?;

        let size = usize::try_from(settings.operation_size)?;
        let alignment = usize::try_from(target.alignment())?;

        let read_buffer = if access.allows_read() {
            Some(AlignedBuffer::new(size, alignment)?)
        } else {
            None
        };

        let write_buffer = if access.allows_write() {
            let mut buffer = AlignedBuffer::new(size, alignment)?;
            match settings.write_pattern {
                WritePattern::Zeros => buffer.fill_zeros(),
                WritePattern::Random => {
                    let mut rng = crate::distribution::worker_stream(settings.seed ^ 0x5eed_b0ff, id);
                    buffer.fill_random(&mut rng);
                }
            }
            Some(buffer)
        } else {
            None
        };

        debug!(
            worker = id,
            slots = offsets.slots(),
            granularity = offsets.granularity(),
            access = %access,
            "Worker ready"
        );

        Ok(Self {
            id,
            direction: Direction::new(access, settings.read_percent, settings.seed, id),
            target,
            engine,
            offsets,
            read_buffer,
            write_buffer,
            flush: settings.flush,
            fail_fast: settings.fail_fast,
            operations: 0,
            writes: 0,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Operations this worker has executed
    pub fn operations(&self) -> u64 {
        self.operations
    }

    /// Run until the budget is exhausted, the run is cancelled, or an abort fires
    ///
    /// `observer` receives every result; pass `None` unless verbose.
    pub fn run(&mut self, control: &RunControl, collector: &StatsCollector, observer: Option<&dyn ProgressObserver>) {
        while let Some(sequence) = control.claim() {
            let op_type = self.direction.next();
            let request = OperationRequest {
                sequence,
                offset: self.offsets.next(),
                op_type,
            };

            let buffer = match op_type {
                OperationType::Read => self.read_buffer.as_mut(),
                OperationType::Write => self.write_buffer.as_mut(),
            };
            let Some(buffer) = buffer else {
                // Direction always follows the access mode, so the buffer exists
                continue;
            };

            let result = self.engine.execute(&self.target, &request, buffer.as_mut_slice());
            let streak = collector.record(&result);
            self.operations += 1;

            if let Some(observer) = observer {
                observer.on_operation(self.id, &result);
            }

            if let Outcome::Failure(ref err) = result.outcome {
                warn!(
                    worker = self.id,
                    path = %self.target.path().display(),
                    op = %op_type,
                    offset = request.offset,
                    error = %err,
                    "Operation failed"
                );
                if let Some(reason) = self.abort_reason(&request, err, streak) {
                    control.abort(reason);
                    break;
                }
            }

            if op_type == OperationType::Write {
                self.writes += 1;
                if self.flush.due(self.writes) {
                    self.flush(collector);
                }
            }
        }

        debug!(worker = self.id, operations = self.operations, writes = self.writes, "Worker finished");
    }

    fn abort_reason(&self, request: &OperationRequest, err: &OperationError, streak: u64) -> Option<AbortReason> {
        if err.is_fatal() {
            return Some(AbortReason::TargetLost {
                path: self.target.path().to_path_buf(),
                op_type: request.op_type,
                offset: request.offset,
                error: err.clone(),
            });
        }
        if self.fail_fast > 0 && streak >= self.fail_fast {
            return Some(AbortReason::ConsecutiveFailures {
                count: streak,
                threshold: self.fail_fast,
                path: self.target.path().to_path_buf(),
                op_type: request.op_type,
                offset: request.offset,
                last_error: err.clone(),
            });
        }
        None
    }

    /// Force written data to stable storage and count the flush
    pub fn flush(&mut self, collector: &StatsCollector) {
        match self.engine.flush(&self.target) {
            Ok(()) => collector.record_flush(true),
            Err(err) => {
                warn!(worker = self.id, error = %format!("{:#}", err), "Flush failed");
                collector.record_flush(false);
            }
        }
    }
}
