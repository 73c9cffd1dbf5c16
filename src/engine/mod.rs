//! IO executor abstraction
//!
//! An IO engine performs exactly one read or write of the configured operation size
//! at a given offset against a [`TargetHandle`] and reports what happened. Engines
//! never retry short transfers: a partial read/write is a measurement-relevant
//! event and is returned as a failure so the statistics see it.
//!
//! # Timing
//!
//! Engines own the latency measurement. The monotonic timer starts immediately
//! before the syscall is issued and stops immediately after it returns, so offset
//! generation and dispatch overhead never leak into the recorded latency.
//!
//! # Engine Types
//!
//! - **Synchronous** ([`sync::SyncEngine`]): blocking pread/pwrite on the shared descriptor
//! - **Mock** ([`mock::MockEngine`]): scripted outcomes for tests
//!
//! # Example
//!
//! ```no_run
//! use magicsmoke::engine::{IOEngine, OperationRequest, OperationType};
//! use magicsmoke::engine::sync::SyncEngine;
//! use magicsmoke::target::resolver::{resolve, ResolveOptions};
//! use std::path::Path;
//!
//! let target = resolve(Path::new("/dev/sdb"), &ResolveOptions::default())?;
//! let mut engine = SyncEngine::new();
//! let mut buffer = vec![0u8; 4096];
//!
//! let request = OperationRequest { sequence: 0, offset: 8192, op_type: OperationType::Read };
//! let result = engine.execute(&target, &request, &mut buffer);
//! println!("{:?} in {:?}", result.outcome, result.elapsed);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::error::OperationError;
use crate::target::TargetHandle;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// IO engine trait for all executors
///
/// Engines must be `Send` so each worker thread can own one. They are not shared:
/// every worker gets its own engine instance, and all of them issue positioned IO
/// against the same shared target descriptor.
pub trait IOEngine: Send {
    /// Perform a single operation
    ///
    /// `buffer.len()` is the operation size. For reads, data lands in `buffer`; for
    /// writes, `buffer` is the payload. The returned result always carries the
    /// request's sequence number, type and offset.
    fn execute(
        &mut self,
        target: &TargetHandle,
        request: &OperationRequest,
        buffer: &mut [u8],
    ) -> OperationResult;

    /// Flush written data to stable storage
    ///
    /// Called by workers according to the flush policy, never per operation.
    fn flush(&mut self, target: &TargetHandle) -> Result<()>;
}

/// Operation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Read `operation_size` bytes from the target into the buffer
    Read,

    /// Write the buffer to the target
    Write,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Read => write!(f, "read"),
            OperationType::Write => write!(f, "write"),
        }
    }
}

/// One operation to perform
///
/// Created fresh per iteration by the worker and discarded after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationRequest {
    /// Run-wide sequence number (unique across workers)
    pub sequence: u64,

    /// Byte offset, always within `0..=capacity - operation_size`
    pub offset: u64,

    pub op_type: OperationType,
}

/// What a single operation achieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// All requested bytes were transferred
    Success { bytes: u64 },

    Failure(OperationError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Result of a single operation
///
/// Consumed once by the statistics collector (and by the progress observer when
/// verbose), then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub sequence: u64,
    pub op_type: OperationType,
    pub offset: u64,
    pub outcome: Outcome,

    /// Time spent inside the syscall only
    pub elapsed: Duration,
}

impl OperationResult {
    /// Classify a transfer count against the requested length
    pub fn from_transfer(
        request: &OperationRequest,
        requested: usize,
        transferred: usize,
        elapsed: Duration,
    ) -> Self {
        let outcome = if transferred == requested {
            Outcome::Success { bytes: transferred as u64 }
        } else {
            Outcome::Failure(OperationError::ShortTransfer {
                requested: requested as u64,
                transferred: transferred as u64,
            })
        };
        Self::new(request, outcome, elapsed)
    }

    pub fn new(request: &OperationRequest, outcome: Outcome, elapsed: Duration) -> Self {
        Self {
            sequence: request.sequence,
            op_type: request.op_type,
            offset: request.offset,
            outcome,
            elapsed,
        }
    }
}

pub mod sync;
pub mod mock;
