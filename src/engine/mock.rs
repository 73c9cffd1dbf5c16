//! Mock IO engine for testing
//!
//! Simulates operations without touching the target. Outcomes can be scripted per
//! call (success, short transfer, IO error) and fall back to a default behavior once
//! the script is exhausted. Clones share state, so one engine can be handed to
//! every worker of a multi-threaded run and inspected afterwards.
//!
//! # Example
//!
//! ```
//! use magicsmoke::engine::mock::{MockEngine, MockOutcome};
//!
//! let engine = MockEngine::new();
//! engine.push_script([MockOutcome::Short(10), MockOutcome::Succeed]);
//! engine.set_default(MockOutcome::Errno(libc::EIO));
//! assert_eq!(engine.submitted().len(), 0);
//! ```

use super::{IOEngine, OperationRequest, OperationResult, OperationType, Outcome};
use crate::error::OperationError;
use crate::target::TargetHandle;
use crate::Result;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Scripted behavior for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutcome {
    /// Transfer all requested bytes
    Succeed,

    /// Transfer only this many bytes
    Short(usize),

    /// Fail with this errno
    Errno(i32),
}

#[derive(Debug)]
struct MockState {
    script: VecDeque<MockOutcome>,
    default: MockOutcome,
    latency: Duration,
    submitted: Vec<OperationRecord>,
    flushes: u64,
    fail_flush: bool,
}

/// Record of an executed operation for test verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    pub sequence: u64,
    pub op_type: OperationType,
    pub offset: u64,
    pub length: usize,
}

/// Mock IO engine for testing
#[derive(Debug, Clone)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    /// Engine that succeeds every operation with a 1us latency
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                script: VecDeque::new(),
                default: MockOutcome::Succeed,
                latency: Duration::from_micros(1),
                submitted: Vec::new(),
                flushes: 0,
                fail_flush: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue outcomes for the next operations, in order
    pub fn push_script<I: IntoIterator<Item = MockOutcome>>(&self, outcomes: I) {
        self.state().script.extend(outcomes);
    }

    /// Outcome used once the script is exhausted
    pub fn set_default(&self, outcome: MockOutcome) {
        self.state().default = outcome;
    }

    /// Latency reported for every operation
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Make every flush fail
    pub fn set_fail_flush(&self, fail: bool) {
        self.state().fail_flush = fail;
    }

    /// All operations executed so far, in execution order
    pub fn submitted(&self) -> Vec<OperationRecord> {
        self.state().submitted.clone()
    }

    /// Number of flush calls
    pub fn flushes(&self) -> u64 {
        self.state().flushes
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IOEngine for MockEngine {
    fn execute(
        &mut self,
        _target: &TargetHandle,
        request: &OperationRequest,
        buffer: &mut [u8],
    ) -> OperationResult {
        let mut state = self.state();
        let behavior = state.script.pop_front().unwrap_or(state.default);
        let latency = state.latency;
        state.submitted.push(OperationRecord {
            sequence: request.sequence,
            op_type: request.op_type,
            offset: request.offset,
            length: buffer.len(),
        });
        drop(state);

        match behavior {
            MockOutcome::Succeed => {
                OperationResult::from_transfer(request, buffer.len(), buffer.len(), latency)
            }
            MockOutcome::Short(bytes) => {
                OperationResult::from_transfer(request, buffer.len(), bytes.min(buffer.len()), latency)
            }
            MockOutcome::Errno(errno) => {
                let err = std::io::Error::from_raw_os_error(errno);
                OperationResult::new(request, Outcome::Failure(OperationError::from_io(&err)), latency)
            }
        }
    }

    fn flush(&mut self, target: &TargetHandle) -> Result<()> {
        let mut state = self.state();
        state.flushes += 1;
        if state.fail_flush {
            anyhow::bail!("mock flush failure: path={}", target.path().display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{AccessMode, TargetHandle};
    use tempfile::TempDir;

    fn fixture() -> (TempDir, TargetHandle) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mock.dat");
        std::fs::write(&path, [0u8; 256]).unwrap();
        let target = TargetHandle::open_regular_file(&path, AccessMode::ReadWrite).unwrap();
        (dir, target)
    }

    #[test]
    fn test_mock_engine_script_then_default() {
        let (_dir, target) = fixture();
        let mut engine = MockEngine::new();
        engine.push_script([MockOutcome::Short(4), MockOutcome::Errno(libc::EIO)]);
        engine.set_default(MockOutcome::Succeed);

        let mut buffer = vec![0u8; 16];
        let mut results = Vec::new();
        for sequence in 0..3 {
            let request = OperationRequest { sequence, offset: sequence * 16, op_type: OperationType::Read };
            results.push(engine.execute(&target, &request, &mut buffer).outcome);
        }

        assert_eq!(
            results[0],
            Outcome::Failure(OperationError::ShortTransfer { requested: 16, transferred: 4 })
        );
        assert!(matches!(results[1], Outcome::Failure(OperationError::Io { errno: Some(libc::EIO), fatal: false, .. })));
        assert_eq!(results[2], Outcome::Success { bytes: 16 });

        let submitted = engine.submitted();
        assert_eq!(submitted.len(), 3);
        assert_eq!(submitted[2].offset, 32);
    }

    #[test]
    fn test_mock_engine_clones_share_state() {
        let (_dir, target) = fixture();
        let engine = MockEngine::new();
        let mut clone = engine.clone();

        let mut buffer = vec![0u8; 8];
        let request = OperationRequest { sequence: 0, offset: 0, op_type: OperationType::Write };
        clone.execute(&target, &request, &mut buffer);
        clone.flush(&target).unwrap();

        assert_eq!(engine.submitted().len(), 1);
        assert_eq!(engine.flushes(), 1);
    }

    #[test]
    fn test_mock_engine_flush_failure() {
        let (_dir, target) = fixture();
        let mut engine = MockEngine::new();
        engine.set_fail_flush(true);
        assert!(engine.flush(&target).is_err());
        assert_eq!(engine.flushes(), 1);
    }
}
