//! Synchronous IO engine
//!
//! Blocking pread/pwrite against the target's shared descriptor. Positioned IO
//! never moves the file offset, so any number of workers can issue operations on
//! the same descriptor without a seek-then-read race and without a lock.
//!
//! Each operation is exactly one syscall. A transfer shorter than requested is
//! reported as [`OperationError::ShortTransfer`] instead of being completed with a
//! follow-up call; only `EINTR` (nothing transferred) is reissued, a bounded
//! number of times.

use super::{IOEngine, OperationRequest, OperationResult, OperationType, Outcome};
use crate::error::OperationError;
use crate::target::TargetHandle;
use crate::Result;
use anyhow::Context;
use std::io;
use std::time::{Duration, Instant};

/// Reissues of an interrupted syscall before the operation counts as failed
pub const MAX_INTERRUPTED_REISSUES: u32 = 16;

/// Synchronous IO engine using pread/pwrite
///
/// Queue depth is always 1: the calling worker blocks until the syscall returns.
#[derive(Debug, Default)]
pub struct SyncEngine {
    /// Number of EINTR reissues observed (diagnostics only)
    interrupted: u64,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many syscalls were interrupted and reissued
    pub fn interrupted(&self) -> u64 {
        self.interrupted
    }

    /// Time one syscall, reissuing it while it is interrupted
    ///
    /// At most [`MAX_INTERRUPTED_REISSUES`] reissues; after that the `EINTR`
    /// is returned like any other error. The elapsed time is that of the last
    /// attempt.
    fn reissue_interrupted<F>(&mut self, mut issue: F) -> (io::Result<usize>, Duration)
    where
        F: FnMut() -> io::Result<usize>,
    {
        let mut reissued = 0;
        loop {
            let start = Instant::now();
            let ret = issue();
            let elapsed = start.elapsed();

            match ret {
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted && reissued < MAX_INTERRUPTED_REISSUES => {
                    reissued += 1;
                    self.interrupted += 1;
                }
                ret => return (ret, elapsed),
            }
        }
    }

    /// Issue one positioned syscall
    ///
    /// Returns the raw syscall return value.
    #[inline(always)]
    fn issue(fd: i32, op_type: OperationType, buffer: &mut [u8], offset: u64) -> isize {
        // SAFETY: buffer is a live, exclusively borrowed slice of exactly buffer.len()
        // bytes and fd stays open for as long as the TargetHandle is borrowed.
        unsafe {
            match op_type {
                OperationType::Read => libc::pread(
                    fd,
                    buffer.as_mut_ptr() as *mut libc::c_void,
                    buffer.len(),
                    offset as libc::off_t,
                ),
                OperationType::Write => libc::pwrite(
                    fd,
                    buffer.as_ptr() as *const libc::c_void,
                    buffer.len(),
                    offset as libc::off_t,
                ),
            }
        }
    }
}

impl IOEngine for SyncEngine {
    fn execute(
        &mut self,
        target: &TargetHandle,
        request: &OperationRequest,
        buffer: &mut [u8],
    ) -> OperationResult {
        let fd = target.fd();
        let requested = buffer.len();
        let (ret, elapsed) = self.reissue_interrupted(|| {
            let ret = Self::issue(fd, request.op_type, buffer, request.offset);
            if ret >= 0 {
                Ok(ret as usize)
            } else {
                Err(io::Error::last_os_error())
            }
        });

        match ret {
            Ok(transferred) => OperationResult::from_transfer(request, requested, transferred, elapsed),
            Err(err) => OperationResult::new(request, Outcome::Failure(OperationError::from_io(&err)), elapsed),
        }
    }

    fn flush(&mut self, target: &TargetHandle) -> Result<()> {
        target
            .file()
            .sync_data()
            .with_context(|| format!("fdatasync failed: path={}", target.path().display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{AccessMode, TargetHandle};
    use tempfile::TempDir;

    fn open_fixture(dir: &TempDir, name: &str, contents: &[u8], access: AccessMode) -> TargetHandle {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        TargetHandle::open_regular_file(&path, access).unwrap()
    }

    #[test]
    fn test_sync_engine_read_at_offset() {
        let temp_dir = TempDir::new().unwrap();
        let target = open_fixture(
            &temp_dir,
            "read.dat",
            b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            AccessMode::Read,
        );

        let mut engine = SyncEngine::new();
        let mut buffer = vec![0u8; 10];
        let request = OperationRequest { sequence: 3, offset: 10, op_type: OperationType::Read };

        let result = engine.execute(&target, &request, &mut buffer);

        assert_eq!(result.outcome, Outcome::Success { bytes: 10 });
        assert_eq!(result.sequence, 3);
        assert_eq!(&buffer[..], b"ABCDEFGHIJ");
    }

    #[test]
    fn test_sync_engine_write_at_offset() {
        let temp_dir = TempDir::new().unwrap();
        let target = open_fixture(&temp_dir, "write.dat", &[0u8; 32], AccessMode::ReadWrite);

        let mut engine = SyncEngine::new();
        let mut buffer = b"magic".to_vec();
        let request = OperationRequest { sequence: 0, offset: 8, op_type: OperationType::Write };

        let result = engine.execute(&target, &request, &mut buffer);
        assert_eq!(result.outcome, Outcome::Success { bytes: 5 });

        engine.flush(&target).unwrap();
        let written = std::fs::read(target.path()).unwrap();
        assert_eq!(&written[8..13], b"magic");
        assert_eq!(written.len(), 32);
    }

    #[test]
    fn test_sync_engine_short_read_at_end() {
        let temp_dir = TempDir::new().unwrap();
        let target = open_fixture(&temp_dir, "short.dat", &[7u8; 100], AccessMode::Read);

        let mut engine = SyncEngine::new();
        let mut buffer = vec![0u8; 64];
        let request = OperationRequest { sequence: 0, offset: 80, op_type: OperationType::Read };

        let result = engine.execute(&target, &request, &mut buffer);
        assert_eq!(
            result.outcome,
            Outcome::Failure(OperationError::ShortTransfer { requested: 64, transferred: 20 })
        );
    }

    #[test]
    fn test_sync_engine_write_on_read_only_target_fails() {
        let temp_dir = TempDir::new().unwrap();
        let target = open_fixture(&temp_dir, "ro.dat", &[0u8; 64], AccessMode::Read);

        let mut engine = SyncEngine::new();
        let mut buffer = vec![1u8; 16];
        let request = OperationRequest { sequence: 0, offset: 0, op_type: OperationType::Write };

        let result = engine.execute(&target, &request, &mut buffer);
        match result.outcome {
            Outcome::Failure(OperationError::Io { errno, fatal, .. }) => {
                assert_eq!(errno, Some(libc::EBADF));
                assert!(fatal);
            }
            other => panic!("expected IO failure, got {:?}", other),
        }
    }

    #[test]
    fn test_interrupted_reissue_is_bounded() {
        let mut engine = SyncEngine::new();
        let mut calls = 0u32;
        let (ret, _) = engine.reissue_interrupted(|| {
            calls += 1;
            Err(io::Error::from_raw_os_error(libc::EINTR))
        });

        let err = ret.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert_eq!(calls, MAX_INTERRUPTED_REISSUES + 1);
        assert_eq!(engine.interrupted(), MAX_INTERRUPTED_REISSUES as u64);

        let failure = OperationError::from_io(&err);
        assert!(!failure.is_fatal());
    }

    #[test]
    fn test_interrupted_then_success() {
        let mut engine = SyncEngine::new();
        let mut calls = 0u32;
        let (ret, _) = engine.reissue_interrupted(|| {
            calls += 1;
            if calls < 3 {
                Err(io::Error::from_raw_os_error(libc::EINTR))
            } else {
                Ok(64)
            }
        });

        assert_eq!(ret.unwrap(), 64);
        assert_eq!(engine.interrupted(), 2);
    }

    #[test]
    fn test_sync_engine_measures_latency() {
        let temp_dir = TempDir::new().unwrap();
        let target = open_fixture(&temp_dir, "lat.dat", &[0u8; 4096], AccessMode::Read);

        let mut engine = SyncEngine::new();
        let mut buffer = vec![0u8; 4096];
        let request = OperationRequest { sequence: 0, offset: 0, op_type: OperationType::Read };

        let result = engine.execute(&target, &request, &mut buffer);
        assert!(result.outcome.is_success());
        assert!(result.elapsed.as_secs() < 5);
        assert_eq!(engine.interrupted(), 0);
    }
}
