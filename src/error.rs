//! Error taxonomy
//!
//! magicsmoke propagates errors with `anyhow` like the rest of the crate, but the
//! failures that callers need to tell apart are classified with dedicated types:
//!
//! - [`ConfigError`]: the benchmark never starts (bad sizes, no read/write selected)
//! - [`TargetError`]: the target could not be resolved (missing, not a block device,
//!   access denied)
//! - [`OperationError`]: a single read/write failed; recorded in statistics, the
//!   run continues
//! - [`AbortReason`]: the run was terminated early; a partial report is still produced
//!
//! [`exit_code`] maps an error chain to the process exit status.

use crate::engine::OperationType;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Exit status for a completed or cleanly cancelled run
pub const EXIT_SUCCESS: u8 = 0;

/// Exit status for configuration errors and anything unclassified
pub const EXIT_CONFIG: u8 = 1;

/// Exit status when target resolution fails
pub const EXIT_TARGET: u8 = 2;

/// Exit status when the run aborted fatally
pub const EXIT_ABORTED: u8 = 3;

/// Invalid configuration, detected before the benchmark starts
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("you must specify a (single) file or disk")]
    MissingTarget,

    #[error("you must specify one of read or write (or both)")]
    NoAccessMode,

    #[error("operation size must be greater than 0")]
    ZeroOperationSize,

    #[error("operation size ({operation_size} bytes) exceeds target capacity ({capacity} bytes)")]
    OperationTooLarge { operation_size: u64, capacity: u64 },

    #[error("read_percent must be between 0 and 100, got {0}")]
    InvalidReadPercent(u8),

    #[error("threads must be at least 1")]
    ZeroThreads,

    #[error("actions must be at least 1")]
    ZeroActions,

    #[error("size of a newly created file must be greater than 0")]
    ZeroCreateSize,

    #[error("direct IO requires operation size ({operation_size}) to be a multiple of the logical block size ({alignment})")]
    MisalignedDirectIo { operation_size: u64, alignment: u64 },

    #[error("invalid size '{0}'")]
    InvalidSize(String),

    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
}

/// Target resolution failure
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("{} already exists and is not a block device; refusing to overwrite an existing file", path.display())]
    NotBlockDevice { path: PathBuf },

    #[error("{} appeared while it was being created", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("access denied to {}; you probably need to be root to use a block device", path.display())]
    AccessDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} cannot be created: parent directory does not exist", path.display())]
    NotFound { path: PathBuf },

    #[error("{} has zero capacity", path.display())]
    ZeroCapacity { path: PathBuf },

    #[error("failed to {action} {}", path.display())]
    Io {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single read or write
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationError {
    /// The call completed but moved fewer bytes than requested
    #[error("short transfer: {transferred} of {requested} bytes")]
    ShortTransfer { requested: u64, transferred: u64 },

    /// The call failed at the OS level
    #[error("{message}")]
    Io {
        errno: Option<i32>,
        message: String,
        /// The target is gone (device removed, descriptor invalid)
        fatal: bool,
    },
}

impl OperationError {
    /// Build an IO failure, classifying it with the target's fatal-error rules
    pub fn from_io(err: &std::io::Error) -> Self {
        OperationError::Io {
            errno: err.raw_os_error(),
            message: err.to_string(),
            fatal: crate::target::is_target_lost(err),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, OperationError::Io { fatal: true, .. })
    }
}

/// Why a run terminated before its action count was exhausted
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    #[error("{count} consecutive failures (threshold {threshold}); last: {op_type} at offset {offset} of {}: {last_error}", path.display())]
    ConsecutiveFailures {
        count: u64,
        threshold: u64,
        path: PathBuf,
        op_type: OperationType,
        offset: u64,
        last_error: OperationError,
    },

    #[error("target {} became inaccessible during {op_type} at offset {offset}: {error}", path.display())]
    TargetLost {
        path: PathBuf,
        op_type: OperationType,
        offset: u64,
        error: OperationError,
    },
}

/// Raised by the binary when a run ends with [`AbortReason`]
#[derive(Debug, Error)]
#[error("benchmark aborted: {0}")]
pub struct RunAborted(pub AbortReason);

/// Map an error chain to a process exit status
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return EXIT_CONFIG;
        }
        if cause.downcast_ref::<TargetError>().is_some() {
            return EXIT_TARGET;
        }
        if cause.downcast_ref::<RunAborted>().is_some() {
            return EXIT_ABORTED;
        }
    }
    EXIT_CONFIG
}
