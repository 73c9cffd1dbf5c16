//! magicsmoke - random access disk speed tester
//!
//! magicsmoke hammers a block device (or a freshly created file) with reads and
//! writes at uniformly random offsets and reports throughput and latency.
//! Existing regular files are never touched, so a mistyped path cannot destroy
//! data.
//!
//! # Architecture
//!
//! - **Target resolution** ([`target`]): block devices are opened in place,
//!   missing paths are created as new files, anything else is refused
//! - **Offset generation** ([`distribution`]): seedable, per-worker xoshiro
//!   streams produce aligned offsets in `[0, capacity - operation_size]`
//! - **IO engines** ([`engine`]): positioned synchronous IO, plus a scripted
//!   mock for tests
//! - **Orchestration** ([`coordinator`], [`worker`]): a fixed action budget
//!   shared by one or more workers, with cancellation and fail-fast
//! - **Statistics** ([`stats`]): exact counters and a log-bucketed latency
//!   histogram behind one lock
//! - **Reporting** ([`output`]): text summary and optional JSON report

pub mod config;
pub mod coordinator;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod output;
pub mod stats;
pub mod target;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{CancelToken, Completion, Coordinator, RunReport};
pub use engine::IOEngine;
pub use target::resolver::resolve;
pub use worker::Worker;

/// Result type used throughout magicsmoke
pub type Result<T> = anyhow::Result<T>;
