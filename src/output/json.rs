//! JSON output formatting
//!
//! The report is one self-describing document: run parameters, aggregate
//! counters, latency percentiles and how the run ended. Durations and rates
//! carry both a machine value and a human-readable string.

use crate::coordinator::{Completion, RunReport};
use crate::error::AbortReason;
use crate::target::TargetDescriptor;
use crate::util::time::{format_duration, format_throughput};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Duration with both microseconds and human-readable format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonDuration {
    pub micros: u64,
    pub human: String,
}

impl JsonDuration {
    pub fn from_duration(d: Duration) -> Self {
        Self {
            micros: d.as_micros().min(u64::MAX as u128) as u64,
            human: format_duration(d),
        }
    }
}

/// Throughput with bytes/sec and human-readable format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonThroughput {
    pub bytes_per_sec: u64,
    pub human: String,
}

impl JsonThroughput {
    pub fn new(bytes_per_sec: f64) -> Self {
        Self {
            bytes_per_sec: bytes_per_sec as u64,
            human: format_throughput(bytes_per_sec),
        }
    }
}

/// Latency statistics with percentiles
#[derive(Debug, Clone, Serialize)]
pub struct JsonLatency {
    pub min: JsonDuration,
    pub mean: JsonDuration,
    pub max: JsonDuration,
    pub p50: JsonDuration,
    pub p90: JsonDuration,
    pub p95: JsonDuration,
    pub p99: JsonDuration,
    pub p99_9: JsonDuration,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonOperations {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub short_transfers: u64,
    pub io_errors: u64,
    pub reads: u64,
    pub writes: u64,
    pub flushes: u64,
    pub flush_failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonBytes {
    pub total: u64,
    pub read: u64,
    pub written: u64,
}

/// Run parameters as actually used
#[derive(Debug, Clone, Serialize)]
pub struct JsonRunInfo {
    pub started_at: DateTime<Utc>,
    pub operation_size: u64,
    /// `null` for a run bounded only by cancellation
    pub actions: Option<u64>,
    pub seed: u64,
    pub threads: usize,
    pub granularity: u64,
    pub read_percent: u8,
}

/// How the run ended
#[derive(Debug, Clone, Serialize)]
pub struct JsonCompletion {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort: Option<AbortReason>,
}

impl From<&Completion> for JsonCompletion {
    fn from(completion: &Completion) -> Self {
        match completion {
            Completion::Completed => Self { status: "completed", abort: None },
            Completion::Cancelled => Self { status: "cancelled", abort: None },
            Completion::Aborted(reason) => Self {
                status: "aborted",
                abort: Some(reason.clone()),
            },
        }
    }
}

/// Top-level JSON document
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    pub generated_at: DateTime<Utc>,
    pub tool: &'static str,
    pub version: &'static str,
    pub target: TargetDescriptor,
    pub run: JsonRunInfo,
    pub elapsed: JsonDuration,
    pub operations: JsonOperations,
    pub bytes: JsonBytes,
    pub iops: f64,
    pub throughput: JsonThroughput,
    /// Absent when no operation was recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<JsonLatency>,
    pub completion: JsonCompletion,
}

impl JsonReport {
    pub fn from_report(report: &RunReport) -> Self {
        let stats = &report.stats;
        let latency = (stats.operations > 0).then(|| JsonLatency {
            min: JsonDuration::from_duration(stats.min()),
            mean: JsonDuration::from_duration(stats.mean_latency()),
            max: JsonDuration::from_duration(stats.max_latency),
            p50: JsonDuration::from_duration(stats.percentile(50.0)),
            p90: JsonDuration::from_duration(stats.percentile(90.0)),
            p95: JsonDuration::from_duration(stats.percentile(95.0)),
            p99: JsonDuration::from_duration(stats.percentile(99.0)),
            p99_9: JsonDuration::from_duration(stats.percentile(99.9)),
        });

        Self {
            generated_at: Utc::now(),
            tool: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            target: report.target.clone(),
            run: JsonRunInfo {
                started_at: report.started_at,
                operation_size: report.operation_size,
                actions: report.bound.into(),
                seed: report.seed,
                threads: report.threads,
                granularity: report.granularity,
                read_percent: report.read_percent,
            },
            elapsed: JsonDuration::from_duration(report.wall_clock),
            operations: JsonOperations {
                total: stats.operations,
                successes: stats.successes,
                failures: stats.failures,
                short_transfers: stats.short_transfers,
                io_errors: stats.io_errors,
                reads: stats.reads,
                writes: stats.writes,
                flushes: stats.flushes,
                flush_failures: stats.flush_failures,
            },
            bytes: JsonBytes {
                total: stats.bytes,
                read: stats.read_bytes,
                written: stats.write_bytes,
            },
            iops: report.iops(),
            throughput: JsonThroughput::new(report.throughput()),
            latency,
            completion: JsonCompletion::from(&report.completion),
        }
    }
}

/// Serialize the report as pretty-printed JSON into `path`
pub fn write_json_report(path: &Path, report: &RunReport) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create JSON output: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &JsonReport::from_report(report))
        .with_context(|| format!("Failed to write JSON output: {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write JSON output: {}", path.display()))?;
    Ok(())
}
