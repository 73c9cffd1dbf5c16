//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! Every section has defaults, so a TOML file only needs the keys it changes and
//! CLI flags override whatever the file sets.
//!
//! ```toml
//! [target]
//! path = "/dev/sdb"
//!
//! [workload]
//! read = true
//! write = true
//! read_percent = 70
//! operation_size = 4096
//! actions = 100000
//! seed = 42
//!
//! [workers]
//! threads = 4
//! ```

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;
pub mod workload;

use crate::error::ConfigError;
use crate::target::resolver::{CreateSize, ResolveOptions};
use crate::target::AccessMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use workload::*;

/// Operation size used when none is configured
///
/// Tiny, but it is what the tool has always defaulted to.
pub const DEFAULT_OPERATION_SIZE: u64 = 4;

/// Complete run configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Options for opening or creating the target
    pub fn resolve_options(&self) -> Result<ResolveOptions, ConfigError> {
        let access = self.workload.access_mode().ok_or(ConfigError::NoAccessMode)?;
        let create_size = match self.target.raw_size {
            Some(bytes) => CreateSize::Bytes(bytes),
            None => CreateSize::Blocks(self.target.size_blocks),
        };
        Ok(ResolveOptions {
            access,
            create_size,
            preallocate: self.target.preallocate,
            direct: self.workload.direct,
        })
    }
}

/// Target configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Block device or path of a file to create
    pub path: Option<PathBuf>,

    /// Size of a new file in filesystem blocks
    pub size_blocks: u64,

    /// Size of a new file in bytes (overrides `size_blocks`)
    pub raw_size: Option<u64>,

    /// posix_fallocate a new file instead of leaving it sparse
    pub preallocate: bool,
}

fn default_size_blocks() -> u64 {
    10
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            path: None,
            size_blocks: default_size_blocks(),
            raw_size: None,
            preallocate: false,
        }
    }
}

/// What each operation does and how many run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub read: bool,
    pub write: bool,

    /// Share of reads when both read and write are enabled (0-100)
    pub read_percent: u8,

    /// Bytes per operation; unset means [`DEFAULT_OPERATION_SIZE`]
    pub operation_size: Option<u64>,

    pub actions: RunBound,
    pub seed: SeedPolicy,
    pub alignment: OffsetAlignment,
    pub flush: FlushPolicy,
    pub write_pattern: WritePattern,

    /// Open the target with O_DIRECT
    pub direct: bool,
}

fn default_read_percent() -> u8 {
    50
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            read: false,
            write: false,
            read_percent: default_read_percent(),
            operation_size: None,
            actions: RunBound::default(),
            seed: SeedPolicy::default(),
            alignment: OffsetAlignment::default(),
            flush: FlushPolicy::default(),
            write_pattern: WritePattern::default(),
            direct: false,
        }
    }
}

impl WorkloadConfig {
    pub fn access_mode(&self) -> Option<AccessMode> {
        AccessMode::from_flags(self.read, self.write)
    }

    pub fn operation_size(&self) -> u64 {
        self.operation_size.unwrap_or(DEFAULT_OPERATION_SIZE)
    }
}

/// Worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of worker threads issuing operations concurrently
    pub threads: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { threads: 1 }
    }
}

/// Runtime behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Abort after this many consecutive failures (0 disables)
    pub fail_fast: u64,

    /// Validate and print the configuration without running
    pub dry_run: bool,
}

fn default_fail_fast() -> u64 {
    10
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fail_fast: default_fail_fast(),
            dry_run: false,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Log every operation and periodic progress
    pub verbose: bool,

    /// Milliseconds between progress updates in verbose mode
    pub progress_interval_ms: u64,

    /// Write a JSON report to this file
    pub json_output: Option<PathBuf>,
}

fn default_progress_interval_ms() -> u64 {
    1000
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            progress_interval_ms: default_progress_interval_ms(),
            json_output: None,
        }
    }
}

impl OutputConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

// Display trait implementations

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration:")?;
        writeln!(f, "  Target: {}", self.target)?;
        writeln!(f, "  Workload: {}", self.workload)?;
        writeln!(f, "  Workers: {}", self.workers)?;
        writeln!(f, "  Runtime: {}", self.runtime)?;
        writeln!(f, "  Output: {}", self.output)?;
        Ok(())
    }
}

impl fmt::Display for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}", path.display())?,
            None => write!(f, "<none>")?,
        }
        match self.raw_size {
            Some(bytes) => write!(f, " (new file: {} bytes", bytes)?,
            None => write!(f, " (new file: {} blocks", self.size_blocks)?,
        }
        if self.preallocate {
            write!(f, ", preallocated")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for WorkloadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.access_mode() {
            Some(AccessMode::ReadWrite) => write!(
                f,
                "{}% read / {}% write",
                self.read_percent,
                100u8.saturating_sub(self.read_percent)
            )?,
            Some(mode) => write!(f, "{} only", mode)?,
            None => write!(f, "no access mode")?,
        }
        write!(
            f,
            ", operation_size={}, actions={}, seed={}, alignment={}, flush={}, write_pattern={}",
            self.operation_size(),
            self.actions,
            self.seed,
            self.alignment,
            self.flush,
            self.write_pattern
        )?;
        if self.direct {
            write!(f, ", direct")?;
        }
        Ok(())
    }
}

impl fmt::Display for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} thread(s)", self.threads)
    }
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fail_fast == 0 {
            write!(f, "fail_fast=off")?;
        } else {
            write!(f, "fail_fast={}", self.fail_fast)?;
        }
        if self.dry_run {
            write!(f, ", dry_run")?;
        }
        Ok(())
    }
}

impl fmt::Display for OutputConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "verbose={}, progress_interval={}ms", self.verbose, self.progress_interval_ms)?;
        if let Some(ref path) = self.json_output {
            write!(f, ", json={}", path.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.workload.read_percent, 50);
        assert_eq!(config.workload.operation_size(), DEFAULT_OPERATION_SIZE);
        assert_eq!(config.workload.actions, RunBound::UntilCancelled);
        assert_eq!(config.target.size_blocks, 10);
        assert_eq!(config.workers.threads, 1);
        assert_eq!(config.runtime.fail_fast, 10);
        assert_eq!(config.output.progress_interval(), Duration::from_secs(1));
        assert_eq!(config.workload.access_mode(), None);
    }

    #[test]
    fn test_resolve_options() {
        let mut config = Config::default();
        assert_eq!(config.resolve_options(), Err(ConfigError::NoAccessMode));

        config.workload.write = true;
        config.target.preallocate = true;
        let options = config.resolve_options().unwrap();
        assert_eq!(options.access, AccessMode::Write);
        assert_eq!(options.create_size, CreateSize::Blocks(10));
        assert!(options.preallocate);

        config.target.raw_size = Some(1 << 20);
        assert_eq!(config.resolve_options().unwrap().create_size, CreateSize::Bytes(1 << 20));
    }

    #[test]
    fn test_display_summary() {
        let mut config = Config::default();
        config.target.path = Some(PathBuf::from("/dev/sdb"));
        config.workload.read = true;
        config.workload.write = true;
        config.workload.read_percent = 70;

        let summary = config.to_string();
        assert!(summary.contains("/dev/sdb"));
        assert!(summary.contains("70% read / 30% write"));
        assert!(summary.contains("fail_fast=10"));
    }
}
