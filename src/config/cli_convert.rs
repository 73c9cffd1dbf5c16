//! CLI to Config conversion utilities

use crate::config::toml::{merge_cli_with_config, parse_toml_file};
use crate::config::{cli, workload, Config};
use crate::error::ConfigError;
use anyhow::Result;
use std::time::Duration;

/// Parse a size string ("512", "4k", "1M", "2G", "1T") to bytes
///
/// Suffixes are binary (k = 1024) and case-insensitive; an optional trailing
/// "b"/"ib" is accepted.
pub fn parse_size(s: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidSize(s.to_string());
    let lower = s.trim().to_lowercase();
    let trimmed = lower
        .strip_suffix("ib")
        .or_else(|| lower.strip_suffix('b'))
        .unwrap_or(&lower);

    let (digits, shift) = match trimmed.chars().last() {
        Some('k') => (&trimmed[..trimmed.len() - 1], 10),
        Some('m') => (&trimmed[..trimmed.len() - 1], 20),
        Some('g') => (&trimmed[..trimmed.len() - 1], 30),
        Some('t') => (&trimmed[..trimmed.len() - 1], 40),
        _ => (trimmed, 0),
    };

    let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
    value.checked_mul(1u64 << shift).ok_or_else(invalid)
}

/// Parse a duration string ("250us", "500ms", "1s", "2m", "1h"); a bare number
/// is seconds
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(s.to_string());
    let lower = s.trim().to_lowercase();

    let (digits, unit_micros): (&str, u64) = if let Some(d) = lower.strip_suffix("us") {
        (d, 1)
    } else if let Some(d) = lower.strip_suffix("ms") {
        (d, 1_000)
    } else if let Some(d) = lower.strip_suffix('s') {
        (d, 1_000_000)
    } else if let Some(d) = lower.strip_suffix('m') {
        (d, 60_000_000)
    } else if let Some(d) = lower.strip_suffix('h') {
        (d, 3_600_000_000)
    } else {
        (lower.as_str(), 1_000_000)
    };

    let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
    value
        .checked_mul(unit_micros)
        .map(Duration::from_micros)
        .ok_or_else(invalid)
}

/// Convert CLI WritePattern to workload WritePattern
pub fn convert_write_pattern(pattern: cli::WritePattern) -> workload::WritePattern {
    match pattern {
        cli::WritePattern::Zeros => workload::WritePattern::Zeros,
        cli::WritePattern::Random => workload::WritePattern::Random,
    }
}

/// Build the run configuration from the command line
///
/// Starts from the TOML file given with `--config` (or the defaults) and
/// applies every flag that was set on top.
pub fn build_config(cli: &cli::Cli) -> Result<Config> {
    let base = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => Config::default(),
    };
    merge_cli_with_config(cli, base)
}
