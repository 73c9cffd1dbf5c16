//! TOML configuration file parsing

use super::*;
use crate::config::cli::Cli;
use crate::config::cli_convert::{convert_write_pattern, parse_duration, parse_size};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents).context("Failed to parse TOML configuration")?;
    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
///
/// Switches can only turn things on: `-r` enables reads even if the file
/// does not, but leaving `-r` out never disables reads the file enabled.
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // Target
    if let Some(ref path) = cli.target {
        config.target.path = Some(path.clone());
    }
    if let Some(blocks) = cli.size {
        config.target.size_blocks = blocks;
    }
    if let Some(ref raw) = cli.raw_size {
        config.target.raw_size = Some(parse_size(raw)?);
    }
    if cli.preallocate {
        config.target.preallocate = true;
    }

    // Workload
    if cli.read {
        config.workload.read = true;
    }
    if cli.write {
        config.workload.write = true;
    }
    if let Some(pct) = cli.read_percent {
        config.workload.read_percent = pct;
    }
    if let Some(ref size) = cli.operation_size {
        config.workload.operation_size = Some(parse_size(size)?);
    }
    if let Some(actions) = cli.actions {
        config.workload.actions = RunBound::FixedCount(actions);
    }
    if let Some(seed) = cli.seed {
        config.workload.seed = SeedPolicy::Fixed(seed);
    }
    if cli.align_to_op_size {
        config.workload.alignment = OffsetAlignment::OperationSize;
    }
    if let Some(every) = cli.flush_every {
        config.workload.flush.every_writes = Some(every);
    }
    if cli.flush_at_end {
        config.workload.flush.at_end = true;
    }
    if let Some(pattern) = cli.write_pattern {
        config.workload.write_pattern = convert_write_pattern(pattern);
    }
    if cli.direct {
        config.workload.direct = true;
    }

    // Workers
    if let Some(threads) = cli.threads {
        config.workers.threads = threads;
    }

    // Runtime
    if let Some(threshold) = cli.fail_fast {
        config.runtime.fail_fast = threshold;
    }
    if cli.dry_run {
        config.runtime.dry_run = true;
    }

    // Output
    if cli.verbose {
        config.output.verbose = true;
    }
    if let Some(ref interval) = cli.progress_interval {
        let interval = parse_duration(interval)?;
        config.output.progress_interval_ms = interval.as_millis().min(u64::MAX as u128) as u64;
    }
    if let Some(ref path) = cli.json_output {
        config.output.json_output = Some(path.clone());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_full_toml() {
        let config = parse_toml_string(
            r#"
            [target]
            path = "/dev/nvme0n1"
            size_blocks = 32
            preallocate = true

            [workload]
            read = true
            write = true
            read_percent = 70
            operation_size = 4096
            actions = 100000
            seed = 42
            alignment = "operation_size"
            write_pattern = "zeros"
            direct = true

            [workload.flush]
            every_writes = 64
            at_end = true

            [workers]
            threads = 8

            [runtime]
            fail_fast = 0

            [output]
            verbose = true
            progress_interval_ms = 250
            json_output = "report.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.target.path, Some(PathBuf::from("/dev/nvme0n1")));
        assert_eq!(config.target.size_blocks, 32);
        assert!(config.target.preallocate);
        assert_eq!(config.workload.access_mode(), Some(AccessMode::ReadWrite));
        assert_eq!(config.workload.read_percent, 70);
        assert_eq!(config.workload.operation_size(), 4096);
        assert_eq!(config.workload.actions, RunBound::FixedCount(100000));
        assert_eq!(config.workload.seed, SeedPolicy::Fixed(42));
        assert_eq!(config.workload.alignment, OffsetAlignment::OperationSize);
        assert_eq!(config.workload.write_pattern, WritePattern::Zeros);
        assert_eq!(config.workload.flush, FlushPolicy { every_writes: Some(64), at_end: true });
        assert!(config.workload.direct);
        assert_eq!(config.workers.threads, 8);
        assert_eq!(config.runtime.fail_fast, 0);
        assert!(config.output.verbose);
        assert_eq!(config.output.progress_interval_ms, 250);
        assert_eq!(config.output.json_output, Some(PathBuf::from("report.json")));
    }

    #[test]
    fn test_parse_empty_toml_uses_defaults() {
        let config = parse_toml_string("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(parse_toml_string("[workload]\nread_percent = \"lots\"").is_err());
        assert!(parse_toml_string("[workload]\nalignment = \"sideways\"").is_err());
    }

    #[test]
    fn test_merge_precedence() {
        let file = parse_toml_string(
            "[workload]\nread = true\nread_percent = 90\noperation_size = 512\n[runtime]\nfail_fast = 3\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "magicsmoke", "--read-percent", "20", "--fail-fast", "0", "-z", "1M", "--progress-interval", "500ms", "disk.img",
        ])
        .unwrap();
        let merged = merge_cli_with_config(&cli, file).unwrap();

        assert_eq!(merged.workload.read_percent, 20);
        assert_eq!(merged.runtime.fail_fast, 0);
        assert_eq!(merged.target.raw_size, Some(1 << 20));
        assert_eq!(merged.output.progress_interval_ms, 500);
        // Untouched by the command line
        assert!(merged.workload.read);
        assert_eq!(merged.workload.operation_size(), 512);
    }

    #[test]
    fn test_merge_rejects_bad_size() {
        let cli = Cli::try_parse_from(["magicsmoke", "-r", "-b", "lots", "x"]).unwrap();
        let err = merge_cli_with_config(&cli, Config::default()).unwrap_err();
        assert_eq!(err.downcast_ref::<ConfigError>(), Some(&ConfigError::InvalidSize("lots".into())));
    }
}
