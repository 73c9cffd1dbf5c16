//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Contents of the write buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WritePattern {
    /// All zero bytes
    Zeros,
    /// Pseudo-random bytes, generated once per worker
    Random,
}

/// magicsmoke - random access disk speed tester
///
/// Reads and/or writes a block device (or a freshly created file) at random
/// offsets and reports throughput and latency. Existing regular files are never
/// overwritten.
#[derive(Parser, Debug, Default)]
#[command(name = "magicsmoke")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Block device, or path of a new file to create
    #[arg(value_name = "PATH")]
    pub target: Option<PathBuf>,

    // === Access Mode ===
    /// Perform reads
    #[arg(short = 'r', long)]
    pub read: bool,

    /// Perform writes
    #[arg(short = 'w', long)]
    pub write: bool,

    /// Percentage of reads when both -r and -w are given (0-100, default 50)
    #[arg(long)]
    pub read_percent: Option<u8>,

    // === Sizes ===
    /// Bytes per read/write (e.g. 512, 4k, 1M; default 4)
    #[arg(short = 'b', long, visible_alias = "rwsize")]
    pub operation_size: Option<String>,

    /// Size of a new file in filesystem blocks (default 10)
    #[arg(short = 's', long)]
    pub size: Option<u64>,

    /// Size of a new file in bytes, e.g. 1G (overrides --size)
    #[arg(short = 'z', long, visible_alias = "rawsize")]
    pub raw_size: Option<String>,

    /// Preallocate a new file instead of creating it sparse
    #[arg(long)]
    pub preallocate: bool,

    // === Run Control ===
    /// Number of operations to perform (default: until interrupted)
    #[arg(short = 'a', long)]
    pub actions: Option<u64>,

    /// Seed for the offset generator (default: derived from the clock)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of worker threads
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Abort after this many consecutive failures (0 disables, default 10)
    #[arg(long)]
    pub fail_fast: Option<u64>,

    /// Align offsets to the operation size instead of the device block size
    #[arg(long)]
    pub align_to_op_size: bool,

    // === Durability ===
    /// fdatasync after every N writes per worker
    #[arg(long, value_name = "N")]
    pub flush_every: Option<u64>,

    /// fdatasync once at the end of the run (included in the elapsed time)
    #[arg(long)]
    pub flush_at_end: bool,

    /// Use direct IO (O_DIRECT), bypassing the page cache
    #[arg(long)]
    pub direct: bool,

    /// Write buffer contents
    #[arg(long, value_enum)]
    pub write_pattern: Option<WritePattern>,

    // === Output ===
    /// Log every operation and periodic progress
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Interval between progress updates in verbose mode (e.g. 1s, 500ms)
    #[arg(long)]
    pub progress_interval: Option<String>,

    /// Write the final report as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub json_output: Option<PathBuf>,

    // === Configuration ===
    /// Load settings from a TOML file (command-line flags take precedence)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Validate and print the configuration, then exit without touching the target
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_short_flags() {
        let cli = Cli::try_parse_from([
            "magicsmoke", "-r", "-w", "-b", "4k", "-s", "20", "-a", "1000", "-v", "-t", "4", "/dev/sdb",
        ])
        .unwrap();

        assert!(cli.read);
        assert!(cli.write);
        assert_eq!(cli.operation_size.as_deref(), Some("4k"));
        assert_eq!(cli.size, Some(20));
        assert_eq!(cli.actions, Some(1000));
        assert!(cli.verbose);
        assert_eq!(cli.threads, Some(4));
        assert_eq!(cli.target, Some(PathBuf::from("/dev/sdb")));
    }

    #[test]
    fn test_legacy_aliases() {
        let cli = Cli::try_parse_from(["magicsmoke", "-w", "--rwsize", "512", "--rawsize", "1M", "new.img"]).unwrap();
        assert_eq!(cli.operation_size.as_deref(), Some("512"));
        assert_eq!(cli.raw_size.as_deref(), Some("1M"));
    }

    #[test]
    fn test_write_pattern_values() {
        let cli = Cli::try_parse_from(["magicsmoke", "-w", "--write-pattern", "zeros", "x"]).unwrap();
        assert_eq!(cli.write_pattern, Some(WritePattern::Zeros));
        assert!(Cli::try_parse_from(["magicsmoke", "--write-pattern", "ones", "x"]).is_err());
    }

    #[test]
    fn test_only_one_target() {
        assert!(Cli::try_parse_from(["magicsmoke", "-r", "/dev/sda", "/dev/sdb"]).is_err());
    }
}
