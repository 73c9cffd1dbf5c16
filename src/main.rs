//! magicsmoke CLI entry point

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use magicsmoke::config::cli::Cli;
use magicsmoke::config::{cli_convert, validator, Config};
use magicsmoke::coordinator::{CancelToken, Completion, Coordinator, RunReport};
use magicsmoke::error::{exit_code, ConfigError, RunAborted, EXIT_CONFIG, EXIT_SUCCESS};
use magicsmoke::output::{json, text};
use magicsmoke::stats::live::LogObserver;
use magicsmoke::target::resolver::resolve;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Exit status 2 is reserved for target failures, so clap's own usage
    // errors are reported as configuration errors instead
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::from(EXIT_SUCCESS),
                _ => ExitCode::from(EXIT_CONFIG),
            };
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli_convert::build_config(cli)?;
    init_logging(config.output.verbose);

    validator::validate_config(&config).context("Configuration validation failed")?;
    for warning in validator::warnings(&config) {
        warn!("{}", warning);
    }

    if config.runtime.dry_run || config.output.verbose {
        text::print_config_summary(&config);
    }
    if config.runtime.dry_run {
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    let report = benchmark(config.clone())?;
    text::print_report(&report);

    if let Some(ref path) = config.output.json_output {
        json::write_json_report(path, &report)?;
        info!(path = %path.display(), "JSON report written");
    }

    match report.completion {
        Completion::Aborted(reason) => Err(RunAborted(reason).into()),
        Completion::Completed | Completion::Cancelled => Ok(()),
    }
}

/// Resolve the target and run the benchmark with Ctrl-C wired to cancellation
fn benchmark(config: Config) -> Result<RunReport> {
    let path = config.target.path.clone().ok_or(ConfigError::MissingTarget)?;
    let target = resolve(&path, &config.resolve_options()?)?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived Ctrl+C; stopping after in-flight operations...");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    Coordinator::new(config, Arc::new(target))
        .with_cancel_token(cancel)
        .with_observer(Arc::new(LogObserver))
        .run()
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` in verbose mode
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
