//! Configuration validation
//!
//! Two stages: [`validate_config`] checks everything that can be decided from
//! the configuration alone and runs before the target is touched;
//! [`validate_geometry`] checks the workload against the resolved target.

use super::*;
use crate::target::TargetDescriptor;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.target.path.is_none() {
        return Err(ConfigError::MissingTarget);
    }
    validate_workload(&config.workload)?;
    validate_target(&config.target)?;
    validate_workers(&config.workers)?;
    validate_output(&config.output)?;
    Ok(())
}

/// Validate workload configuration
pub fn validate_workload(workload: &WorkloadConfig) -> Result<(), ConfigError> {
    if workload.access_mode().is_none() {
        return Err(ConfigError::NoAccessMode);
    }
    if workload.read_percent > 100 {
        return Err(ConfigError::InvalidReadPercent(workload.read_percent));
    }
    if workload.operation_size() == 0 {
        return Err(ConfigError::ZeroOperationSize);
    }
    if workload.actions == RunBound::FixedCount(0) {
        return Err(ConfigError::ZeroActions);
    }
    Ok(())
}

/// Validate new-file sizing
///
/// Only matters when the target has to be created, but a zero size is a
/// mistake either way.
pub fn validate_target(target: &TargetConfig) -> Result<(), ConfigError> {
    match target.raw_size {
        Some(0) => Err(ConfigError::ZeroCreateSize),
        None if target.size_blocks == 0 => Err(ConfigError::ZeroCreateSize),
        _ => Ok(()),
    }
}

/// Validate worker configuration
pub fn validate_workers(workers: &WorkerConfig) -> Result<(), ConfigError> {
    if workers.threads == 0 {
        return Err(ConfigError::ZeroThreads);
    }
    Ok(())
}

/// Validate output configuration
pub fn validate_output(output: &OutputConfig) -> Result<(), ConfigError> {
    if output.progress_interval_ms == 0 {
        return Err(ConfigError::InvalidDuration("0ms".to_string()));
    }
    Ok(())
}

/// Validate the workload against the resolved target
pub fn validate_geometry(workload: &WorkloadConfig, target: &TargetDescriptor) -> Result<(), ConfigError> {
    let operation_size = workload.operation_size();
    if operation_size == 0 {
        return Err(ConfigError::ZeroOperationSize);
    }
    if operation_size > target.capacity {
        return Err(ConfigError::OperationTooLarge {
            operation_size,
            capacity: target.capacity,
        });
    }
    if target.direct && operation_size % target.alignment.max(1) != 0 {
        return Err(ConfigError::MisalignedDirectIo {
            operation_size,
            alignment: target.alignment,
        });
    }
    Ok(())
}

/// Non-fatal configuration concerns worth telling the user about
pub fn warnings(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.workload.operation_size.is_none() {
        warnings.push(format!(
            "no operation size given; using {} bytes per operation (set -b/--operation-size)",
            DEFAULT_OPERATION_SIZE
        ));
    }

    let cpus = num_cpus::get();
    if config.workers.threads > cpus {
        warnings.push(format!(
            "{} worker threads requested but only {} CPUs available",
            config.workers.threads, cpus
        ));
    }

    if config.workload.access_mode() != Some(AccessMode::ReadWrite) && config.workload.read_percent != 50 {
        warnings.push("read_percent only applies when both reads and writes are enabled".to_string());
    }

    if config.workload.actions == RunBound::UntilCancelled {
        warnings.push("no action count given; running until interrupted (Ctrl-C)".to_string());
    }

    warnings
}
