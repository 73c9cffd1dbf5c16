//! Human-readable text output

use crate::config::Config;
use crate::coordinator::{Completion, RunReport};
use crate::util::time::{calculate_iops, calculate_throughput, format_bytes, format_duration, format_rate, format_throughput};
use std::fmt::Write;

const RULE: &str = "═══════════════════════════════════════════════════════════";

/// Print the final report to stdout
pub fn print_report(report: &RunReport) {
    print!("{}", render_report(report));
}

/// Print the effective configuration (on `--dry-run`, and at startup when verbose)
pub fn print_config_summary(config: &Config) {
    println!("{}", render_config_summary(config));
}

pub fn render_config_summary(config: &Config) -> String {
    format!("{rule}\n                    CONFIGURATION\n{rule}\n{config}", rule = RULE, config = config)
}

/// Render the final report
///
/// Covers counts, rates, the failure breakdown, latency and completion status.
pub fn render_report(report: &RunReport) -> String {
    let stats = &report.stats;
    let wall = report.wall_clock;
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "                    TEST RESULTS");
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Target:       {} ({}, {}, {} access{})",
        report.target.path.display(),
        report.target.kind,
        format_bytes(report.target.capacity),
        report.target.access,
        if report.target.direct { ", direct" } else { "" }
    );
    let _ = writeln!(
        out,
        "Workload:     {} per operation, {} threads, seed {}",
        format_bytes(report.operation_size),
        report.threads,
        report.seed
    );
    let _ = writeln!(out, "Started:      {}", report.started_at.to_rfc3339());
    let _ = writeln!(out, "Elapsed Time: {:.3}s", wall.as_secs_f64());
    let _ = writeln!(out, "Status:       {}", report.completion);
    let _ = writeln!(out);

    let _ = writeln!(out, "Operations:");
    let _ = writeln!(
        out,
        "  Read:  {} ops ({}) - {} IOPS",
        format_number(stats.reads),
        format_bytes(stats.read_bytes),
        format_rate(calculate_iops(stats.reads, wall))
    );
    let _ = writeln!(
        out,
        "  Write: {} ops ({}) - {} IOPS",
        format_number(stats.writes),
        format_bytes(stats.write_bytes),
        format_rate(calculate_iops(stats.writes, wall))
    );
    let _ = writeln!(
        out,
        "  Total: {} ops ({}) - {} IOPS",
        format_number(stats.operations),
        format_bytes(stats.bytes),
        format_rate(report.iops())
    );
    if stats.failures > 0 {
        let _ = writeln!(
            out,
            "  Failed: {} ({} short transfers, {} IO errors)",
            format_number(stats.failures),
            format_number(stats.short_transfers),
            format_number(stats.io_errors)
        );
    }
    if stats.flushes > 0 {
        let _ = writeln!(out, "  Flushes: {} ({} failed)", stats.flushes, stats.flush_failures);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Throughput:");
    let _ = writeln!(out, "  Read:  {}", format_throughput(calculate_throughput(stats.read_bytes, wall)));
    let _ = writeln!(out, "  Write: {}", format_throughput(calculate_throughput(stats.write_bytes, wall)));
    let _ = writeln!(out, "  Total: {}", format_throughput(report.throughput()));
    let _ = writeln!(out);

    let _ = writeln!(out, "Latency:");
    if stats.operations > 0 {
        let _ = writeln!(out, "  Min:    {}", format_duration(stats.min()));
        let _ = writeln!(out, "  Mean:   {}", format_duration(stats.mean_latency()));
        let _ = writeln!(out, "  Max:    {}", format_duration(stats.max_latency));
        let _ = writeln!(out);
        let _ = writeln!(out, "  Percentiles:");
        for &p in &[50.0, 90.0, 95.0, 99.0, 99.9] {
            let _ = writeln!(out, "    p{:5.2}: {}", p, format_duration(stats.percentile(p)));
        }
    } else {
        let _ = writeln!(out, "  No latency data collected");
    }
    let _ = writeln!(out);

    if let Completion::Aborted(reason) = &report.completion {
        let _ = writeln!(out, "ABORTED: {}", reason);
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "{}", RULE);
    out
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}
