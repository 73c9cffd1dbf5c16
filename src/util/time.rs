//! Rate and duration formatting
//!
//! Helpers shared by the progress log and the final report.

use std::time::Duration;

const BINARY_UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Format a duration in human-readable form
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use magicsmoke::util::time::format_duration;
///
/// assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
/// assert_eq!(format_duration(Duration::from_nanos(1500)), "1.50us");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(5)), "5.00s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    match nanos {
        0..=999 => format!("{}ns", nanos),
        1_000..=999_999 => format!("{:.2}us", nanos as f64 / 1e3),
        1_000_000..=999_999_999 => format!("{:.2}ms", nanos as f64 / 1e6),
        _ => format!("{:.2}s", nanos as f64 / 1e9),
    }
}

/// Format an operation rate with a decimal suffix
///
/// ```
/// use magicsmoke::util::time::format_rate;
///
/// assert_eq!(format_rate(500.0), "500");
/// assert_eq!(format_rate(1500.0), "1.50K");
/// ```
pub fn format_rate(rate: f64) -> String {
    if rate < 1e3 {
        format!("{:.0}", rate)
    } else if rate < 1e6 {
        format!("{:.2}K", rate / 1e3)
    } else if rate < 1e9 {
        format!("{:.2}M", rate / 1e6)
    } else {
        format!("{:.2}G", rate / 1e9)
    }
}

/// Format a byte count with binary units
///
/// ```
/// use magicsmoke::util::time::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(6400), "6.25 KiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BINARY_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, BINARY_UNITS[unit])
    }
}

/// Format a transfer rate in bytes per second
///
/// ```
/// use magicsmoke::util::time::format_throughput;
///
/// assert_eq!(format_throughput(1536.0), "1.50 KiB/s");
/// ```
pub fn format_throughput(bytes_per_sec: f64) -> String {
    let mut value = bytes_per_sec.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < BINARY_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}/s", value, BINARY_UNITS[unit])
}

/// Operations per second; zero for an empty window
pub fn calculate_iops(operations: u64, duration: Duration) -> f64 {
    per_second(operations, duration)
}

/// Bytes per second; zero for an empty window
pub fn calculate_throughput(bytes: u64, duration: Duration) -> f64 {
    per_second(bytes, duration)
}

fn per_second(count: u64, duration: Duration) -> f64 {
    let seconds = duration.as_secs_f64();
    if seconds > 0.0 {
        count as f64 / seconds
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0ns");
        assert_eq!(format_duration(Duration::from_nanos(1500)), "1.50us");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(1_500_000.0), "1.50M");
        assert_eq!(format_rate(1_500_000_000.0), "1.50G");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1024), "1.00 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GiB");
        assert_eq!(format_bytes(u64::MAX), "16777216.00 TiB");
    }

    #[test]
    fn test_format_throughput() {
        assert_eq!(format_throughput(500.0), "500.00 B/s");
        assert_eq!(format_throughput(1536.0 * 1024.0), "1.50 MiB/s");
        assert_eq!(format_throughput(1536.0 * 1024.0 * 1024.0 * 1024.0), "1.50 TiB/s");
    }

    #[test]
    fn test_rates() {
        assert_eq!(calculate_iops(1000, Duration::from_secs(10)), 100.0);
        assert_eq!(calculate_iops(1000, Duration::ZERO), 0.0);
        assert_eq!(calculate_throughput(10 * 1024 * 1024, Duration::from_secs(10)), 1024.0 * 1024.0);
    }
}
