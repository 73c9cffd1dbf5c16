//! Workload definition structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// How many operations a run performs
///
/// In TOML this is `actions = <n>`; leaving it out means "until cancelled".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum RunBound {
    FixedCount(u64),
    #[default]
    UntilCancelled,
}

impl RunBound {
    /// Finite operation limit; an unbounded run maps to `u64::MAX`
    pub fn limit(self) -> u64 {
        match self {
            RunBound::FixedCount(n) => n,
            RunBound::UntilCancelled => u64::MAX,
        }
    }
}

impl From<Option<u64>> for RunBound {
    fn from(actions: Option<u64>) -> Self {
        actions.map(RunBound::FixedCount).unwrap_or(RunBound::UntilCancelled)
    }
}

impl From<RunBound> for Option<u64> {
    fn from(bound: RunBound) -> Self {
        match bound {
            RunBound::FixedCount(n) => Some(n),
            RunBound::UntilCancelled => None,
        }
    }
}

impl fmt::Display for RunBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunBound::FixedCount(n) => write!(f, "{} operations", n),
            RunBound::UntilCancelled => write!(f, "until cancelled"),
        }
    }
}

/// Where the offset generator's seed comes from
///
/// In TOML this is `seed = <n>`; leaving it out draws a seed from the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum SeedPolicy {
    Fixed(u64),
    #[default]
    Entropy,
}

impl SeedPolicy {
    /// The seed to use for this run
    pub fn resolve(self) -> u64 {
        match self {
            SeedPolicy::Fixed(seed) => seed,
            SeedPolicy::Entropy => {
                let nanos = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0);
                // splitmix64 finalizer so consecutive runs get unrelated seeds
                let mut z = nanos ^ (u64::from(std::process::id()) << 32);
                z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
                z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
                z ^ (z >> 31)
            }
        }
    }
}

impl From<Option<u64>> for SeedPolicy {
    fn from(seed: Option<u64>) -> Self {
        seed.map(SeedPolicy::Fixed).unwrap_or(SeedPolicy::Entropy)
    }
}

impl From<SeedPolicy> for Option<u64> {
    fn from(policy: SeedPolicy) -> Self {
        match policy {
            SeedPolicy::Fixed(seed) => Some(seed),
            SeedPolicy::Entropy => None,
        }
    }
}

impl fmt::Display for SeedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedPolicy::Fixed(seed) => write!(f, "{}", seed),
            SeedPolicy::Entropy => write!(f, "entropy"),
        }
    }
}

/// Granularity generated offsets are multiples of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetAlignment {
    /// The target's own alignment (logical block size for devices, 1 for files)
    #[default]
    Device,

    /// Multiples of the operation size
    OperationSize,
}

impl OffsetAlignment {
    pub fn granularity(self, operation_size: u64, device_alignment: u64) -> u64 {
        match self {
            OffsetAlignment::Device => device_alignment.max(1),
            OffsetAlignment::OperationSize => operation_size.max(1),
        }
    }
}

impl fmt::Display for OffsetAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetAlignment::Device => write!(f, "device"),
            OffsetAlignment::OperationSize => write!(f, "operation-size"),
        }
    }
}

/// When written data is forced to stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushPolicy {
    /// fdatasync after every N writes of a worker (0 or unset disables)
    pub every_writes: Option<u64>,

    /// fdatasync once after the last operation, inside the measured window
    pub at_end: bool,
}

impl FlushPolicy {
    /// Whether a worker that has completed `writes` writes should flush now
    pub fn due(&self, writes: u64) -> bool {
        match self.every_writes {
            Some(every) if every > 0 => writes > 0 && writes % every == 0,
            _ => false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.at_end || matches!(self.every_writes, Some(n) if n > 0)
    }
}

impl fmt::Display for FlushPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.every_writes.filter(|&n| n > 0), self.at_end) {
            (None, false) => write!(f, "none"),
            (Some(n), false) => write!(f, "every {} writes", n),
            (None, true) => write!(f, "at end"),
            (Some(n), true) => write!(f, "every {} writes and at end", n),
        }
    }
}

/// Contents of the write buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePattern {
    Zeros,
    #[default]
    Random,
}

impl fmt::Display for WritePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePattern::Zeros => write!(f, "zeros"),
            WritePattern::Random => write!(f, "random"),
        }
    }
}
