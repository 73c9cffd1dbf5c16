//! Latency histogram
//!
//! Fixed-size histogram with logarithmic buckets: each power-of-two microsecond
//! range is split into four sub-buckets. No allocation after construction and a
//! constant-time bucket calculation, so recording stays cheap inside the
//! collector's lock.

use std::time::Duration;

/// 28 log2 levels * 4 sub-buckets, covering up to 2^28 us (~268 s)
const NUM_BUCKETS: usize = 112;

/// Sub-buckets per log2 level
const BUCKET_FRACTION: usize = 4;

/// Latency histogram with logarithmic buckets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyHistogram {
    buckets: [u64; NUM_BUCKETS],
    samples: u64,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            buckets: [0; NUM_BUCKETS],
            samples: 0,
        }
    }

    /// Record one latency sample
    #[inline(always)]
    pub fn record(&mut self, latency: Duration) {
        self.samples += 1;
        self.buckets[bucket_index(latency)] += 1;
    }

    pub fn len(&self) -> u64 {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// Approximate latency at a percentile (0.0 to 100.0)
    ///
    /// Returns the lower edge of the bucket holding the percentile sample, or
    /// 500ns for the sub-microsecond bucket. Zero when empty.
    pub fn percentile(&self, percentile: f64) -> Duration {
        if self.samples == 0 {
            return Duration::ZERO;
        }

        let rank = ((percentile.clamp(0.0, 100.0) / 100.0) * self.samples as f64).ceil() as u64;
        let rank = rank.max(1);
        let mut cumulative = 0u64;

        for (idx, &count) in self.buckets.iter().enumerate() {
            cumulative += count;
            if cumulative >= rank {
                if idx == 0 {
                    return Duration::from_nanos(500);
                }
                return Duration::from_micros(bucket_idx_to_micros(idx));
            }
        }

        Duration::from_micros(bucket_idx_to_micros(NUM_BUCKETS - 1))
    }

    /// Add another histogram's samples into this one
    pub fn merge(&mut self, other: &LatencyHistogram) {
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *mine += theirs;
        }
        self.samples += other.samples;
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[inline(always)]
fn bucket_index(latency: Duration) -> usize {
    let micros = latency.as_micros().min(u64::MAX as u128) as u64;
    if micros == 0 {
        return 0;
    }

    let log2_val = 63 - micros.leading_zeros() as usize;
    let base = 1u64 << log2_val;
    let sub_bucket = (((micros - base) * BUCKET_FRACTION as u64) / base) as usize;

    (log2_val * BUCKET_FRACTION + sub_bucket).min(NUM_BUCKETS - 1)
}

/// Lower edge of a bucket in microseconds
pub fn bucket_idx_to_micros(idx: usize) -> u64 {
    if idx == 0 {
        return 0;
    }

    let log2_val = idx / BUCKET_FRACTION;
    let sub_bucket = idx % BUCKET_FRACTION;
    let base = 1u64 << log2_val;

    base + (base * sub_bucket as u64) / BUCKET_FRACTION as u64
}
