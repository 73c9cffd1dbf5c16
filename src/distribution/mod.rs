//! Offset generation
//!
//! Operations land at pseudo-random offsets inside the target. The target's
//! addressable range is divided into *slots*: every offset `o` with
//! `0 <= o <= capacity - operation_size` and `o % granularity == 0`. A
//! [`Distribution`] picks a slot index and [`OffsetGenerator`] turns it into a
//! byte offset, so offsets are aligned by construction and no operation ever runs
//! past the end of the target.
//!
//! # Reproducibility
//!
//! Generators are explicit, seedable instances; nothing draws from process-global
//! entropy. With several workers each worker gets its own xoshiro stream, derived
//! from the run seed by jumping ahead `2^128` steps per worker index, so a given
//! seed and worker count always reproduce the same per-worker sequences.
//!
//! # Example
//!
//! ```
//! use magicsmoke::distribution::OffsetGenerator;
//! use magicsmoke::distribution::uniform::UniformDistribution;
//!
//! // 1 KiB target, 64-byte operations, byte granularity
//! let mut offsets = OffsetGenerator::new(1024, 64, 1, UniformDistribution::with_seed(1))?;
//! assert_eq!(offsets.slots(), 961);
//!
//! let offset = offsets.next();
//! assert!(offset <= 1024 - 64);
//! # Ok::<(), magicsmoke::error::ConfigError>(())
//! ```

pub mod uniform;

use crate::error::ConfigError;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use uniform::UniformDistribution;

/// Slot index generator
///
/// Implementations must be `Send`; each worker thread owns its own instance.
pub trait Distribution: Send {
    /// Next slot index in `[0, num_blocks)`
    ///
    /// Returns 0 when `num_blocks` is 0 or 1.
    fn next_block(&mut self, num_blocks: u64) -> u64;
}

/// Generator stream for one worker
///
/// Worker 0 starts at the plain seeded state; worker `n` is `n` jumps ahead.
pub fn worker_stream(seed: u64, worker: usize) -> Xoshiro256PlusPlus {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    for _ in 0..worker {
        rng.jump();
    }
    rng
}

/// Stream for a worker's read/write coin flips
///
/// Long-jumped away from every offset stream so direction choice never
/// correlates with offset choice.
pub fn direction_stream(seed: u64, worker: usize) -> Xoshiro256PlusPlus {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    rng.long_jump();
    for _ in 0..worker {
        rng.jump();
    }
    rng
}

/// Produces aligned in-range byte offsets
pub struct OffsetGenerator<D = UniformDistribution> {
    distribution: D,
    granularity: u64,
    slots: u64,
}

impl<D: Distribution> OffsetGenerator<D> {
    /// Build a generator for the given geometry
    ///
    /// Fails when the operation size is zero or larger than the capacity. A zero
    /// granularity is treated as 1.
    pub fn new(
        capacity: u64,
        operation_size: u64,
        granularity: u64,
        distribution: D,
    ) -> Result<Self, ConfigError> {
        if operation_size == 0 {
            return Err(ConfigError::ZeroOperationSize);
        }
        if operation_size > capacity {
            return Err(ConfigError::OperationTooLarge { operation_size, capacity });
        }

        let granularity = granularity.max(1);
        let slots = (capacity - operation_size) / granularity + 1;
        Ok(Self { distribution, granularity, slots })
    }

    /// Next offset, always in `0..=capacity - operation_size` and a multiple of
    /// the granularity
    #[inline]
    pub fn next(&mut self) -> u64 {
        self.distribution.next_block(self.slots) * self.granularity
    }

    /// Number of distinct offsets this generator can produce
    pub fn slots(&self) -> u64 {
        self.slots
    }

    pub fn granularity(&self) -> u64 {
        self.granularity
    }
}
