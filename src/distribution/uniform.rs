//! Uniform random distribution
//!
//! Every slot has equal probability. Uses the xoshiro256++ PRNG, which is fast
//! and statistically sound; this matters because `next_block()` runs once per IO.
//!
//! # Example
//!
//! ```
//! use magicsmoke::distribution::{Distribution, uniform::UniformDistribution};
//!
//! let mut dist = UniformDistribution::with_seed(7);
//! for _ in 0..10 {
//!     assert!(dist.next_block(1024) < 1024);
//! }
//! ```

use super::{worker_stream, Distribution};
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Uniform random distribution
pub struct UniformDistribution {
    rng: Xoshiro256PlusPlus,
}

impl UniformDistribution {
    /// Distribution seeded for reproducible sequences
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    /// Independent stream for one worker of a multi-threaded run
    ///
    /// Worker 0 gets exactly the `with_seed` sequence.
    pub fn for_worker(seed: u64, worker: usize) -> Self {
        Self {
            rng: worker_stream(seed, worker),
        }
    }
}

impl Distribution for UniformDistribution {
    #[inline(always)]
    fn next_block(&mut self, num_blocks: u64) -> u64 {
        if num_blocks <= 1 {
            return 0;
        }
        self.rng.gen_range(0..num_blocks)
    }
}
