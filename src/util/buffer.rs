//! Aligned IO buffers
//!
//! O_DIRECT requires the user buffer to be aligned to the device's logical block
//! size. Each worker allocates one [`AlignedBuffer`] up front and reuses it for
//! every operation, so the hot loop never allocates.

use anyhow::Context;
use rand::RngCore;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// Heap buffer with a guaranteed start alignment
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocate a zeroed buffer of `size` bytes
    ///
    /// Alignments that are not a power of two are rounded up to the next one.
    pub fn new(size: usize, alignment: usize) -> crate::Result<Self> {
        if size == 0 {
            anyhow::bail!("buffer size must be greater than 0");
        }
        let alignment = alignment.max(1).next_power_of_two();
        let layout = Layout::from_size_align(size, alignment)
            .with_context(|| format!("invalid buffer layout: size={} alignment={}", size, alignment))?;

        // SAFETY: layout has a non-zero size
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)
            .with_context(|| format!("failed to allocate {} byte buffer", size))?;

        Ok(Self { ptr, layout })
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for layout.size() initialized bytes while self lives
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusive access
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    pub fn is_aligned(&self) -> bool {
        (self.ptr.as_ptr() as usize) % self.layout.align() == 0
    }

    pub fn fill_zeros(&mut self) {
        self.as_mut_slice().fill(0);
    }

    /// Fill with pseudo-random bytes so compressing or deduplicating devices
    /// cannot shortcut writes
    pub fn fill_random<R: RngCore>(&mut self, rng: &mut R) {
        rng.fill_bytes(self.as_mut_slice());
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated with exactly this layout
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// The buffer owns its allocation exclusively
unsafe impl Send for AlignedBuffer {}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len())
            .field("alignment", &self.alignment())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_aligned_buffer_alignment() {
        for alignment in [1, 512, 4096] {
            let buffer = AlignedBuffer::new(8192, alignment).unwrap();
            assert_eq!(buffer.len(), 8192);
            assert_eq!(buffer.alignment(), alignment);
            assert!(buffer.is_aligned());
        }
    }

    #[test]
    fn test_alignment_rounded_to_power_of_two() {
        let buffer = AlignedBuffer::new(100, 48).unwrap();
        assert_eq!(buffer.alignment(), 64);
        assert!(buffer.is_aligned());
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(AlignedBuffer::new(0, 512).is_err());
    }

    #[test]
    fn test_new_buffer_is_zeroed() {
        let buffer = AlignedBuffer::new(1024, 512).unwrap();
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fill_random_then_zeros() {
        let mut buffer = AlignedBuffer::new(4096, 512).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        buffer.fill_random(&mut rng);
        assert!(buffer.as_slice().iter().any(|&b| b != 0));

        buffer.fill_zeros();
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fill_random_deterministic() {
        let mut a = AlignedBuffer::new(256, 1).unwrap();
        let mut b = AlignedBuffer::new(256, 1).unwrap();
        a.fill_random(&mut Xoshiro256PlusPlus::seed_from_u64(9));
        b.fill_random(&mut Xoshiro256PlusPlus::seed_from_u64(9));
        assert_eq!(a.as_slice(), b.as_slice());
    }
}
