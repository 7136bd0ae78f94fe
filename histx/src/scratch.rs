//! Caller-owned scratch memory for the widened histogram

use crate::{Bins, BIN_COUNT, WIDE_LEN};
use arrayref::array_ref;
use bytemuck::{Pod, Zeroable};

/// Counter block sized for [`crate::Histogram::widened()`]
///
/// Holds [`WIDE_LEN`] counters laid out as one row of lane slots per bin.
/// Rows are cache line aligned. The buffer is large enough that it should
/// live on the heap, so the only constructor is [`Self::new_boxed()`].
#[derive(Clone, Copy)]
#[repr(C, align(64))]
pub struct WideScratch([u32; WIDE_LEN]);

// SAFETY: a single `u32` array whose size is a multiple of the alignment,
// so there is no padding and every bit pattern is valid.
unsafe impl Zeroable for WideScratch {}
// SAFETY: as above.
unsafe impl Pod for WideScratch {}

impl WideScratch {
    /// Allocate a zeroed scratch block without staging it on the stack.
    pub fn new_boxed() -> Box<Self> {
        bytemuck::zeroed_box()
    }

    /// The whole counter block, as passed to the widened kernel.
    pub fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.0
    }

    /// Reduced counts, valid after a widened histogram has run.
    pub fn counts(&self) -> &Bins {
        array_ref![self.0, 0, BIN_COUNT]
    }

    /// Zero every counter so the block can be reused for another input.
    pub fn clear(&mut self) {
        self.0.fill(0);
    }
}

impl std::fmt::Debug for WideScratch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WideScratch")
            .field("counts", &self.counts())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_zeroed_and_aligned() {
        let scratch = WideScratch::new_boxed();
        assert_eq!(std::mem::align_of_val(&*scratch), 64);
        assert_eq!(std::mem::size_of_val(&*scratch), WIDE_LEN * 4);
        assert!(scratch.0.iter().all(|&c| c == 0));
    }

    #[test]
    fn clear_resets_every_slot() {
        let mut scratch = WideScratch::new_boxed();
        scratch.as_mut_slice().fill(7);
        assert_eq!(scratch.counts()[BIN_COUNT - 1], 7);
        scratch.clear();
        assert!(scratch.as_mut_slice().iter().all(|&c| c == 0));
    }
}
