//! Lane blocks and a portable model of the conflict-detection primitive
//!
//! A [`Block`] is one vector's worth of bin indices: up to [`LANE_WIDTH`]
//! values taken from the input, plus a mask of the lanes that hold real
//! data. Only the final block of an input can be partial.
//!
//! [`Block::conflicts()`] follows the `vpconflictd` convention, so the
//! portable kernel and the AVX-512 kernel agree on what a lane's rank is.

use crate::LANE_WIDTH;

/// Bitmask with one bit per lane, lane 0 in the least significant bit
pub(crate) type LaneMask = u16;

/// Mask with every lane active
pub(crate) const ALL_LANES: LaneMask = LaneMask::MAX;

/// Mask selecting the first `len` lanes.
#[inline(always)]
pub(crate) fn leading_lanes(len: usize) -> LaneMask {
    debug_assert!(len <= LANE_WIDTH);
    if len >= LANE_WIDTH {
        ALL_LANES
    } else {
        (1 << len) - 1
    }
}

/// One vector of bin indices, with inactive lanes masked off
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct Block {
    /// Bin index per lane, zero in inactive lanes
    bins: [u32; LANE_WIDTH],
    /// Lanes holding input values
    active: LaneMask,
}

impl Block {
    /// Load up to [`LANE_WIDTH`] input values into a block.
    #[inline(always)]
    pub(crate) fn load(values: &[u32]) -> Self {
        debug_assert!(values.len() <= LANE_WIDTH);
        let mut bins = [0_u32; LANE_WIDTH];
        bins[..values.len()].copy_from_slice(values);
        Self {
            bins,
            active: leading_lanes(values.len()),
        }
    }

    /// Bin index held by a lane.
    #[inline(always)]
    pub(crate) fn bin(&self, lane: usize) -> usize {
        self.bins[lane] as usize
    }

    /// Iterate over active lanes in ascending order.
    #[inline(always)]
    pub(crate) fn lanes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..LANE_WIDTH).filter(move |lane| self.active & (1 << lane) != 0)
    }

    /// Per-lane conflict masks.
    ///
    /// Bit `j` of lane `i` is set when `j < i`, both lanes are active,
    /// and they hold the same bin index.
    pub(crate) fn conflicts(&self) -> [LaneMask; LANE_WIDTH] {
        let mut masks = [0; LANE_WIDTH];
        for lane in self.lanes() {
            for earlier in 0..lane {
                if self.active & (1 << earlier) != 0 && self.bins[earlier] == self.bins[lane] {
                    masks[lane] |= 1 << earlier;
                }
            }
        }
        masks
    }

    /// Number of earlier active lanes sharing each lane's bin.
    #[inline(always)]
    pub(crate) fn ranks(&self) -> [u32; LANE_WIDTH] {
        self.conflicts().map(LaneMask::count_ones)
    }
}
