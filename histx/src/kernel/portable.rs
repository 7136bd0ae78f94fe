//! Portable lane-by-lane rendition of the vectorized kernels
//!
//! Each [`Block`] goes through the same gather, rank, and scatter steps as
//! the AVX-512 code. Slice indexing keeps this path memory safe even when
//! a caller breaks the bin range contract; it panics instead.

use crate::block::Block;
use crate::{Bins, WideBins, BIN_COUNT, LANE_WIDTH};

/// Direct conflict-detection histogram.
pub(crate) fn direct(input: &[u32], bins: &mut Bins) {
    for chunk in input.chunks(LANE_WIDTH) {
        let block = Block::load(chunk);
        let ranks = block.ranks();

        let mut values = [0_u32; LANE_WIDTH];
        for lane in block.lanes() {
            values[lane] = bins[block.bin(lane)].wrapping_add(1 + ranks[lane]);
        }

        // Ascending lane order: the last lane of a conflict group stores
        // the group total over the partial values of earlier lanes.
        for lane in block.lanes() {
            bins[block.bin(lane)] = values[lane];
        }
    }
}

/// Widened histogram, followed by the row reduction.
pub(crate) fn widened(input: &[u32], wide: &mut WideBins) {
    for chunk in input.chunks(LANE_WIDTH) {
        let block = Block::load(chunk);
        for lane in block.lanes() {
            let slot = block.bin(lane) * LANE_WIDTH + lane;
            wide[slot] = wide[slot].wrapping_add(1);
        }
    }
    reduce(wide);
}

/// Sum each bin's row of lane slots into entry `bin`.
///
/// Rows are consumed in ascending order, and row `bin` starts at or after
/// entry `bin`, so no row is overwritten before it is read.
pub(crate) fn reduce(wide: &mut WideBins) {
    for bin in 0..BIN_COUNT {
        let row = bin * LANE_WIDTH;
        wide[bin] = wide[row..row + LANE_WIDTH]
            .iter()
            .fold(0, |sum, &count| sum.wrapping_add(count));
    }
}
