//! AVX-512 histogram kernels for x86_64
//!
//! Both kernels walk the input in 16-lane blocks. A short final block is
//! loaded with a lane mask, and the same mask gates its gather and
//! scatter, so no memory past the end of the input is read and no
//! counter is touched on behalf of an inactive lane.
//!
//! The direct kernel relies on a property of `vpscatterdd`: writes to
//! overlapping addresses are ordered from the lowest lane to the highest.
//! Each lane stores `gathered + 1 + rank`, so the highest lane of every
//! conflict group has the final word, and it carries the full count.

use crate::block::{leading_lanes, LaneMask, ALL_LANES};
use crate::kernel::{Accelerated, Architecture};
use crate::{Bins, KernelError, WideBins, BIN_COUNT, LANE_WIDTH};
use std::arch::x86_64::{
    __m512i, _mm512_add_epi32, _mm512_and_si512, _mm512_conflict_epi32, _mm512_loadu_si512,
    _mm512_mask_i32gather_epi32, _mm512_mask_i32scatter_epi32, _mm512_maskz_loadu_epi32,
    _mm512_mullo_epi32, _mm512_reduce_add_epi32, _mm512_set1_epi32, _mm512_setr_epi32,
    _mm512_setzero_si512, _mm512_slli_epi32, _mm512_srli_epi32, _mm512_sub_epi32,
};

// One 512-bit register of 32-bit lanes
const _: () = assert!(LANE_WIDTH == 16);

/// Shift turning a bin index into the first slot of its widened row
const ROW_SHIFT: u32 = LANE_WIDTH.trailing_zeros();

/// Byte scale for gather and scatter over `u32` counters
const SCALE: i32 = 4;

impl Architecture for Accelerated {
    fn detect() -> Result<Self, KernelError> {
        if !is_x86_feature_detected!("avx512f") {
            return Err(KernelError::MissingFeature("avx512f"));
        }
        if !is_x86_feature_detected!("avx512cd") {
            return Err(KernelError::MissingFeature("avx512cd"));
        }
        Ok(Accelerated(()))
    }

    unsafe fn direct(&self, input: &[u32], bins: &mut Bins) {
        // SAFETY: `detect` verified avx512f and avx512cd, and the caller
        // guarantees every index lands inside `bins`.
        unsafe { direct(input, bins) }
    }

    unsafe fn widened(&self, input: &[u32], wide: &mut WideBins) {
        // SAFETY: as above; every slot `bin * 16 + lane` lands inside `wide`.
        unsafe {
            widened(input, wide);
            reduce(wide);
        }
    }
}

#[target_feature(enable = "avx512f,avx512cd")]
unsafe fn direct(input: &[u32], bins: &mut Bins) {
    let base = bins.as_mut_ptr();
    let mut blocks = input.chunks_exact(LANE_WIDTH);
    for block in &mut blocks {
        let index = _mm512_loadu_si512(block.as_ptr() as *const _);
        scatter_direct(base, index, ALL_LANES);
    }
    let tail = blocks.remainder();
    if !tail.is_empty() {
        let active = leading_lanes(tail.len());
        let index = _mm512_maskz_loadu_epi32(active, tail.as_ptr() as *const _);
        scatter_direct(base, index, active);
    }
}

/// Gather, add `1 + rank`, and scatter one block of bin indices.
#[inline]
#[target_feature(enable = "avx512f,avx512cd")]
unsafe fn scatter_direct(base: *mut u32, index: __m512i, active: LaneMask) {
    let conflicts = _mm512_and_si512(
        _mm512_conflict_epi32(index),
        _mm512_set1_epi32(i32::from(active)),
    );
    let step = _mm512_add_epi32(popcount_epi32(conflicts), _mm512_set1_epi32(1));
    let current = _mm512_mask_i32gather_epi32::<SCALE>(
        _mm512_setzero_si512(),
        active,
        index,
        base as *const _,
    );
    _mm512_mask_i32scatter_epi32::<SCALE>(
        base as *mut _,
        active,
        index,
        _mm512_add_epi32(current, step),
    );
}

#[target_feature(enable = "avx512f")]
unsafe fn widened(input: &[u32], wide: &mut WideBins) {
    let base = wide.as_mut_ptr();
    let mut blocks = input.chunks_exact(LANE_WIDTH);
    for block in &mut blocks {
        let index = _mm512_loadu_si512(block.as_ptr() as *const _);
        scatter_widened(base, index, ALL_LANES);
    }
    let tail = blocks.remainder();
    if !tail.is_empty() {
        let active = leading_lanes(tail.len());
        let index = _mm512_maskz_loadu_epi32(active, tail.as_ptr() as *const _);
        scatter_widened(base, index, active);
    }
}

/// Add one to slot `bin * 16 + lane` for every active lane.
///
/// Slots are distinct across the lanes of a block, so there is nothing to
/// resolve here; repeat visits from later blocks simply accumulate.
#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn scatter_widened(base: *mut u32, index: __m512i, active: LaneMask) {
    let lane = _mm512_setr_epi32(0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15);
    let slot = _mm512_add_epi32(_mm512_slli_epi32::<ROW_SHIFT>(index), lane);
    let current = _mm512_mask_i32gather_epi32::<SCALE>(
        _mm512_setzero_si512(),
        active,
        slot,
        base as *const _,
    );
    _mm512_mask_i32scatter_epi32::<SCALE>(
        base as *mut _,
        active,
        slot,
        _mm512_add_epi32(current, _mm512_set1_epi32(1)),
    );
}

/// Collapse each bin's row of lane slots into entry `bin`, in place.
#[target_feature(enable = "avx512f")]
unsafe fn reduce(wide: &mut WideBins) {
    for bin in 0..BIN_COUNT {
        let row = _mm512_loadu_si512(wide[bin * LANE_WIDTH..].as_ptr() as *const _);
        wide[bin] = _mm512_reduce_add_epi32(row) as u32;
    }
}

/// Per-lane population count using only AVX-512F.
///
/// `vpopcntd` needs the separate VPOPCNTDQ extension, which is missing on
/// several CPUs that do have conflict detection.
#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn popcount_epi32(v: __m512i) -> __m512i {
    let m1 = _mm512_set1_epi32(0x5555_5555);
    let m2 = _mm512_set1_epi32(0x3333_3333);
    let m4 = _mm512_set1_epi32(0x0f0f_0f0f);
    let v = _mm512_sub_epi32(v, _mm512_and_si512(_mm512_srli_epi32::<1>(v), m1));
    let v = _mm512_add_epi32(
        _mm512_and_si512(v, m2),
        _mm512_and_si512(_mm512_srli_epi32::<2>(v), m2),
    );
    let v = _mm512_and_si512(_mm512_add_epi32(v, _mm512_srli_epi32::<4>(v)), m4);
    _mm512_srli_epi32::<24>(_mm512_mullo_epi32(v, _mm512_set1_epi32(0x0101_0101)))
}
