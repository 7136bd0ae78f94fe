//! Scalar reference histogram
//!
//! One indexed increment per element. This is the oracle the vectorized
//! kernels are tested against, so it stays as plain as possible.

use crate::Bins;

/// Count each input value into `output`.
///
/// `output` is expected to start zeroed. Panics if a value is not a valid
/// bin index.
pub(crate) fn histogram(input: &[u32], output: &mut Bins) {
    for &bin in input {
        output[bin as usize] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BIN_COUNT;

    #[test]
    fn empty_input_leaves_zeroes() {
        let mut bins = [0_u32; BIN_COUNT];
        histogram(&[], &mut bins);
        assert!(bins.iter().all(|&c| c == 0));
    }

    #[test]
    fn counts_each_value() {
        let mut bins = [0_u32; BIN_COUNT];
        histogram(&[1, 255, 1, 0, 1], &mut bins);
        assert_eq!(bins[0], 1);
        assert_eq!(bins[1], 3);
        assert_eq!(bins[255], 1);
        assert_eq!(bins.iter().sum::<u32>(), 5);
    }

    #[test]
    #[should_panic]
    fn out_of_range_panics() {
        let mut bins = [0_u32; BIN_COUNT];
        histogram(&[BIN_COUNT as u32], &mut bins);
    }
}
