#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
#![doc = include_str!("../README.md")]
#![allow(renamed_and_removed_lints)]
#![allow(unknown_lints)]
#![warn(missing_docs)]
#![warn(noop_method_call)]
#![warn(unreachable_pub)]
#![warn(clippy::all)]
#![deny(clippy::cargo_common_metadata)]
#![deny(clippy::cast_lossless)]
#![deny(clippy::checked_conversions)]
#![warn(clippy::cognitive_complexity)]
#![deny(clippy::debug_assert_with_mut_call)]
#![deny(clippy::exhaustive_enums)]
#![deny(clippy::exhaustive_structs)]
#![deny(clippy::expl_impl_clone_on_copy)]
#![deny(clippy::fallible_impl_from)]
#![deny(clippy::implicit_clone)]
#![deny(clippy::large_stack_arrays)]
#![warn(clippy::manual_ok_or)]
#![deny(clippy::missing_docs_in_private_items)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::option_option)]
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![deny(clippy::ref_option_ref)]
#![warn(clippy::semicolon_if_nothing_returned)]
#![warn(clippy::trait_duplication_in_bounds)]
#![warn(clippy::unseparated_literal_suffix)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::mod_module_files)]
#![allow(clippy::let_unit_value)] // This can reasonably be done for explicitness
#![allow(clippy::uninlined_format_args)]

mod block;
mod err;
mod kernel;
mod reference;
mod scratch;

use crate::kernel::{Accelerated, Architecture};
use log::{debug, warn};
use std::sync::OnceLock;

pub use crate::err::{Error, KernelError};
pub use crate::scratch::WideScratch;

/// Number of bits in a bin index
pub const BITS: u32 = 8;

/// Number of bins in every histogram
pub const BIN_COUNT: usize = 1 << BITS;

/// Number of 32-bit lanes processed per vector step
pub const LANE_WIDTH: usize = 16;

/// Required length of the widened output buffer
pub const WIDE_LEN: usize = BIN_COUNT * LANE_WIDTH;

/// Environment variable read once by [`Histogram::global()`]
///
/// Accepts the [`RuntimeOption`] names `portable`, `accelerated` and `try`.
pub const RUNTIME_ENV: &str = "HISTX_RUNTIME";

/// One counter per bin
pub type Bins = [u32; BIN_COUNT];

/// Widened scratch area, one row of lane slots per bin
pub(crate) type WideBins = [u32; WIDE_LEN];

/// Option for selecting a histogram kernel
#[derive(
    Default,
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
#[non_exhaustive]
pub enum RuntimeOption {
    /// Use the portable kernel without probing the CPU.
    #[strum(serialize = "portable")]
    PortableOnly,
    /// Use the accelerated kernel only, and fail if it can't run here.
    #[strum(serialize = "accelerated")]
    AcceleratedOnly,
    /// Use the accelerated kernel when the CPU supports it, otherwise
    /// fall back to the portable one.
    /// (This is the default)
    #[default]
    #[strum(serialize = "try")]
    TryAccelerated,
}

/// Effective kernel for a constructed [`Histogram`]
#[derive(Debug, Copy, Clone, Eq, PartialEq, strum::Display, strum::IntoStaticStr)]
#[non_exhaustive]
pub enum Runtime {
    /// Lane emulation in plain Rust.
    #[strum(serialize = "portable")]
    Portable,
    /// AVX-512 with conflict detection (`avx512f` + `avx512cd`).
    #[strum(serialize = "avx512")]
    Avx512,
}

/// Kernel selected when a [`Histogram`] was built
#[derive(Debug, Copy, Clone)]
enum RuntimeKernel {
    /// Run the portable kernel.
    Portable,
    /// Run the accelerated kernel, holding proof that the CPU supports it.
    Accelerated(Accelerated),
}

/// Histogram engine with its kernel chosen once, up front
///
/// Building a [`Histogram`] probes the CPU; every later call goes straight
/// to the selected kernel. Instances are small and [`Copy`], and carry no
/// state between calls.
#[derive(Debug, Copy, Clone)]
pub struct Histogram {
    /// The kernel used by every call on this instance
    kernel: RuntimeKernel,
}

impl Histogram {
    /// Build a histogram engine with the default [`RuntimeOption`].
    pub fn new() -> Self {
        HistogramBuilder::new().build().unwrap_or(Self::PORTABLE)
    }

    /// Portable engine, always available
    const PORTABLE: Self = Self {
        kernel: RuntimeKernel::Portable,
    };

    /// Process-wide engine used by the free functions.
    ///
    /// Created on first use. Its [`RuntimeOption`] comes from the
    /// [`RUNTIME_ENV`] environment variable when set, otherwise the default.
    pub fn global() -> &'static Self {
        /// Lazily built shared engine
        static GLOBAL: OnceLock<Histogram> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let option = runtime_option_from_env();
            HistogramBuilder::new()
                .runtime(option)
                .build()
                .unwrap_or_else(|e| {
                    warn!(
                        "{}={} can't be honored ({}), using portable kernel",
                        RUNTIME_ENV, option, e
                    );
                    Self::PORTABLE
                })
        })
    }

    /// Check which kernel is in effect.
    pub fn runtime(&self) -> Runtime {
        match self.kernel {
            RuntimeKernel::Portable => Runtime::Portable,
            RuntimeKernel::Accelerated(_) => Runtime::Avx512,
        }
    }

    /// Direct conflict-detection histogram.
    ///
    /// `output` must be zeroed; afterwards `output[i]` is the number of
    /// input values equal to `i`. The input may have any length. Returns
    /// [`Error::BinOutOfRange`] without touching `output` if a value is not
    /// below [`BIN_COUNT`].
    pub fn direct(&self, input: &[u32], output: &mut Bins) -> Result<(), Error> {
        check_bins(input)?;
        // SAFETY: every value was just checked.
        unsafe { self.direct_unchecked(input, output) };
        Ok(())
    }

    /// [`Self::direct()`] without the input range check.
    ///
    /// # Safety
    ///
    /// Every input value must be less than [`BIN_COUNT`]. The accelerated
    /// kernel scatters to unchecked addresses.
    pub unsafe fn direct_unchecked(&self, input: &[u32], output: &mut Bins) {
        debug_assert!(check_bins(input).is_ok());
        match &self.kernel {
            RuntimeKernel::Portable => kernel::portable::direct(input, output),
            // SAFETY: the caller guarantees the bin range.
            RuntimeKernel::Accelerated(accel) => unsafe { accel.direct(input, output) },
        }
    }

    /// Widened histogram with a final reduction pass.
    ///
    /// `output` must be zeroed and hold exactly [`WIDE_LEN`] counters,
    /// otherwise [`Error::WideOutputSize`] is returned before anything is
    /// read or written. On success the first [`BIN_COUNT`] entries hold
    /// the counts; the rest are stale partial sums.
    pub fn widened(&self, input: &[u32], output: &mut [u32]) -> Result<(), Error> {
        let wide = wide_bins(output)?;
        check_bins(input)?;
        // SAFETY: every value was just checked.
        unsafe { self.run_widened(input, wide) };
        Ok(())
    }

    /// [`Self::widened()`] without the input range check.
    ///
    /// The output length is still checked.
    ///
    /// # Safety
    ///
    /// Every input value must be less than [`BIN_COUNT`].
    pub unsafe fn widened_unchecked(&self, input: &[u32], output: &mut [u32]) -> Result<(), Error> {
        let wide = wide_bins(output)?;
        debug_assert!(check_bins(input).is_ok());
        // SAFETY: the caller guarantees the bin range.
        unsafe { self.run_widened(input, wide) };
        Ok(())
    }

    /// Count `input` into a fresh bin array with the direct kernel.
    pub fn count(&self, input: &[u32]) -> Result<Bins, Error> {
        let mut bins = [0; BIN_COUNT];
        self.direct(input, &mut bins)?;
        Ok(bins)
    }

    /// Scalar reference histogram, independent of the selected kernel.
    ///
    /// Same contract as [`histogram_reference()`].
    pub fn reference(&self, input: &[u32], output: &mut Bins) {
        reference::histogram(input, output);
    }

    /// Dispatch a size-checked widened call to the selected kernel.
    ///
    /// # Safety
    ///
    /// Every input value must be less than [`BIN_COUNT`].
    unsafe fn run_widened(&self, input: &[u32], wide: &mut WideBins) {
        match &self.kernel {
            RuntimeKernel::Portable => kernel::portable::widened(input, wide),
            // SAFETY: forwarded from the caller.
            RuntimeKernel::Accelerated(accel) => unsafe { accel.widened(input, wide) },
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating [`Histogram`] instances with custom settings
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct HistogramBuilder {
    /// Current runtime() setting for this builder
    runtime: RuntimeOption,
}

impl HistogramBuilder {
    /// Create a new [`HistogramBuilder`] with default settings.
    ///
    /// Immediately calling [`Self::build()`] is equivalent to
    /// [`Histogram::new()`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Select a new [`RuntimeOption`].
    pub fn runtime(&mut self, runtime: RuntimeOption) -> &mut Self {
        self.runtime = runtime;
        self
    }

    /// Build a [`Histogram`] with the selected options.
    ///
    /// Only [`RuntimeOption::AcceleratedOnly`] can fail, with
    /// [`Error::Kernel`].
    pub fn build(&self) -> Result<Histogram, Error> {
        let kernel = match self.runtime {
            RuntimeOption::PortableOnly => RuntimeKernel::Portable,
            RuntimeOption::AcceleratedOnly => RuntimeKernel::Accelerated(Accelerated::detect()?),
            RuntimeOption::TryAccelerated => match Accelerated::detect() {
                Ok(accel) => RuntimeKernel::Accelerated(accel),
                Err(e) => {
                    debug!("accelerated histogram kernel unavailable: {}", e);
                    RuntimeKernel::Portable
                }
            },
        };
        let histogram = Histogram { kernel };
        debug!("histogram kernel selected: {}", histogram.runtime());
        Ok(histogram)
    }
}

/// Direct conflict-detection histogram, using [`Histogram::global()`].
///
/// See [`Histogram::direct()`].
pub fn histogram_direct(input: &[u32], output: &mut Bins) -> Result<(), Error> {
    Histogram::global().direct(input, output)
}

/// Widened histogram with reduction, using [`Histogram::global()`].
///
/// See [`Histogram::widened()`].
pub fn histogram_widened(input: &[u32], output: &mut [u32]) -> Result<(), Error> {
    Histogram::global().widened(input, output)
}

/// Scalar reference histogram.
///
/// Adds one to `output[v]` for every input value `v`; `output` should start
/// zeroed. Accepts any input length.
///
/// # Panics
///
/// If a value is not below [`BIN_COUNT`].
pub fn histogram_reference(input: &[u32], output: &mut Bins) {
    reference::histogram(input, output);
}

/// Reject the first input value that is not a bin index.
fn check_bins(input: &[u32]) -> Result<(), Error> {
    match input.iter().position(|&value| value as usize >= BIN_COUNT) {
        Some(position) => Err(Error::BinOutOfRange {
            position,
            value: input[position],
        }),
        None => Ok(()),
    }
}

/// View a caller buffer as the widened scratch area, if the size is exact.
fn wide_bins(output: &mut [u32]) -> Result<&mut WideBins, Error> {
    let actual = output.len();
    output.try_into().map_err(|_| Error::WideOutputSize {
        expected: WIDE_LEN,
        actual,
    })
}

/// Read [`RUNTIME_ENV`], ignoring values that don't parse.
fn runtime_option_from_env() -> RuntimeOption {
    match std::env::var(RUNTIME_ENV) {
        Ok(value) => parse_runtime_option(&value),
        Err(_) => RuntimeOption::default(),
    }
}

/// Parse a [`RuntimeOption`] name, using the default for anything else.
fn parse_runtime_option(value: &str) -> RuntimeOption {
    value.parse().unwrap_or_else(|_| {
        warn!("ignoring unrecognized {}={:?}", RUNTIME_ENV, value);
        RuntimeOption::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn constants() {
        assert_eq!(BIN_COUNT, 256);
        assert_eq!(WIDE_LEN, 4096);
    }

    #[test]
    fn runtime_option_names() {
        assert_eq!("portable".parse::<RuntimeOption>().ok(), Some(RuntimeOption::PortableOnly));
        assert_eq!(
            "Accelerated".parse::<RuntimeOption>().ok(),
            Some(RuntimeOption::AcceleratedOnly)
        );
        assert_eq!("try".parse::<RuntimeOption>().ok(), Some(RuntimeOption::TryAccelerated));
        assert!("avx9000".parse::<RuntimeOption>().is_err());
        for option in RuntimeOption::iter() {
            assert_eq!(option.to_string().parse::<RuntimeOption>().ok(), Some(option));
        }
        assert_eq!(Runtime::Avx512.to_string(), "avx512");
    }

    #[test]
    fn portable_is_always_available() {
        let histogram = HistogramBuilder::new()
            .runtime(RuntimeOption::PortableOnly)
            .build()
            .expect("portable build");
        assert_eq!(histogram.runtime(), Runtime::Portable);
    }

    #[test]
    fn try_accelerated_matches_detection() {
        let expected = match Accelerated::detect() {
            Ok(_) => Runtime::Avx512,
            Err(_) => Runtime::Portable,
        };
        assert_eq!(Histogram::new().runtime(), expected);
    }

    #[test]
    fn accelerated_only_reports_kernel_error() {
        let result = HistogramBuilder::new()
            .runtime(RuntimeOption::AcceleratedOnly)
            .build();
        match Accelerated::detect() {
            Ok(_) => assert_eq!(result.expect("detected").runtime(), Runtime::Avx512),
            Err(_) => assert!(matches!(result, Err(Error::Kernel(_)))),
        }
    }

    #[test]
    fn wide_size_checked_before_range() {
        let mut short = vec![7_u32; WIDE_LEN - 1];
        let err = Histogram::new()
            .widened(&[BIN_COUNT as u32], &mut short)
            .expect_err("short buffer");
        assert!(matches!(
            err,
            Error::WideOutputSize {
                expected: WIDE_LEN,
                actual
            } if actual == WIDE_LEN - 1
        ));
        assert!(short.iter().all(|&c| c == 7));
    }

    #[test]
    fn out_of_range_reported_with_position() {
        let mut bins = [0_u32; BIN_COUNT];
        let err = Histogram::new()
            .direct(&[1, 2, 300, 4], &mut bins)
            .expect_err("out of range");
        assert!(matches!(
            err,
            Error::BinOutOfRange {
                position: 2,
                value: 300
            }
        ));
        assert!(bins.iter().all(|&c| c == 0));
    }

    #[test]
    fn unrecognized_runtime_names_use_default() {
        assert_eq!(parse_runtime_option("portable"), RuntimeOption::PortableOnly);
        assert_eq!(parse_runtime_option("TRY"), RuntimeOption::TryAccelerated);
        assert_eq!(parse_runtime_option("avx9000"), RuntimeOption::default());
        assert_eq!(parse_runtime_option(""), RuntimeOption::default());

        // No test in this binary touches `Histogram::global()`.
        std::env::set_var(RUNTIME_ENV, "not-a-kernel");
        assert_eq!(runtime_option_from_env(), RuntimeOption::default());
        std::env::remove_var(RUNTIME_ENV);
        assert_eq!(runtime_option_from_env(), RuntimeOption::default());
    }

    #[test]
    fn reference_method_counts_any_length() {
        let histogram = HistogramBuilder::new()
            .runtime(RuntimeOption::PortableOnly)
            .build()
            .expect("portable build");
        let mut bins = [0_u32; BIN_COUNT];
        histogram.reference(&[], &mut bins);
        assert!(bins.iter().all(|&c| c == 0));

        histogram.reference(&[3, 255, 3, 3, 0, 255, 9], &mut bins);
        assert_eq!(bins[3], 3);
        assert_eq!(bins[255], 2);
        assert_eq!(bins[0], 1);
        assert_eq!(bins[9], 1);
        assert_eq!(bins.iter().sum::<u32>(), 7);
    }

    #[test]
    fn count_returns_fresh_bins() {
        let histogram = Histogram::new();
        let bins = histogram.count(&[5; 40]).expect("valid input");
        assert_eq!(bins[5], 40);
        assert_eq!(bins.iter().sum::<u32>(), 40);
    }
}
