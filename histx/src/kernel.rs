//! Vectorized histogram kernels
//!
//! This module gives the rest of the crate one interface to the
//! architecture-specific code, via the [`Accelerated`] handle and the
//! [`Architecture`] trait. When no accelerated kernel is compiled in, the
//! trait is implemented here as a stub whose `detect()` always fails.
//! The [`portable`] kernel runs the same lane algorithm in plain Rust and
//! is always available.

use crate::{Bins, KernelError, WideBins};

pub(crate) mod portable;

#[cfg(all(feature = "accelerated", target_arch = "x86_64"))]
mod x86_64;

/// Proof that the accelerated kernel may run on this CPU
///
/// Only [`Architecture::detect()`] creates one, after checking every
/// instruction set extension the kernel uses.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(
    not(all(feature = "accelerated", target_arch = "x86_64")),
    allow(dead_code)
)]
pub(crate) struct Accelerated(());

/// Stub [`Architecture`], used when the accelerated kernel is disabled
/// or the target architecture has none
#[cfg(not(all(feature = "accelerated", target_arch = "x86_64")))]
impl Architecture for Accelerated {
    fn detect() -> Result<Self, KernelError> {
        Err(KernelError::NotAvailable)
    }

    unsafe fn direct(&self, _input: &[u32], _bins: &mut Bins) {
        unreachable!();
    }

    unsafe fn widened(&self, _input: &[u32], _wide: &mut WideBins) {
        unreachable!();
    }
}

/// Trait that adds architecture-specific kernels to [`Accelerated`]
pub(crate) trait Architecture
where
    Self: Sized,
{
    /// Check the running CPU and return a handle if the kernel can run.
    fn detect() -> Result<Self, KernelError>;

    /// Direct conflict-detection histogram into a zeroed bin array.
    ///
    /// # Safety
    ///
    /// Every input value must be less than [`crate::BIN_COUNT`].
    unsafe fn direct(&self, input: &[u32], bins: &mut Bins);

    /// Widened histogram into a zeroed scratch block, including the final
    /// reduction into the first [`crate::BIN_COUNT`] entries.
    ///
    /// # Safety
    ///
    /// Every input value must be less than [`crate::BIN_COUNT`].
    unsafe fn widened(&self, input: &[u32], wide: &mut WideBins);
}
