//! Error types for the `histx` crate

/// Errors reported by the histogram entry points
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The widened variant was given an output buffer of the wrong length.
    ///
    /// The scratch area must hold exactly [`crate::WIDE_LEN`] counters.
    /// This is checked before any memory is touched.
    #[error("widened output holds {actual} counters, expected exactly {expected}")]
    WideOutputSize {
        /// Required length, always [`crate::WIDE_LEN`]
        expected: usize,
        /// Length of the buffer that was supplied
        actual: usize,
    },

    /// An input value does not name one of the [`crate::BIN_COUNT`] bins.
    #[error("input value {value} at position {position} is outside the histogram domain")]
    BinOutOfRange {
        /// Offset of the first offending element
        position: usize,
        /// The offending value
        value: u32,
    },

    /// [`crate::RuntimeOption::AcceleratedOnly`] is in use and the
    /// accelerated kernel can't be selected.
    #[error("accelerated histogram kernel unavailable: {0}")]
    Kernel(#[from] KernelError),
}

/// Reasons the accelerated kernel could not be selected
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KernelError {
    /// This build has no accelerated kernel for the target architecture.
    #[error("no accelerated kernel is compiled into this build")]
    NotAvailable,

    /// The running CPU lacks a required instruction set extension.
    #[error("CPU does not support {0}")]
    MissingFeature(&'static str),
}
