//! Fixed-point error types

use thiserror::Error;

use crate::format::QFormat;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FixedPointError {
    #[error("Invalid format Q(N={total_bits}, X={integer_bits}): {reason}")]
    FormatConfiguration {
        total_bits: u32,
        integer_bits: u32,
        reason: &'static str,
    },

    #[error("Raw value {raw} is not representable in {format}")]
    OutOfRange { raw: i128, format: QFormat },

    #[error("Format mismatch: expected {expected}, got {got}")]
    FormatMismatch { expected: QFormat, got: QFormat },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Accumulator needs {required} bits, only {available} available")]
    AccumulatorOverflow { required: u32, available: u32 },
}

pub type Result<T> = std::result::Result<T, FixedPointError>;
