//! fixnet Fixed-Point Algebra
//!
//! Signed two's-complement Q(N, X) values stored in `i64`, with the
//! saturating encode/decode and requantization rules of a hardware MAC
//! pipeline. Accumulation happens in `i128`.

mod error;
mod fixed;
mod format;
mod requantize;
mod vector;

pub use error::{FixedPointError, Result};
pub use fixed::{decode, encode, from_twos_complement, to_twos_complement};
pub use format::{QFormat, MAX_TOTAL_BITS};
pub use requantize::{
    align_right, ceil_log2, requantize, requantize_with_status, required_accumulator_bits,
    Accumulator, Requantized, ACCUMULATOR_BITS,
};
pub use vector::FixedVector;
