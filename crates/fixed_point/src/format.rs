//! Q(N, X) format descriptor

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FixedPointError, Result};

/// Widest format the `i64` storage type can hold
pub const MAX_TOTAL_BITS: u32 = 64;

/// A signed fixed-point format with `total_bits` N and `integer_bits` X
/// (sign included). The remaining F = N - X bits are fractional, so a raw
/// integer `r` stands for `r / 2^F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "FormatSpec", into = "FormatSpec")]
pub struct QFormat {
    total_bits: u32,
    integer_bits: u32,
}

/// Wire shape of a format in `config.json`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct FormatSpec {
    total_bits: u32,
    integer_bits: u32,
}

impl QFormat {
    /// Q8.8, the default activation format
    pub const Q8_8: Self = Self::new_unchecked(16, 8);
    /// Q16.16, the default input and weight format
    pub const Q16_16: Self = Self::new_unchecked(32, 16);
    /// Q32.32, the default bias format
    pub const Q32_32: Self = Self::new_unchecked(64, 32);

    /// Create a format, rejecting X outside [1, N] and N beyond the storage width
    pub fn new(total_bits: u32, integer_bits: u32) -> Result<Self> {
        if total_bits == 0 || total_bits > MAX_TOTAL_BITS {
            return Err(FixedPointError::FormatConfiguration {
                total_bits,
                integer_bits,
                reason: "total bits must be in 1..=64",
            });
        }
        if integer_bits == 0 || integer_bits > total_bits {
            return Err(FixedPointError::FormatConfiguration {
                total_bits,
                integer_bits,
                reason: "integer bits must be in 1..=total bits",
            });
        }
        Ok(Self::new_unchecked(total_bits, integer_bits))
    }

    const fn new_unchecked(total_bits: u32, integer_bits: u32) -> Self {
        Self {
            total_bits,
            integer_bits,
        }
    }

    /// Total bits N
    pub fn total_bits(self) -> u32 {
        self.total_bits
    }

    /// Integer bits X, sign bit included
    pub fn integer_bits(self) -> u32 {
        self.integer_bits
    }

    /// Fractional bits F = N - X
    pub fn frac_bits(self) -> u32 {
        self.total_bits - self.integer_bits
    }

    /// Largest raw value, 2^(N-1) - 1
    pub fn max_raw(self) -> i64 {
        i64::MAX >> (MAX_TOTAL_BITS - self.total_bits)
    }

    /// Smallest raw value, -2^(N-1)
    pub fn min_raw(self) -> i64 {
        i64::MIN >> (MAX_TOTAL_BITS - self.total_bits)
    }

    /// Whether `raw` lies inside the representable range
    pub fn contains(self, raw: i128) -> bool {
        raw >= self.min_raw() as i128 && raw <= self.max_raw() as i128
    }

    /// Clamp a wide value into range
    pub fn saturate(self, value: i128) -> i64 {
        self.saturate_with_status(value).0
    }

    /// Clamp a wide value into range, reporting whether clamping happened
    pub fn saturate_with_status(self, value: i128) -> (i64, bool) {
        let (min, max) = (self.min_raw(), self.max_raw());
        if value > max as i128 {
            (max, true)
        } else if value < min as i128 {
            (min, true)
        } else {
            (value as i64, false)
        }
    }
}

impl TryFrom<FormatSpec> for QFormat {
    type Error = FixedPointError;

    fn try_from(spec: FormatSpec) -> Result<Self> {
        Self::new(spec.total_bits, spec.integer_bits)
    }
}

impl From<QFormat> for FormatSpec {
    fn from(format: QFormat) -> Self {
        Self {
            total_bits: format.total_bits,
            integer_bits: format.integer_bits,
        }
    }
}

impl fmt::Display for QFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}.{}", self.integer_bits, self.frac_bits())
    }
}
