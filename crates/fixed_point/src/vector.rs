//! Fixed-point vector operations

use crate::error::{FixedPointError, Result};
use crate::fixed::{decode, encode};
use crate::format::QFormat;
use crate::requantize::{requantize_with_status, Accumulator, ACCUMULATOR_BITS};

/// A vector of fixed-point values sharing one format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedVector {
    /// Raw values, each inside `format`'s range
    data: Vec<i64>,
    /// Common format for all elements
    format: QFormat,
}

impl FixedVector {
    /// Create from raw values, rejecting any value outside the format's range
    pub fn from_raw(data: Vec<i64>, format: QFormat) -> Result<Self> {
        if let Some(&raw) = data.iter().find(|&&v| !format.contains(v as i128)) {
            return Err(FixedPointError::OutOfRange {
                raw: raw as i128,
                format,
            });
        }
        Ok(Self { data, format })
    }

    /// Create from floating-point values, saturating each one
    pub fn from_f64_slice(values: &[f64], format: QFormat) -> Self {
        Self {
            data: values.iter().map(|&v| encode(v, format)).collect(),
            format,
        }
    }

    /// Convert to floating-point vector
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.data.iter().map(|&x| decode(x, self.format)).collect()
    }

    /// Get the length of the vector
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the vector is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw values
    pub fn as_slice(&self) -> &[i64] {
        &self.data
    }

    /// Shared format
    pub fn format(&self) -> QFormat {
        self.format
    }

    /// Multiply-accumulate against a weight row into the wide accumulator.
    /// The sum carries `F_self + F_row` fractional bits. A sum that leaves
    /// the accumulator range is an error, never a wrapped value.
    pub fn mac(&self, row: &[i64]) -> Result<Accumulator> {
        if self.len() != row.len() {
            return Err(FixedPointError::DimensionMismatch {
                expected: self.len(),
                got: row.len(),
            });
        }

        self.data
            .iter()
            .zip(row)
            .try_fold(0 as Accumulator, |acc, (&a, &w)| {
                // An i64 x i64 product always fits; only the sum can overflow
                acc.checked_add(a as Accumulator * w as Accumulator)
            })
            .ok_or(FixedPointError::AccumulatorOverflow {
                required: ACCUMULATOR_BITS + 1,
                available: ACCUMULATOR_BITS,
            })
    }

    /// Requantize every element into `to`, returning the number of elements
    /// that saturated
    pub fn requantize(&self, to: QFormat) -> (Self, usize) {
        let mut saturations = 0;
        let data = self
            .data
            .iter()
            .map(|&v| {
                let r = requantize_with_status(v as Accumulator, self.format.frac_bits(), to);
                saturations += r.saturated as usize;
                r.value
            })
            .collect();

        (Self { data, format: to }, saturations)
    }
}
