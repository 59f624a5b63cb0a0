//! Encode/decode rules and two's-complement bit patterns

use crate::format::{QFormat, MAX_TOTAL_BITS};

/// Encode a real number: scale by 2^F, round half away from zero, saturate.
///
/// Out-of-range inputs are clamped, never rejected. NaN encodes as zero.
pub fn encode(value: f64, format: QFormat) -> i64 {
    let scaled = (value * (format.frac_bits() as f64).exp2()).round();
    // `as` saturates at the i128 bounds and maps NaN to 0
    format.saturate(scaled as i128)
}

/// Decode an in-range signed raw value to a real number
pub fn decode(raw: i64, format: QFormat) -> f64 {
    raw as f64 / (format.frac_bits() as f64).exp2()
}

fn bit_mask(format: QFormat) -> u64 {
    u64::MAX >> (MAX_TOTAL_BITS - format.total_bits())
}

/// Signed raw value to its unsigned N-bit two's-complement pattern
pub fn to_twos_complement(raw: i64, format: QFormat) -> u64 {
    (raw as u64) & bit_mask(format)
}

/// Unsigned N-bit pattern back to a signed raw value. Bits above N are ignored.
pub fn from_twos_complement(pattern: u64, format: QFormat) -> i64 {
    let n = format.total_bits();
    let masked = pattern & bit_mask(format);
    if n == MAX_TOTAL_BITS {
        return masked as i64;
    }
    if masked >= 1u64 << (n - 1) {
        ((masked as i128) - (1i128 << n)) as i64
    } else {
        masked as i64
    }
}
