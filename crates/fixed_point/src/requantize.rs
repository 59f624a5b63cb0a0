//! Requantization from a wide accumulator scale to a narrow format
//!
//! Every change of fractional scale that involves rounding goes through
//! [`requantize_with_status`]. The only other shift in the datapath is
//! [`align_right`], used to bring a bias down to the product scale.

use crate::format::QFormat;

/// Wide accumulator used for MAC sums and bias alignment
pub type Accumulator = i128;

/// Width of [`Accumulator`] in bits
pub const ACCUMULATOR_BITS: u32 = Accumulator::BITS;

/// Outcome of a requantization step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requantized {
    /// Saturated result in the target format
    pub value: i64,
    /// The rounded value fell outside the target range and was clamped
    pub saturated: bool,
    /// The target format has more fractional bits than the source; the
    /// result was left-shifted and carries no extra precision
    pub widened: bool,
}

/// ceil(log2(n)), with 0 for n <= 1
pub fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Accumulator bits one dense-layer neuron needs: the wider of the full MAC
/// sum (N_A + N_W + ceil(log2(fan_in))) and the bias after a right shift of
/// `bias_shift`, plus one for the bias addition
pub fn required_accumulator_bits(
    input: QFormat,
    weight: QFormat,
    bias: QFormat,
    bias_shift: u32,
    fan_in: usize,
) -> u32 {
    let mac_bits = input.total_bits() + weight.total_bits() + ceil_log2(fan_in);
    let bias_bits = bias.total_bits().saturating_sub(bias_shift).max(1);
    mac_bits.max(bias_bits) + 1
}

/// Requantize `value` (scaled by 2^`from_frac_bits`) into `to`.
///
/// Narrowing adds a rounding bias of half the dropped LSB to the magnitude
/// and shifts it right, so ties round half away from zero for both signs.
/// Negative values that are not exact ties can differ by one LSB from a
/// subtract-bias-then-floor-shift rounder: -1 shifted by 2 gives 0 here,
/// where the floor shift gives -1. Widening shifts left. The result is
/// saturated.
pub fn requantize(value: Accumulator, from_frac_bits: u32, to: QFormat) -> i64 {
    requantize_with_status(value, from_frac_bits, to).value
}

/// [`requantize`] that also reports saturation and widening
pub fn requantize_with_status(value: Accumulator, from_frac_bits: u32, to: QFormat) -> Requantized {
    let to_frac_bits = to.frac_bits();
    let widened = to_frac_bits > from_frac_bits;

    let shifted = if widened {
        shift_left_saturating(value, to_frac_bits - from_frac_bits)
    } else {
        round_shift_right(value, from_frac_bits - to_frac_bits)
    };

    let (value, saturated) = to.saturate_with_status(shifted);
    Requantized {
        value,
        saturated,
        widened,
    }
}

/// Arithmetic right shift with no rounding. Shifts of 128 or more collapse
/// to the sign.
pub fn align_right(value: Accumulator, shift: u32) -> Accumulator {
    if shift >= ACCUMULATOR_BITS {
        if value < 0 {
            -1
        } else {
            0
        }
    } else {
        value >> shift
    }
}

fn round_shift_right(value: Accumulator, shift: u32) -> Accumulator {
    if shift == 0 {
        return value;
    }
    if shift >= ACCUMULATOR_BITS {
        // Every representable magnitude is below half an output LSB
        return 0;
    }
    // Round the magnitude so that requantize(-v) == -requantize(v)
    let bias: u128 = 1 << (shift - 1);
    let magnitude = (value.unsigned_abs().saturating_add(bias) >> shift) as Accumulator;
    if value < 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn shift_left_saturating(value: Accumulator, shift: u32) -> Accumulator {
    if value == 0 {
        return 0;
    }
    if shift >= ACCUMULATOR_BITS - 1 {
        return if value > 0 { Accumulator::MAX } else { Accumulator::MIN };
    }
    let limit = Accumulator::MAX >> shift;
    if value > limit {
        Accumulator::MAX
    } else if value < -limit {
        Accumulator::MIN
    } else {
        value << shift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: u32, x: u32) -> QFormat {
        QFormat::new(n, x).unwrap()
    }

    #[test]
    fn test_passthrough() {
        let q4_2 = q(4, 2);
        let r = requantize_with_status(5, 2, q4_2);
        assert_eq!(r, Requantized { value: 5, saturated: false, widened: false });
    }

    #[test]
    fn test_narrowing_rounds_half_away_from_zero() {
        // Q.24 -> Q8.8 drops 16 bits; 0x8000 is exactly half an LSB
        assert_eq!(requantize(0x8000, 24, QFormat::Q8_8), 1);
        assert_eq!(requantize(-0x8000, 24, QFormat::Q8_8), -1);
        assert_eq!(requantize(0x7FFF, 24, QFormat::Q8_8), 0);
        assert_eq!(requantize(-0x7FFF, 24, QFormat::Q8_8), 0);
        assert_eq!(requantize(0x18000, 24, QFormat::Q8_8), 2);
        assert_eq!(requantize(-0x18000, 24, QFormat::Q8_8), -2);
    }

    #[test]
    fn test_narrowing_saturates() {
        let q4_2 = q(4, 2);
        // 3.0 at F=4 is 48, which is 12 at F=2 and clamps to 7
        let r = requantize_with_status(48, 4, q4_2);
        assert_eq!(r.value, 7);
        assert!(r.saturated);
        assert!(!r.widened);

        assert_eq!(requantize(-48, 4, q4_2), -8);
    }

    #[test]
    fn test_widening_is_flagged() {
        let r = requantize_with_status(3, 0, QFormat::Q8_8);
        assert_eq!(r.value, 3 << 8);
        assert!(r.widened);
        assert!(!r.saturated);

        let r = requantize_with_status(1000, 0, QFormat::Q8_8);
        assert_eq!(r.value, QFormat::Q8_8.max_raw());
        assert!(r.saturated);
    }

    #[test]
    fn test_widening_does_not_overflow_accumulator() {
        let r = requantize_with_status(i128::MAX / 3, 0, QFormat::Q32_32);
        assert_eq!(r.value, i64::MAX);
        let r = requantize_with_status(i128::MIN / 3, 0, QFormat::Q32_32);
        assert_eq!(r.value, i64::MIN);
    }

    #[test]
    fn test_extreme_accumulators() {
        assert_eq!(requantize(i128::MAX, 24, QFormat::Q8_8), QFormat::Q8_8.max_raw());
        assert_eq!(requantize(i128::MIN, 24, QFormat::Q8_8), QFormat::Q8_8.min_raw());
        assert_eq!(requantize(i128::MAX, 200, QFormat::Q8_8), 0);
    }

    #[test]
    fn test_align_right_truncates_toward_negative_infinity() {
        assert_eq!(align_right(0x1FF, 8), 1);
        assert_eq!(align_right(-1, 8), -1);
        assert_eq!(align_right(-0x100, 8), -1);
        assert_eq!(align_right(-0x101, 8), -2);
        assert_eq!(align_right(42, 0), 42);
        assert_eq!(align_right(-5, 200), -1);
        assert_eq!(align_right(5, 200), 0);
    }

    #[test]
    fn test_negative_non_ties_round_toward_zero() {
        let integer = q(16, 16);
        // -0.25 LSB rounds to 0, not -1
        assert_eq!(requantize(-1, 2, integer), 0);
        assert_eq!(requantize(-1, 4, q(16, 14)), 0);
        // -0.75 LSB still rounds away from zero
        assert_eq!(requantize(-3, 2, integer), -1);
    }

    #[test]
    fn test_ceil_log2() {
        assert_eq!(ceil_log2(0), 0);
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(10), 4);
        assert_eq!(ceil_log2(64), 6);
        assert_eq!(ceil_log2(65), 7);
    }

    #[test]
    fn test_required_accumulator_bits() {
        // Q8.8 x Q16.16 over 64 inputs, Q32.32 bias shifted by 8
        assert_eq!(
            required_accumulator_bits(QFormat::Q8_8, QFormat::Q16_16, QFormat::Q32_32, 8, 64),
            57
        );
        // Two 64-bit operands over three inputs cannot fit in i128
        let wide = q(64, 16);
        assert_eq!(required_accumulator_bits(wide, wide, wide, 0, 3), 131);
    }

    #[test]
    fn test_rounding_symmetry_at_ties() {
        let q2 = q(16, 14);
        for v in -64..=64 {
            assert_eq!(requantize(-v, 4, q2), -requantize(v, 4, q2), "v = {}", v);
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn format_strategy() -> impl Strategy<Value = QFormat> {
            (1u32..=64)
                .prop_flat_map(|n| (Just(n), 1..=n))
                .prop_map(|(n, x)| QFormat::new(n, x).unwrap())
        }

        proptest! {
            #[test]
            fn requantize_is_idempotent(
                value in any::<i64>(),
                scale in 0u32..16,
                from_frac_bits in 0u32..=96,
                format in format_strategy(),
            ) {
                let wide = (value as Accumulator) << scale;
                let once = requantize(wide, from_frac_bits, format);
                let twice = requantize(once as Accumulator, format.frac_bits(), format);
                prop_assert_eq!(once, twice);
            }

            #[test]
            fn requantize_is_symmetric_about_zero(
                value in any::<i64>(),
                from_frac_bits in 0u32..=96,
                format in format_strategy(),
            ) {
                let pos = requantize_with_status(value as Accumulator, from_frac_bits, format);
                let neg = requantize_with_status(-(value as Accumulator), from_frac_bits, format);
                if !pos.saturated && !neg.saturated {
                    prop_assert_eq!(neg.value, -pos.value);
                }
            }

            #[test]
            fn requantize_stays_in_range(
                value in any::<i128>(),
                from_frac_bits in 0u32..=130,
                format in format_strategy(),
            ) {
                let out = requantize(value, from_frac_bits, format);
                prop_assert!(format.contains(out as i128));
            }
        }
    }
}
