//! Binary-string `.mem` record codec
//!
//! Every record is one line of `'0'`/`'1'` characters. Signed fields are
//! N-bit two's-complement patterns, MSB first; labels are plain unsigned.

use std::path::Path;

use fixnet_fixed_point::{encode, from_twos_complement, to_twos_complement, QFormat};
use thiserror::Error;

use crate::error::ModelError;

/// A malformed record, before file and line context are attached
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    #[error("Record has {got} bits, expected {expected}")]
    Length { expected: usize, got: usize },

    #[error("Record contains a character other than '0' or '1'")]
    InvalidBits,

    #[error("Label {label} does not fit in {bits} bits")]
    LabelOverflow { label: usize, bits: u32 },
}

impl RecordError {
    /// Attach file and 1-based line context
    pub fn at(self, path: &Path, line: usize) -> ModelError {
        match self {
            RecordError::Length { expected, got } => ModelError::FileShape {
                path: path.to_path_buf(),
                line,
                expected,
                got,
            },
            RecordError::InvalidBits => ModelError::InvalidBits {
                path: path.to_path_buf(),
                line,
            },
            RecordError::LabelOverflow { label, bits } => ModelError::Config(format!(
                "{}:{}: label {} does not fit in {} bits",
                path.display(),
                line,
                label,
                bits
            )),
        }
    }
}

pub type RecordResult<T> = std::result::Result<T, RecordError>;

/// Non-empty records of a file with their 1-based line numbers
pub fn records(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

fn check_bits(bits: &str, expected: usize) -> RecordResult<()> {
    if bits.len() != expected {
        return Err(RecordError::Length {
            expected,
            got: bits.len(),
        });
    }
    if !bits.bytes().all(|b| b == b'0' || b == b'1') {
        return Err(RecordError::InvalidBits);
    }
    Ok(())
}

fn parse_unsigned(bits: &str) -> RecordResult<u64> {
    u64::from_str_radix(bits, 2).map_err(|_| RecordError::InvalidBits)
}

/// Parse one N-bit two's-complement field
pub fn parse_field(bits: &str, format: QFormat) -> RecordResult<i64> {
    check_bits(bits, format.total_bits() as usize)?;
    Ok(from_twos_complement(parse_unsigned(bits)?, format))
}

/// Parse a record of `count` consecutive fields
pub fn parse_row(line: &str, count: usize, format: QFormat) -> RecordResult<Vec<i64>> {
    let width = format.total_bits() as usize;
    check_bits(line, count * width)?;

    (0..count)
        .map(|i| parse_field(&line[i * width..(i + 1) * width], format))
        .collect()
}

/// Parse an unsigned label field
pub fn parse_label(bits: &str) -> RecordResult<usize> {
    check_bits(bits, bits.len())?;
    Ok(parse_unsigned(bits)? as usize)
}

/// Parse a sample record: `input_dim` pixel fields followed by the label
pub fn parse_sample(
    line: &str,
    input_dim: usize,
    input_format: QFormat,
    label_bits: u32,
) -> RecordResult<(Vec<i64>, usize)> {
    let pixel_bits = input_dim * input_format.total_bits() as usize;
    check_bits(line, pixel_bits + label_bits as usize)?;

    let (pixels, label) = line.split_at(pixel_bits);
    Ok((parse_row(pixels, input_dim, input_format)?, parse_label(label)?))
}

/// Format one field as an N-bit two's-complement pattern
pub fn format_field(raw: i64, format: QFormat) -> String {
    format!(
        "{:0width$b}",
        to_twos_complement(raw, format),
        width = format.total_bits() as usize
    )
}

/// Format consecutive fields as one record
pub fn format_row(values: &[i64], format: QFormat) -> String {
    values.iter().map(|&v| format_field(v, format)).collect()
}

/// Format a sample record
pub fn format_sample(
    pixels: &[i64],
    label: usize,
    input_format: QFormat,
    label_bits: u32,
) -> RecordResult<String> {
    if label_bits < usize::BITS && label >> label_bits != 0 {
        return Err(RecordError::LabelOverflow {
            label,
            bits: label_bits,
        });
    }
    Ok(format!(
        "{}{:0width$b}",
        format_row(pixels, input_format),
        label,
        width = label_bits as usize
    ))
}

/// Normalize an 8-bit pixel to [0, 1] and encode it
pub fn pixel_to_fixed(pixel: u8, format: QFormat) -> i64 {
    encode(pixel as f64 / 255.0, format)
}
