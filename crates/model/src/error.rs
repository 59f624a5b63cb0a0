//! Model loading error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing resource: {}", .path.display())]
    MissingResource { path: PathBuf },

    #[error("{}:{}: expected {} bits, got {}", .path.display(), .line, .expected, .got)]
    FileShape {
        path: PathBuf,
        line: usize,
        expected: usize,
        got: usize,
    },

    #[error("{}: expected {} records, got {}", .path.display(), .expected, .got)]
    RecordCount {
        path: PathBuf,
        expected: usize,
        got: usize,
    },

    #[error("{}:{}: record contains characters other than '0' and '1'", .path.display(), .line)]
    InvalidBits { path: PathBuf, line: usize },

    #[error(
        "{}:{}: label {} is not a class index below {}",
        .path.display(),
        .line,
        .label,
        .classes
    )]
    InvalidLabel {
        path: PathBuf,
        line: usize,
        label: usize,
        classes: usize,
    },

    #[error("Invalid tensor shape: expected {expected:?}, got {got:?}")]
    InvalidShape { expected: Vec<usize>, got: Vec<usize> },

    #[error("Fixed-point error: {0}")]
    FixedPoint(#[from] fixnet_fixed_point::FixedPointError),

    #[error(
        "Layer {layer}: accumulator needs {required} bits but only {available} are configured"
    )]
    AccumulatorOverflowRisk {
        layer: usize,
        required: u32,
        available: u32,
    },

    #[error(
        "Layer {layer}: bias has {bias_frac_bits} fractional bits, fewer than the product's {product_frac_bits}"
    )]
    BiasAlignment {
        layer: usize,
        bias_frac_bits: u32,
        product_frac_bits: u32,
    },

    #[error("Model config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
