//! Harness error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Model error: {0}")]
    Model(#[from] fixnet_model::ModelError),

    #[error("Fixed-point error: {0}")]
    FixedPoint(#[from] fixnet_fixed_point::FixedPointError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
