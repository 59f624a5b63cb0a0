//! Network configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use fixnet_fixed_point::{ceil_log2, required_accumulator_bits, QFormat, ACCUMULATOR_BITS};

use crate::error::{ModelError, Result};

/// Weight and bias formats of one dense layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerFormats {
    /// Format of the weight matrix
    pub weight_format: QFormat,
    /// Format of the bias vector
    pub bias_format: QFormat,
}

/// Topology and fixed-point formats, fixed at load time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Layer dimensions [d0, d1, ..., dk]
    #[serde(default = "default_dims")]
    pub dims: Vec<usize>,

    /// Format of sample pixels on disk
    #[serde(default = "default_input_format")]
    pub input_format: QFormat,

    /// Format of every layer output
    #[serde(default = "default_activation_format")]
    pub activation_format: QFormat,

    /// Weight format for layers without an override
    #[serde(default = "default_weight_format")]
    pub weight_format: QFormat,

    /// Bias format for layers without an override
    #[serde(default = "default_bias_format")]
    pub bias_format: QFormat,

    /// Per-layer overrides; empty means every layer uses the global formats
    #[serde(default)]
    pub layers: Vec<LayerFormats>,

    /// Simulated accumulator width
    #[serde(default = "default_accumulator_bits")]
    pub accumulator_bits: u32,

    /// Width of the label field in sample records
    #[serde(default = "default_label_bits")]
    pub label_bits: u32,
}

fn default_dims() -> Vec<usize> { vec![64, 50, 30, 10] }
fn default_input_format() -> QFormat { QFormat::Q16_16 }
fn default_activation_format() -> QFormat { QFormat::Q8_8 }
fn default_weight_format() -> QFormat { QFormat::Q16_16 }
fn default_bias_format() -> QFormat { QFormat::Q32_32 }
fn default_accumulator_bits() -> u32 { ACCUMULATOR_BITS }
fn default_label_bits() -> u32 { 4 }

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            dims: default_dims(),
            input_format: default_input_format(),
            activation_format: default_activation_format(),
            weight_format: default_weight_format(),
            bias_format: default_bias_format(),
            layers: Vec::new(),
            accumulator_bits: default_accumulator_bits(),
            label_bits: default_label_bits(),
        }
    }
}

impl NetworkConfig {
    /// Load config from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Number of dense layers
    pub fn num_layers(&self) -> usize {
        self.dims.len().saturating_sub(1)
    }

    /// Width of the input vector
    pub fn input_dim(&self) -> usize {
        self.dims.first().copied().unwrap_or(0)
    }

    /// Number of output classes
    pub fn num_classes(&self) -> usize {
        self.dims.last().copied().unwrap_or(0)
    }

    /// Formats of layer `layer` (0-based)
    pub fn layer_formats(&self, layer: usize) -> LayerFormats {
        self.layers.get(layer).copied().unwrap_or(LayerFormats {
            weight_format: self.weight_format,
            bias_format: self.bias_format,
        })
    }

    /// Fractional bits of an activation x weight product in layer `layer`
    pub fn product_frac_bits(&self, layer: usize) -> u32 {
        self.activation_format.frac_bits() + self.layer_formats(layer).weight_format.frac_bits()
    }

    /// Right shift that brings layer `layer`'s bias to the product scale
    pub fn bias_shift(&self, layer: usize) -> Result<u32> {
        let bias_frac_bits = self.layer_formats(layer).bias_format.frac_bits();
        let product_frac_bits = self.product_frac_bits(layer);
        bias_frac_bits
            .checked_sub(product_frac_bits)
            .ok_or(ModelError::BiasAlignment {
                layer,
                bias_frac_bits,
                product_frac_bits,
            })
    }

    /// Accumulator bits layer `layer` needs: the wider of the full MAC sum
    /// (N_A + N_W + ceil(log2(fan_in))) and the aligned bias, plus one for
    /// the bias addition
    pub fn required_accumulator_bits(&self, layer: usize) -> Result<u32> {
        let formats = self.layer_formats(layer);
        Ok(required_accumulator_bits(
            self.activation_format,
            formats.weight_format,
            formats.bias_format,
            self.bias_shift(layer)?,
            self.dims.get(layer).copied().unwrap_or(0),
        ))
    }

    /// Bits in one sample record (pixels and label)
    pub fn sample_bits(&self) -> usize {
        self.input_dim() * self.input_format.total_bits() as usize + self.label_bits as usize
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.dims.len() < 2 {
            return Err(ModelError::Config(format!(
                "topology needs at least an input and an output dimension, got {:?}",
                self.dims
            )));
        }
        if self.dims.contains(&0) {
            return Err(ModelError::Config(format!(
                "layer dimensions must be non-zero, got {:?}",
                self.dims
            )));
        }
        if !self.layers.is_empty() && self.layers.len() != self.num_layers() {
            return Err(ModelError::Config(format!(
                "{} layer format overrides given for {} layers",
                self.layers.len(),
                self.num_layers()
            )));
        }
        if self.accumulator_bits == 0 || self.accumulator_bits > ACCUMULATOR_BITS {
            return Err(ModelError::Config(format!(
                "accumulator_bits ({}) must be in 1..={}",
                self.accumulator_bits, ACCUMULATOR_BITS
            )));
        }

        let classes = self.num_classes();
        let min_label_bits = ceil_log2(classes).max(1);
        if self.label_bits < min_label_bits || self.label_bits > 32 {
            return Err(ModelError::Config(format!(
                "label_bits ({}) must be in {}..=32 for {} classes",
                self.label_bits, min_label_bits, classes
            )));
        }

        for layer in 0..self.num_layers() {
            let required = self.required_accumulator_bits(layer)?;
            if required > self.accumulator_bits {
                return Err(ModelError::AccumulatorOverflowRisk {
                    layer,
                    required,
                    available: self.accumulator_bits,
                });
            }
        }

        if self.activation_format.frac_bits() > self.input_format.frac_bits() {
            tracing::warn!(
                "Input requantize widens {} to {}; no precision is gained",
                self.input_format,
                self.activation_format
            );
        }

        Ok(())
    }
}
