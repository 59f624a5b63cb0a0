//! Model weight structures

use fixnet_fixed_point::{encode, QFormat};

use crate::config::{LayerFormats, NetworkConfig};
use crate::error::{ModelError, Result};

/// Activation applied after a dense layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activation {
    /// Pass the requantized value through
    Identity,
    /// Clamp negative values to zero
    Relu,
    /// Output layer: logits are dequantized and normalized in floating point
    Softmax,
}

/// Weights for a dense layer (y = Wx + b)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerWeights {
    /// Weight matrix (out_dim × in_dim), row-major, one row per output neuron
    pub weights: Vec<i64>,
    /// Bias vector (out_dim)
    pub biases: Vec<i64>,
    /// Input dimension (fan-in)
    pub in_dim: usize,
    /// Output dimension
    pub out_dim: usize,
    /// Format of `weights`
    pub weight_format: QFormat,
    /// Format of `biases`
    pub bias_format: QFormat,
    /// Activation applied to the layer output
    pub activation: Activation,
}

impl LayerWeights {
    /// Create from raw fixed-point values, checking shapes and ranges
    pub fn new(
        weights: Vec<i64>,
        biases: Vec<i64>,
        in_dim: usize,
        out_dim: usize,
        formats: LayerFormats,
        activation: Activation,
    ) -> Result<Self> {
        let layer = Self {
            weights,
            biases,
            in_dim,
            out_dim,
            weight_format: formats.weight_format,
            bias_format: formats.bias_format,
            activation,
        };
        layer.validate()?;
        Ok(layer)
    }

    /// Check buffer lengths against the dimensions and every value against its format
    pub fn validate(&self) -> Result<()> {
        if self.weights.len() != self.in_dim * self.out_dim {
            return Err(ModelError::InvalidShape {
                expected: vec![self.out_dim, self.in_dim],
                got: vec![self.weights.len()],
            });
        }
        if self.biases.len() != self.out_dim {
            return Err(ModelError::InvalidShape {
                expected: vec![self.out_dim],
                got: vec![self.biases.len()],
            });
        }
        check_range(&self.weights, self.weight_format)?;
        check_range(&self.biases, self.bias_format)
    }

    /// Create from real-valued weights (row-major, out_dim × in_dim) and biases
    pub fn from_f64(
        weights: &[f64],
        biases: &[f64],
        in_dim: usize,
        out_dim: usize,
        formats: LayerFormats,
        activation: Activation,
    ) -> Result<Self> {
        let weight_fixed = weights
            .iter()
            .map(|&w| encode(w, formats.weight_format))
            .collect();
        let bias_fixed = biases
            .iter()
            .map(|&b| encode(b, formats.bias_format))
            .collect();

        Self::new(weight_fixed, bias_fixed, in_dim, out_dim, formats, activation)
    }

    /// Fan-in weights of output neuron `neuron`
    pub fn row(&self, neuron: usize) -> &[i64] {
        &self.weights[neuron * self.in_dim..(neuron + 1) * self.in_dim]
    }

    /// Layer formats
    pub fn formats(&self) -> LayerFormats {
        LayerFormats {
            weight_format: self.weight_format,
            bias_format: self.bias_format,
        }
    }
}

fn check_range(values: &[i64], format: QFormat) -> Result<()> {
    match values.iter().find(|&&v| !format.contains(v as i128)) {
        Some(&raw) => Err(fixnet_fixed_point::FixedPointError::OutOfRange {
            raw: raw as i128,
            format,
        }
        .into()),
        None => Ok(()),
    }
}

/// Complete network: configuration plus one [`LayerWeights`] per layer
#[derive(Debug, Clone)]
pub struct ModelWeights {
    /// Network configuration
    pub config: NetworkConfig,
    /// Dense layers, input to output
    pub layers: Vec<LayerWeights>,
}

impl ModelWeights {
    /// Assemble a network, checking every layer against the configuration
    pub fn new(config: NetworkConfig, layers: Vec<LayerWeights>) -> Result<Self> {
        let model = Self { config, layers };
        model.validate()?;
        Ok(model)
    }

    /// Check the configuration, then every layer's shape, formats and
    /// activation against it
    pub fn validate(&self) -> Result<()> {
        let Self { config, layers } = self;
        config.validate()?;
        if layers.len() != config.num_layers() {
            return Err(ModelError::Config(format!(
                "config describes {} layers, got {}",
                config.num_layers(),
                layers.len()
            )));
        }

        let last = layers.len() - 1;
        for (i, layer) in layers.iter().enumerate() {
            layer.validate()?;
            let (in_dim, out_dim) = (config.dims[i], config.dims[i + 1]);
            if layer.in_dim != in_dim || layer.out_dim != out_dim {
                return Err(ModelError::InvalidShape {
                    expected: vec![out_dim, in_dim],
                    got: vec![layer.out_dim, layer.in_dim],
                });
            }
            if layer.formats() != config.layer_formats(i) {
                return Err(ModelError::Config(format!(
                    "layer {} formats {}/{} differ from the configured {}/{}",
                    i + 1,
                    layer.weight_format,
                    layer.bias_format,
                    config.layer_formats(i).weight_format,
                    config.layer_formats(i).bias_format
                )));
            }
            if layer.activation == Activation::Softmax && i != last {
                return Err(ModelError::Config(format!(
                    "softmax is only valid on the output layer, found on layer {}",
                    i + 1
                )));
            }
        }

        Ok(())
    }

    /// Activation the loader assigns to layer `layer`: ReLU on hidden layers,
    /// softmax on the output layer
    pub fn default_activation(config: &NetworkConfig, layer: usize) -> Activation {
        if layer + 1 == config.num_layers() {
            Activation::Softmax
        } else {
            Activation::Relu
        }
    }

    /// Input vector width
    pub fn input_dim(&self) -> usize {
        self.config.input_dim()
    }

    /// Number of output classes
    pub fn num_classes(&self) -> usize {
        self.config.num_classes()
    }

    /// Get number of layers
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}
