//! Integer-only dense layer evaluation
//!
//! Each output neuron is a multiply-accumulate into the [`Accumulator`],
//! plus the bias shifted down to the product scale, requantized into the
//! activation format and optionally clamped by ReLU. Neurons are
//! independent, so any evaluation order gives identical results.

use fixnet_fixed_point::{
    align_right, requantize_with_status, required_accumulator_bits, Accumulator,
    FixedPointError, FixedVector, QFormat, ACCUMULATOR_BITS,
};
use fixnet_model::{Activation, LayerWeights};

use crate::error::{HarnessError, Result};

/// Every intermediate of one output neuron
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeuronOutput {
    /// MAC sum plus aligned bias, at the product scale
    pub accumulator: Accumulator,
    /// Accumulator requantized into the activation format
    pub requantized: i64,
    /// Value after the layer activation
    pub value: i64,
    /// Requantization clamped the value
    pub saturated: bool,
}

/// Result of evaluating a whole layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerOutput {
    /// Activated outputs in the activation format
    pub values: FixedVector,
    /// Number of neurons whose requantization saturated
    pub saturations: usize,
}

/// Layer output together with its intermediates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerTrace {
    /// Biased accumulators, one per neuron
    pub accumulators: Vec<Accumulator>,
    /// Fractional bits of `accumulators`
    pub accumulator_frac_bits: u32,
    /// Pre-activation values in the activation format
    pub requantized: FixedVector,
    /// Activated outputs
    pub output: LayerOutput,
}

/// Fractional bits of the MAC sum and the bias shift for `layer`
///
/// Fails when the worst-case biased sum of `layer` does not fit the
/// [`Accumulator`].
fn product_scale(input_format: QFormat, layer: &LayerWeights) -> Result<(u32, u32)> {
    let product_frac_bits = input_format.frac_bits() + layer.weight_format.frac_bits();
    let bias_frac_bits = layer.bias_format.frac_bits();
    if bias_frac_bits < product_frac_bits {
        return Err(HarnessError::InvalidInput(format!(
            "bias format {} has fewer fractional bits than the product scale ({})",
            layer.bias_format, product_frac_bits
        )));
    }
    let bias_shift = bias_frac_bits - product_frac_bits;

    let required = required_accumulator_bits(
        input_format,
        layer.weight_format,
        layer.bias_format,
        bias_shift,
        layer.in_dim,
    );
    if required > ACCUMULATOR_BITS {
        return Err(FixedPointError::AccumulatorOverflow {
            required,
            available: ACCUMULATOR_BITS,
        }
        .into());
    }
    Ok((product_frac_bits, bias_shift))
}

fn check_input(input: &FixedVector, layer: &LayerWeights, activation_format: QFormat) -> Result<()> {
    if input.format() != activation_format {
        return Err(FixedPointError::FormatMismatch {
            expected: activation_format,
            got: input.format(),
        }
        .into());
    }
    if input.len() != layer.in_dim {
        return Err(FixedPointError::DimensionMismatch {
            expected: layer.in_dim,
            got: input.len(),
        }
        .into());
    }
    Ok(())
}

fn neuron_unchecked(
    input: &FixedVector,
    layer: &LayerWeights,
    neuron: usize,
    activation_format: QFormat,
    product_frac_bits: u32,
    bias_shift: u32,
) -> Result<NeuronOutput> {
    let bias = align_right(layer.biases[neuron] as Accumulator, bias_shift);
    let accumulator = input
        .mac(layer.row(neuron))?
        .checked_add(bias)
        .ok_or(FixedPointError::AccumulatorOverflow {
            required: ACCUMULATOR_BITS + 1,
            available: ACCUMULATOR_BITS,
        })?;

    let r = requantize_with_status(accumulator, product_frac_bits, activation_format);
    let value = match layer.activation {
        Activation::Relu => r.value.max(0),
        Activation::Identity | Activation::Softmax => r.value,
    };

    Ok(NeuronOutput {
        accumulator,
        requantized: r.value,
        value,
        saturated: r.saturated,
    })
}

/// Evaluate output neuron `neuron` of `layer`
pub fn evaluate_neuron(
    input: &FixedVector,
    layer: &LayerWeights,
    neuron: usize,
    activation_format: QFormat,
) -> Result<NeuronOutput> {
    check_input(input, layer, activation_format)?;
    if neuron >= layer.out_dim {
        return Err(HarnessError::InvalidInput(format!(
            "neuron {} out of range for a layer with {} outputs",
            neuron, layer.out_dim
        )));
    }
    let (product_frac_bits, bias_shift) = product_scale(activation_format, layer)?;
    neuron_unchecked(input, layer, neuron, activation_format, product_frac_bits, bias_shift)
}

/// Evaluate `layer` on `input`, keeping every intermediate
pub fn evaluate_traced(
    input: &FixedVector,
    layer: &LayerWeights,
    activation_format: QFormat,
) -> Result<LayerTrace> {
    check_input(input, layer, activation_format)?;
    let (product_frac_bits, bias_shift) = product_scale(activation_format, layer)?;

    let mut accumulators = Vec::with_capacity(layer.out_dim);
    let mut requantized = Vec::with_capacity(layer.out_dim);
    let mut values = Vec::with_capacity(layer.out_dim);
    let mut saturations = 0;
    for neuron in 0..layer.out_dim {
        let out = neuron_unchecked(
            input,
            layer,
            neuron,
            activation_format,
            product_frac_bits,
            bias_shift,
        )?;
        accumulators.push(out.accumulator);
        requantized.push(out.requantized);
        values.push(out.value);
        saturations += out.saturated as usize;
    }

    if saturations > 0 {
        tracing::debug!(
            "{} of {} neurons saturated in {}",
            saturations,
            layer.out_dim,
            activation_format
        );
    }

    Ok(LayerTrace {
        accumulators,
        accumulator_frac_bits: product_frac_bits,
        requantized: FixedVector::from_raw(requantized, activation_format)?,
        output: LayerOutput {
            values: FixedVector::from_raw(values, activation_format)?,
            saturations,
        },
    })
}

/// Evaluate `layer` on `input` (in `activation_format`)
pub fn evaluate(
    input: &FixedVector,
    layer: &LayerWeights,
    activation_format: QFormat,
) -> Result<LayerOutput> {
    Ok(evaluate_traced(input, layer, activation_format)?.output)
}
