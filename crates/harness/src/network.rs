//! Network driver: input requantization, layer chaining, softmax and
//! accuracy bookkeeping

use fixnet_fixed_point::{FixedPointError, FixedVector};
use fixnet_model::{ModelWeights, Sample};
use rayon::prelude::*;

use crate::error::{HarnessError, Result};
use crate::layer::{evaluate, evaluate_traced, LayerTrace};

/// Classification of one input vector
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Predicted class (lowest index among equal maxima)
    pub label: usize,
    /// Softmax over the dequantized logits
    pub probabilities: Vec<f64>,
    /// Output layer values in the activation format
    pub logits: FixedVector,
    /// Saturation events over the input stage and every layer
    pub saturations: usize,
}

/// Every layer intermediate of one forward pass
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkTrace {
    /// Input requantized into the activation format
    pub input: FixedVector,
    /// One trace per layer, input to output
    pub layers: Vec<LayerTrace>,
    /// Final classification
    pub prediction: Prediction,
}

/// Accuracy over a set of labelled samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    /// Samples evaluated
    pub total: usize,
    /// Samples whose prediction matched the label
    pub correct: usize,
    /// Saturation events over all samples
    pub saturations: usize,
}

impl EvaluationReport {
    /// Fraction of correct predictions; 0.0 for an empty set
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    fn record(&mut self, prediction: &Prediction, label: usize) {
        self.total += 1;
        self.correct += (prediction.label == label) as usize;
        self.saturations += prediction.saturations;
    }
}

/// Numerically stable softmax: the maximum is subtracted before `exp`
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the first maximum, or `None` for an empty slice
pub fn argmax<T: PartialOrd>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, &T)> = None;
    for (i, v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Integer-only MLP over validated weights
pub struct Network {
    model: ModelWeights,
}

impl Network {
    /// Create from weights, re-checking them since [`ModelWeights`] fields
    /// are public
    pub fn new(model: ModelWeights) -> Result<Self> {
        model.validate()?;
        Ok(Self { model })
    }

    /// Get model weights
    pub fn model(&self) -> &ModelWeights {
        &self.model
    }

    /// Check the input against the configured input stage and requantize it
    /// into the activation format
    fn prepare_input(&self, input: &FixedVector) -> Result<(FixedVector, usize)> {
        let config = &self.model.config;
        if input.format() != config.input_format {
            return Err(FixedPointError::FormatMismatch {
                expected: config.input_format,
                got: input.format(),
            }
            .into());
        }
        if input.len() != config.input_dim() {
            return Err(FixedPointError::DimensionMismatch {
                expected: config.input_dim(),
                got: input.len(),
            }
            .into());
        }
        Ok(input.requantize(config.activation_format))
    }

    fn classify(&self, logits: FixedVector, saturations: usize) -> Result<Prediction> {
        let probabilities = softmax(&logits.to_f64_vec());
        let label = argmax(&probabilities)
            .ok_or_else(|| HarnessError::InvalidInput("network has no outputs".into()))?;
        Ok(Prediction {
            label,
            probabilities,
            logits,
            saturations,
        })
    }

    /// Classify one input vector (in the configured input format)
    pub fn predict(&self, input: &FixedVector) -> Result<Prediction> {
        let activation_format = self.model.config.activation_format;
        let (mut x, mut saturations) = self.prepare_input(input)?;

        for layer in &self.model.layers {
            let out = evaluate(&x, layer, activation_format)?;
            saturations += out.saturations;
            x = out.values;
        }

        self.classify(x, saturations)
    }

    /// [`Network::predict`] keeping every layer intermediate
    pub fn trace(&self, input: &FixedVector) -> Result<NetworkTrace> {
        let activation_format = self.model.config.activation_format;
        let (prepared, mut saturations) = self.prepare_input(input)?;

        let mut layers: Vec<LayerTrace> = Vec::with_capacity(self.model.num_layers());
        for layer in &self.model.layers {
            let x = layers.last().map_or(&prepared, |t| &t.output.values);
            let trace = evaluate_traced(x, layer, activation_format)?;
            saturations += trace.output.saturations;
            layers.push(trace);
        }

        let logits = layers
            .last()
            .map_or_else(|| prepared.clone(), |t| t.output.values.clone());
        let prediction = self.classify(logits, saturations)?;
        Ok(NetworkTrace {
            input: prepared,
            layers,
            prediction,
        })
    }

    /// Evaluate samples in order
    pub fn evaluate(&self, samples: &[Sample]) -> Result<EvaluationReport> {
        let mut report = EvaluationReport::default();
        for sample in samples {
            let prediction = self.predict(&sample.input)?;
            report.record(&prediction, sample.label);
        }
        self.log_report(&report);
        Ok(report)
    }

    /// Evaluate samples across the rayon thread pool. The report is
    /// identical to [`Network::evaluate`].
    pub fn evaluate_parallel(&self, samples: &[Sample]) -> Result<EvaluationReport> {
        let predictions = samples
            .par_iter()
            .map(|sample| self.predict(&sample.input))
            .collect::<Result<Vec<_>>>()?;

        let mut report = EvaluationReport::default();
        for (prediction, sample) in predictions.iter().zip(samples) {
            report.record(prediction, sample.label);
        }
        self.log_report(&report);
        Ok(report)
    }

    fn log_report(&self, report: &EvaluationReport) {
        tracing::info!(
            "Accuracy {:.2}% ({}/{}), {} saturations",
            report.accuracy() * 100.0,
            report.correct,
            report.total,
            report.saturations
        );
    }
}
