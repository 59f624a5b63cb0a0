//! fixnet Inference Harness
//!
//! Integer-only layer evaluation and the network driver that chains layers,
//! applies softmax and scores labelled samples.

mod error;
mod layer;
mod network;

pub use error::{HarnessError, Result};
pub use layer::{evaluate, evaluate_neuron, evaluate_traced, LayerOutput, LayerTrace, NeuronOutput};
pub use network::{argmax, softmax, EvaluationReport, Network, NetworkTrace, Prediction};
