//! fixnet Model Loading
//!
//! Network configuration, the `.mem` binary-string file codec, and
//! loading/exporting of quantized MLP weights and labelled samples.

mod config;
mod error;
mod export;
mod loader;
pub mod mem;
mod sample;
mod weights;

pub use config::{LayerFormats, NetworkConfig};
pub use error::{ModelError, Result};
pub use export::{export_model, write_config, write_layer, write_samples};
pub use loader::{
    biases_file_name, weights_file_name, MemLoader, CONFIG_FILE, DEFAULT_SAMPLE_FILE,
};
pub use sample::{Dataset, LoadMode, Sample};
pub use weights::{Activation, LayerWeights, ModelWeights};
