//! `.mem` model directory loading
//!
//! A model directory holds `config.json`, `layer{i}_weights.mem` and
//! `layer{i}_biases.mem` for i = 1..=k, and usually a `test.mem` sample file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fixnet_fixed_point::FixedVector;

use crate::config::NetworkConfig;
use crate::error::{ModelError, Result};
use crate::mem::{parse_field, parse_row, parse_sample, records};
use crate::sample::{Dataset, LoadMode, Sample};
use crate::weights::{LayerWeights, ModelWeights};

/// Configuration file name inside a model directory
pub const CONFIG_FILE: &str = "config.json";

/// Default sample file name inside a model directory
pub const DEFAULT_SAMPLE_FILE: &str = "test.mem";

/// Weight file name of layer `layer` (0-based; files are numbered from 1)
pub fn weights_file_name(layer: usize) -> String {
    format!("layer{}_weights.mem", layer + 1)
}

/// Bias file name of layer `layer` (0-based; files are numbered from 1)
pub fn biases_file_name(layer: usize) -> String {
    format!("layer{}_biases.mem", layer + 1)
}

/// Read a whole file, reporting an absent file as a missing resource
pub(crate) fn read_resource(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ModelError::MissingResource {
            path: path.to_path_buf(),
        },
        _ => ModelError::Io(e),
    })
}

/// Load network weights and samples from a model directory
pub struct MemLoader {
    /// Model directory
    dir: PathBuf,
    /// Model configuration
    pub config: NetworkConfig,
}

impl MemLoader {
    /// Load from a directory containing config.json
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let content = read_resource(&dir.join(CONFIG_FILE))?;
        let config: NetworkConfig = serde_json::from_str(&content)?;
        Self::with_config(dir, config)
    }

    /// Use an explicit configuration instead of the directory's config.json
    pub fn with_config<P: AsRef<Path>>(dir: P, config: NetworkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            config,
        })
    }

    /// Default sample file path
    pub fn default_samples_path(&self) -> PathBuf {
        self.dir.join(DEFAULT_SAMPLE_FILE)
    }

    /// Load layer `layer` (0-based)
    pub fn load_layer(&self, layer: usize) -> Result<LayerWeights> {
        let formats = self.config.layer_formats(layer);
        let (in_dim, out_dim) = (self.config.dims[layer], self.config.dims[layer + 1]);

        let weights_path = self.dir.join(weights_file_name(layer));
        let content = read_resource(&weights_path)?;
        let mut weights = Vec::with_capacity(in_dim * out_dim);
        let mut rows = 0;
        for (line, record) in records(&content) {
            let row = parse_row(record, in_dim, formats.weight_format)
                .map_err(|e| e.at(&weights_path, line))?;
            weights.extend(row);
            rows += 1;
        }
        if rows != out_dim {
            return Err(ModelError::RecordCount {
                path: weights_path,
                expected: out_dim,
                got: rows,
            });
        }

        let biases_path = self.dir.join(biases_file_name(layer));
        let content = read_resource(&biases_path)?;
        let biases = records(&content)
            .map(|(line, record)| {
                parse_field(record, formats.bias_format).map_err(|e| e.at(&biases_path, line))
            })
            .collect::<Result<Vec<_>>>()?;
        if biases.len() != out_dim {
            return Err(ModelError::RecordCount {
                path: biases_path,
                expected: out_dim,
                got: biases.len(),
            });
        }

        LayerWeights::new(
            weights,
            biases,
            in_dim,
            out_dim,
            formats,
            ModelWeights::default_activation(&self.config, layer),
        )
    }

    /// Load every layer
    pub fn load_model_weights(&self) -> Result<ModelWeights> {
        let num_layers = self.config.num_layers();
        tracing::info!(
            "Loading {} layers {:?} from {:?}",
            num_layers,
            self.config.dims,
            self.dir
        );

        let mut layers = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            let layer = self.load_layer(i)?;
            tracing::debug!(
                layer = i + 1,
                "Loaded {}x{} weights ({}) and biases ({})",
                layer.out_dim,
                layer.in_dim,
                layer.weight_format,
                layer.bias_format
            );
            layers.push(layer);
        }

        ModelWeights::new(self.config.clone(), layers)
    }

    /// Load labelled samples from `path`
    pub fn load_samples<P: AsRef<Path>>(&self, path: P, mode: LoadMode) -> Result<Dataset> {
        let path = path.as_ref();
        let content = read_resource(path)?;
        let config = &self.config;
        let classes = config.num_classes();

        let mut dataset = Dataset::default();
        for (line, record) in records(&content) {
            let parsed = parse_sample(record, config.input_dim(), config.input_format, config.label_bits)
                .map_err(|e| e.at(path, line))
                .and_then(|(pixels, label)| {
                    if label >= classes {
                        return Err(ModelError::InvalidLabel {
                            path: path.to_path_buf(),
                            line,
                            label,
                            classes,
                        });
                    }
                    Ok(Sample {
                        input: FixedVector::from_raw(pixels, config.input_format)?,
                        label,
                    })
                });

            match (parsed, mode) {
                (Ok(sample), _) => dataset.samples.push(sample),
                (Err(e), LoadMode::BestEffort) => {
                    tracing::warn!("Skipping malformed sample: {}", e);
                    dataset.skipped += 1;
                }
                (Err(e), LoadMode::Strict) => return Err(e),
            }
        }

        tracing::info!(
            "Loaded {} samples from {:?} ({} skipped)",
            dataset.len(),
            path,
            dataset.skipped
        );
        Ok(dataset)
    }
}
