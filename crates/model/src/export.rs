//! Writing model directories and sample files in `.mem` layout

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::NetworkConfig;
use crate::error::Result;
use crate::loader::{biases_file_name, weights_file_name, CONFIG_FILE};
use crate::mem::{format_field, format_row, format_sample};
use crate::sample::Sample;
use crate::weights::{LayerWeights, ModelWeights};

/// Write `config.json`
pub fn write_config(dir: &Path, config: &NetworkConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(dir.join(CONFIG_FILE), json)?;
    Ok(())
}

/// Write the weight and bias files of layer `layer` (0-based)
pub fn write_layer(dir: &Path, layer: usize, weights: &LayerWeights) -> Result<()> {
    let mut out = BufWriter::new(File::create(dir.join(weights_file_name(layer)))?);
    for neuron in 0..weights.out_dim {
        writeln!(out, "{}", format_row(weights.row(neuron), weights.weight_format))?;
    }
    out.flush()?;

    let mut out = BufWriter::new(File::create(dir.join(biases_file_name(layer)))?);
    for &bias in &weights.biases {
        writeln!(out, "{}", format_field(bias, weights.bias_format))?;
    }
    out.flush()?;
    Ok(())
}

/// Write a complete model directory, creating it if needed
pub fn export_model(dir: &Path, model: &ModelWeights) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    write_config(dir, &model.config)?;
    for (i, layer) in model.layers.iter().enumerate() {
        write_layer(dir, i, layer)?;
    }
    tracing::info!("Exported {} layers to {:?}", model.num_layers(), dir);
    Ok(())
}

/// Write samples, one record per line, in each sample's input format
pub fn write_samples(path: &Path, samples: &[Sample], label_bits: u32) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for (i, sample) in samples.iter().enumerate() {
        let line = format_sample(
            sample.input.as_slice(),
            sample.label,
            sample.input.format(),
            label_bits,
        )
        .map_err(|e| e.at(path, i + 1))?;
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}
