//! fixnet CLI
//!
//! Runs integer-only MLP inference over a `.mem` model directory and
//! converts single values to and from fixed-point bit patterns.
//!
//! # Usage
//!
//! ```bash
//! # Accuracy over the directory's test.mem
//! fixnet run --model-dir ./model
//!
//! # Per-layer dump of sample 3
//! fixnet trace --model-dir ./model --index 3
//!
//! # Encode 1.5 as Q8.8 and back
//! fixnet quantize --value 1.5 --total-bits 16 --integer-bits 8
//! fixnet decode --bits 0000000110000000 --integer-bits 8
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fixnet_fixed_point::{decode, encode, to_twos_complement, QFormat};
use fixnet_harness::{LayerTrace, Network};
use fixnet_model::mem::{format_field, parse_field};
use fixnet_model::{Dataset, LoadMode, MemLoader};

#[derive(Parser)]
#[command(name = "fixnet")]
#[command(author = "fixnet Contributors")]
#[command(version)]
#[command(about = "Integer-only fixed-point MLP inference")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every sample and report accuracy
    Run {
        /// Directory holding config.json and the layer .mem files
        #[arg(short, long)]
        model_dir: PathBuf,

        /// Sample file (defaults to test.mem in the model directory)
        #[arg(short, long)]
        samples: Option<PathBuf>,

        /// Evaluate samples on all cores
        #[arg(long, default_value = "false")]
        parallel: bool,

        /// Skip malformed sample records instead of failing
        #[arg(long, default_value = "false")]
        best_effort: bool,
    },

    /// Print every layer intermediate for one sample
    Trace {
        /// Directory holding config.json and the layer .mem files
        #[arg(short, long)]
        model_dir: PathBuf,

        /// Sample file (defaults to test.mem in the model directory)
        #[arg(short, long)]
        samples: Option<PathBuf>,

        /// 0-based sample index
        #[arg(short, long, default_value = "0")]
        index: usize,
    },

    /// Encode a real value in Q(N, X)
    Quantize {
        /// Value to encode
        #[arg(short, long, allow_hyphen_values = true)]
        value: f64,

        /// Total bits N
        #[arg(short, long)]
        total_bits: u32,

        /// Integer bits X, sign included
        #[arg(short, long)]
        integer_bits: u32,
    },

    /// Decode a two's-complement bit string
    Decode {
        /// Bit string, MSB first; its length is N
        #[arg(short, long)]
        bits: String,

        /// Integer bits X, sign included
        #[arg(short, long)]
        integer_bits: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fixnet=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            model_dir,
            samples,
            parallel,
            best_effort,
        } => run_evaluation(&model_dir, samples.as_deref(), parallel, best_effort),
        Commands::Trace {
            model_dir,
            samples,
            index,
        } => run_trace(&model_dir, samples.as_deref(), index),
        Commands::Quantize {
            value,
            total_bits,
            integer_bits,
        } => run_quantize(value, total_bits, integer_bits),
        Commands::Decode { bits, integer_bits } => run_decode(&bits, integer_bits),
    }
}

/// Load the network and the requested sample file
fn load(model_dir: &Path, samples: Option<&Path>, mode: LoadMode) -> Result<(Network, Dataset)> {
    let loader = MemLoader::from_directory(model_dir)
        .with_context(|| format!("loading model config from {}", model_dir.display()))?;
    let network = Network::new(loader.load_model_weights()?)?;

    let samples_path = samples
        .map(Path::to_path_buf)
        .unwrap_or_else(|| loader.default_samples_path());
    let dataset = loader
        .load_samples(&samples_path, mode)
        .with_context(|| format!("loading samples from {}", samples_path.display()))?;

    Ok((network, dataset))
}

fn run_evaluation(
    model_dir: &Path,
    samples: Option<&Path>,
    parallel: bool,
    best_effort: bool,
) -> Result<()> {
    let mode = if best_effort {
        LoadMode::BestEffort
    } else {
        LoadMode::Strict
    };
    let (network, dataset) = load(model_dir, samples, mode)?;

    tracing::info!(
        "Evaluating {} samples{}",
        dataset.len(),
        if parallel { " in parallel" } else { "" }
    );
    let start = Instant::now();
    let report = if parallel {
        network.evaluate_parallel(&dataset.samples)?
    } else {
        network.evaluate(&dataset.samples)?
    };
    let elapsed = start.elapsed();

    println!("Accuracy:    {:.2}%", report.accuracy() * 100.0);
    println!("Correct:     {}/{}", report.correct, report.total);
    println!("Saturations: {}", report.saturations);
    println!("Skipped:     {}", dataset.skipped);
    println!("Elapsed:     {:?}", elapsed);
    Ok(())
}

fn run_trace(model_dir: &Path, samples: Option<&Path>, index: usize) -> Result<()> {
    let (network, dataset) = load(model_dir, samples, LoadMode::Strict)?;
    let Some(sample) = dataset.samples.get(index) else {
        bail!("sample {} out of range ({} samples)", index, dataset.len());
    };

    let trace = network.trace(&sample.input)?;
    let format = trace.input.format();
    println!("Input ({}):", format);
    for (i, &raw) in trace.input.as_slice().iter().enumerate() {
        println!("  [{:3}] {:>12.6}  {}", i, decode(raw, format), format_field(raw, format));
    }

    for (i, layer) in trace.layers.iter().enumerate() {
        print_layer(i, layer);
    }

    let prediction = &trace.prediction;
    println!("\nProbabilities:");
    for (class, p) in prediction.probabilities.iter().enumerate() {
        println!("  [{:3}] {:.6}", class, p);
    }
    println!(
        "Predicted {} (label {}), {} saturations",
        prediction.label, sample.label, prediction.saturations
    );
    Ok(())
}

fn print_layer(index: usize, layer: &LayerTrace) {
    let format = layer.output.values.format();
    let scale = 2f64.powi(layer.accumulator_frac_bits as i32);
    println!(
        "\nLayer {} (accumulator F={}, output {}, {} saturations):",
        index + 1,
        layer.accumulator_frac_bits,
        format,
        layer.output.saturations
    );
    for (o, (&acc, (&pre, &out))) in layer
        .accumulators
        .iter()
        .zip(
            layer
                .requantized
                .as_slice()
                .iter()
                .zip(layer.output.values.as_slice()),
        )
        .enumerate()
    {
        println!(
            "  [{:3}] acc {:>14.6}  pre {:>12.6}  out {:>12.6}  {}",
            o,
            acc as f64 / scale,
            decode(pre, format),
            decode(out, format),
            format_field(out, format)
        );
    }
}

fn run_quantize(value: f64, total_bits: u32, integer_bits: u32) -> Result<()> {
    let format = QFormat::new(total_bits, integer_bits)?;
    let raw = encode(value, format);
    let pattern = to_twos_complement(raw, format);

    println!("Format:   {} (N={}, X={}, F={})", format, total_bits, integer_bits, format.frac_bits());
    println!("Raw:      {}", raw);
    println!("Unsigned: {}", pattern);
    println!("Bits:     {}", format_field(raw, format));
    println!("Decoded:  {}", decode(raw, format));
    if raw == format.max_raw() || raw == format.min_raw() {
        println!("(at the edge of the representable range; the value may have saturated)");
    }
    Ok(())
}

fn run_decode(bits: &str, integer_bits: u32) -> Result<()> {
    let total_bits = u32::try_from(bits.len()).context("bit string too long")?;
    let format = QFormat::new(total_bits, integer_bits)?;
    let raw = parse_field(bits, format)?;

    println!("Format:   {} (N={}, X={}, F={})", format, total_bits, integer_bits, format.frac_bits());
    println!("Raw:      {}", raw);
    println!("Unsigned: {}", to_twos_complement(raw, format));
    println!("Decoded:  {}", decode(raw, format));
    Ok(())
}
