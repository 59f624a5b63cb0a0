//! fixnet Integration Tests
//!
//! End-to-end scenarios over hand-built networks and model directories

use fixnet_fixed_point::{decode, FixedVector, QFormat};
use fixnet_harness::{evaluate, evaluate_neuron, Network};
use fixnet_model::{
    export_model, mem::pixel_to_fixed, write_samples, Activation, LayerFormats, LayerWeights,
    LoadMode, MemLoader, ModelError, ModelWeights, NetworkConfig, Sample,
};

fn q(total_bits: u32, integer_bits: u32) -> QFormat {
    QFormat::new(total_bits, integer_bits).unwrap()
}

/// Build a network whose every layer uses the config's global formats
fn build_model(config: NetworkConfig, layers: &[(Vec<f64>, Vec<f64>)]) -> ModelWeights {
    let layers = layers
        .iter()
        .enumerate()
        .map(|(i, (weights, biases))| {
            LayerWeights::from_f64(
                weights,
                biases,
                config.dims[i],
                config.dims[i + 1],
                config.layer_formats(i),
                ModelWeights::default_activation(&config, i),
            )
            .unwrap()
        })
        .collect();
    ModelWeights::new(config, layers).unwrap()
}

fn sample(values: &[f64], format: QFormat, label: usize) -> Sample {
    Sample {
        input: FixedVector::from_f64_slice(values, format),
        label,
    }
}

/// Deterministic pseudo-random weights in [-1, 1)
fn pattern(len: usize, seed: usize) -> Vec<f64> {
    (0..len)
        .map(|i| ((i * 37 + seed * 11) % 64) as f64 / 32.0 - 1.0)
        .collect()
}

// =============================================================================
// Section 1: Saturation Scenarios
// =============================================================================

mod saturation_tests {
    use super::*;

    fn two_input_config(format: QFormat, bias_format: QFormat) -> NetworkConfig {
        NetworkConfig {
            dims: vec![2, 1],
            input_format: format,
            activation_format: format,
            weight_format: format,
            bias_format,
            label_bits: 1,
            ..Default::default()
        }
    }

    /// 1.0 * 1.5 + 1.0 * 1.5 = 3.0 does not fit Q2.2 and clamps to 1.75
    #[test]
    fn test_narrow_format_saturates() {
        let format = q(4, 2);
        let model = build_model(
            two_input_config(format, q(8, 4)),
            &[(vec![1.5, 1.5], vec![0.0])],
        );
        assert_eq!(model.layers[0].weights, vec![6, 6]);
        let network = Network::new(model).unwrap();

        let prediction = network
            .predict(&FixedVector::from_f64_slice(&[1.0, 1.0], format))
            .unwrap();
        assert_eq!(prediction.logits.as_slice(), &[7]);
        assert_eq!(prediction.logits.to_f64_vec(), vec![1.75]);
        assert_eq!(prediction.saturations, 1);
        assert_eq!(prediction.label, 0);
        assert_eq!(prediction.probabilities, vec![1.0]);
    }

    /// The same network in Q4.4 represents 3.0 exactly
    #[test]
    fn test_wide_format_is_exact() {
        let format = q(8, 4);
        let network = Network::new(build_model(
            two_input_config(format, q(16, 8)),
            &[(vec![1.5, 1.5], vec![0.0])],
        ))
        .unwrap();

        let trace = network
            .trace(&FixedVector::from_f64_slice(&[1.0, 1.0], format))
            .unwrap();
        // 16 * 24 + 16 * 24 at eight fractional bits
        assert_eq!(trace.layers[0].accumulators, vec![768]);
        assert_eq!(trace.layers[0].accumulator_frac_bits, 8);
        assert_eq!(trace.prediction.logits.as_slice(), &[48]);
        assert_eq!(trace.prediction.logits.to_f64_vec(), vec![3.0]);
        assert_eq!(trace.prediction.saturations, 0);
    }

    #[test]
    fn test_saturated_input_is_counted() {
        let config = NetworkConfig {
            dims: vec![1, 1],
            input_format: QFormat::Q16_16,
            activation_format: QFormat::Q8_8,
            weight_format: QFormat::Q8_8,
            bias_format: QFormat::Q16_16,
            label_bits: 1,
            ..Default::default()
        };
        let network = Network::new(build_model(config, &[(vec![0.0], vec![0.0])])).unwrap();

        let prediction = network
            .predict(&FixedVector::from_f64_slice(&[1000.0], QFormat::Q16_16))
            .unwrap();
        assert_eq!(prediction.saturations, 1);
        assert_eq!(prediction.logits.to_f64_vec(), vec![0.0]);
    }
}

// =============================================================================
// Section 2: Zero-Weight Networks
// =============================================================================

mod bias_only_tests {
    use super::*;

    fn config() -> NetworkConfig {
        NetworkConfig {
            dims: vec![4, 3, 2],
            input_format: QFormat::Q8_8,
            activation_format: QFormat::Q8_8,
            weight_format: QFormat::Q8_8,
            bias_format: QFormat::Q16_16,
            label_bits: 1,
            ..Default::default()
        }
    }

    /// With zero weights every output is the requantized bias
    #[test]
    fn test_outputs_equal_bias() {
        let network = Network::new(build_model(
            config(),
            &[
                (vec![0.0; 12], vec![0.5, -0.25, 1.0]),
                (vec![0.0; 6], vec![0.75, -1.5]),
            ],
        ))
        .unwrap();

        let inputs = [
            [0.0, 0.0, 0.0, 0.0],
            [1.0, -2.0, 3.5, 0.25],
            [-127.0, 127.0, 64.5, -0.125],
        ];
        for values in inputs {
            let trace = network
                .trace(&FixedVector::from_f64_slice(&values, QFormat::Q8_8))
                .unwrap();
            // ReLU applies to the hidden layer only
            assert_eq!(trace.layers[0].requantized.to_f64_vec(), vec![0.5, -0.25, 1.0]);
            assert_eq!(trace.layers[0].output.values.to_f64_vec(), vec![0.5, 0.0, 1.0]);
            assert_eq!(trace.prediction.logits.to_f64_vec(), vec![0.75, -1.5]);
            assert_eq!(trace.prediction.label, 0);
            assert_eq!(trace.prediction.saturations, 0);
        }
    }
}

// =============================================================================
// Section 3: Accuracy
// =============================================================================

mod accuracy_tests {
    use super::*;

    fn identity_network() -> Network {
        let config = NetworkConfig {
            dims: vec![2, 2],
            input_format: QFormat::Q8_8,
            activation_format: QFormat::Q8_8,
            weight_format: QFormat::Q8_8,
            bias_format: QFormat::Q16_16,
            label_bits: 1,
            ..Default::default()
        };
        Network::new(build_model(
            config,
            &[(vec![1.0, 0.0, 0.0, 1.0], vec![0.0, 0.0])],
        ))
        .unwrap()
    }

    #[test]
    fn test_accuracy_matches_correct_over_total() {
        let network = identity_network();
        let samples = vec![
            sample(&[1.0, 0.0], QFormat::Q8_8, 0),
            sample(&[0.0, 1.0], QFormat::Q8_8, 1),
            sample(&[0.2, 0.9], QFormat::Q8_8, 0),
            sample(&[0.9, 0.1], QFormat::Q8_8, 0),
        ];

        let report = network.evaluate(&samples).unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.correct, 3);
        assert_eq!(report.accuracy(), 0.75);
    }

    #[test]
    fn test_tie_picks_lowest_index() {
        let network = identity_network();
        let prediction = network
            .predict(&FixedVector::from_f64_slice(&[0.5, 0.5], QFormat::Q8_8))
            .unwrap();
        assert_eq!(prediction.label, 0);
        assert_eq!(prediction.probabilities, vec![0.5, 0.5]);
    }

    #[test]
    fn test_empty_sample_set() {
        let report = identity_network().evaluate(&[]).unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.accuracy(), 0.0);
    }

    #[test]
    fn test_wrong_input_shape() {
        let network = identity_network();
        assert!(network
            .predict(&FixedVector::from_f64_slice(&[1.0], QFormat::Q8_8))
            .is_err());
        assert!(network
            .predict(&FixedVector::from_f64_slice(&[1.0, 0.0], QFormat::Q16_16))
            .is_err());
    }
}

// =============================================================================
// Section 4: Determinism
// =============================================================================

mod determinism_tests {
    use super::*;
    use proptest::prelude::*;

    fn network() -> Network {
        let config = NetworkConfig {
            dims: vec![8, 6, 4, 3],
            label_bits: 2,
            ..Default::default()
        };
        Network::new(build_model(
            config,
            &[
                (pattern(48, 1), pattern(6, 2)),
                (pattern(24, 3), pattern(4, 4)),
                (pattern(12, 5), pattern(3, 6)),
            ],
        ))
        .unwrap()
    }

    fn samples(count: usize) -> Vec<Sample> {
        (0..count)
            .map(|i| sample(&pattern(8, i + 100), QFormat::Q16_16, i % 3))
            .collect()
    }

    #[test]
    fn test_repeated_runs_identical() {
        let network = network();
        let samples = samples(16);
        for s in &samples {
            assert_eq!(
                network.predict(&s.input).unwrap(),
                network.predict(&s.input).unwrap()
            );
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let network = network();
        let samples = samples(64);
        assert_eq!(
            network.evaluate(&samples).unwrap(),
            network.evaluate_parallel(&samples).unwrap()
        );
    }

    #[test]
    fn test_reversed_neuron_order() {
        let network = network();
        let format = network.model().config.activation_format;
        let trace = network.trace(&samples(1)[0].input).unwrap();

        let mut x = trace.input.clone();
        for (layer, layer_trace) in network.model().layers.iter().zip(&trace.layers) {
            let mut reversed: Vec<i64> = (0..layer.out_dim)
                .rev()
                .map(|o| evaluate_neuron(&x, layer, o, format).unwrap().value)
                .collect();
            reversed.reverse();
            assert_eq!(reversed.as_slice(), layer_trace.output.values.as_slice());
            x = evaluate(&x, layer, format).unwrap().values;
        }
    }

    #[test]
    fn test_trace_matches_predict() {
        let network = network();
        for s in samples(8) {
            let trace = network.trace(&s.input).unwrap();
            assert_eq!(trace.prediction, network.predict(&s.input).unwrap());
            assert_eq!(trace.layers.len(), 3);
        }
    }

    proptest! {
        #[test]
        fn prop_parallel_matches_sequential(
            inputs in prop::collection::vec(prop::collection::vec(-4.0f64..4.0, 8), 1..16)
        ) {
            let network = network();
            let samples: Vec<Sample> = inputs
                .iter()
                .enumerate()
                .map(|(i, v)| sample(v, QFormat::Q16_16, i % 3))
                .collect();
            prop_assert_eq!(
                network.evaluate(&samples).unwrap(),
                network.evaluate_parallel(&samples).unwrap()
            );
        }
    }
}

// =============================================================================
// Section 5: ReLU
// =============================================================================

mod relu_tests {
    use super::*;

    #[test]
    fn test_hidden_outputs_non_negative() {
        let config = NetworkConfig {
            dims: vec![3, 5, 2],
            input_format: QFormat::Q8_8,
            activation_format: QFormat::Q8_8,
            weight_format: QFormat::Q8_8,
            bias_format: QFormat::Q16_16,
            label_bits: 1,
            ..Default::default()
        };
        let network = Network::new(build_model(
            config,
            &[(pattern(15, 7), pattern(5, 8)), (pattern(10, 9), pattern(2, 10))],
        ))
        .unwrap();

        let trace = network
            .trace(&FixedVector::from_f64_slice(&[0.5, -1.0, 2.0], QFormat::Q8_8))
            .unwrap();
        let hidden = &trace.layers[0];
        assert_eq!(hidden.output.values.len(), 5);
        assert!(hidden.requantized.as_slice().iter().any(|&v| v < 0));
        for (&pre, &post) in hidden
            .requantized
            .as_slice()
            .iter()
            .zip(hidden.output.values.as_slice())
        {
            assert_eq!(post, pre.max(0));
        }
    }

    #[test]
    fn test_output_layer_keeps_negative_logits() {
        let config = NetworkConfig {
            dims: vec![1, 2],
            input_format: QFormat::Q8_8,
            activation_format: QFormat::Q8_8,
            weight_format: QFormat::Q8_8,
            bias_format: QFormat::Q16_16,
            label_bits: 1,
            ..Default::default()
        };
        let model = build_model(config, &[(vec![-1.0, -2.0], vec![0.0, 0.0])]);
        assert_eq!(model.layers[0].activation, Activation::Softmax);
        let network = Network::new(model).unwrap();

        let prediction = network
            .predict(&FixedVector::from_f64_slice(&[1.0], QFormat::Q8_8))
            .unwrap();
        assert_eq!(prediction.logits.to_f64_vec(), vec![-1.0, -2.0]);
        assert_eq!(prediction.label, 0);
    }
}

// =============================================================================
// Section 6: Model Directories
// =============================================================================

mod model_directory_tests {
    use super::*;
    use tempfile::tempdir;

    fn default_model() -> ModelWeights {
        let config = NetworkConfig::default();
        build_model(
            config,
            &[
                (pattern(64 * 50, 1), pattern(50, 2)),
                (pattern(50 * 30, 3), pattern(30, 4)),
                (pattern(30 * 10, 5), pattern(10, 6)),
            ],
        )
    }

    fn pixel_samples(count: usize, format: QFormat) -> Vec<Sample> {
        (0..count)
            .map(|i| Sample {
                input: FixedVector::from_raw(
                    (0..64)
                        .map(|p| pixel_to_fixed(((p * 7 + i * 13) % 256) as u8, format))
                        .collect(),
                    format,
                )
                .unwrap(),
                label: i % 10,
            })
            .collect()
    }

    #[test]
    fn test_default_topology_from_disk() {
        let dir = tempdir().unwrap();
        let model = default_model();
        export_model(dir.path(), &model).unwrap();
        let samples = pixel_samples(20, model.config.input_format);
        write_samples(&dir.path().join("test.mem"), &samples, 4).unwrap();

        let loader = MemLoader::from_directory(dir.path()).unwrap();
        let loaded = Network::new(loader.load_model_weights().unwrap()).unwrap();
        let dataset = loader
            .load_samples(loader.default_samples_path(), LoadMode::Strict)
            .unwrap();
        assert_eq!(dataset.samples, samples);

        let in_memory = Network::new(model).unwrap();
        assert_eq!(
            loaded.evaluate(&dataset.samples).unwrap(),
            in_memory.evaluate(&samples).unwrap()
        );
        for s in &samples {
            let prediction = loaded.predict(&s.input).unwrap();
            assert_eq!(prediction.probabilities.len(), 10);
            assert!((prediction.probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_default_accumulator_budget() {
        let mut config = NetworkConfig::default();
        assert_eq!(config.required_accumulator_bits(0).unwrap(), 57);

        config.accumulator_bits = 56;
        assert!(matches!(
            config.validate(),
            Err(ModelError::AccumulatorOverflowRisk {
                required: 57,
                available: 56,
                ..
            })
        ));
    }

    #[test]
    fn test_bias_coarser_than_product_rejected() {
        let config = NetworkConfig {
            dims: vec![2, 2],
            layers: vec![LayerFormats {
                weight_format: QFormat::Q16_16,
                bias_format: q(32, 24),
            }],
            label_bits: 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ModelError::BiasAlignment {
                bias_frac_bits: 8,
                product_frac_bits: 24,
                ..
            })
        ));
    }

    #[test]
    fn test_missing_layer_file() {
        let dir = tempdir().unwrap();
        export_model(dir.path(), &default_model()).unwrap();
        std::fs::remove_file(dir.path().join("layer3_weights.mem")).unwrap();

        let loader = MemLoader::from_directory(dir.path()).unwrap();
        assert!(matches!(
            loader.load_model_weights(),
            Err(ModelError::MissingResource { .. })
        ));
    }

    #[test]
    fn test_decoded_logits_match_raw() {
        let model = default_model();
        let format = model.config.activation_format;
        let network = Network::new(model).unwrap();
        let s = &pixel_samples(1, network.model().config.input_format)[0];

        let prediction = network.predict(&s.input).unwrap();
        let decoded: Vec<f64> = prediction
            .logits
            .as_slice()
            .iter()
            .map(|&raw| decode(raw, format))
            .collect();
        assert_eq!(decoded, prediction.logits.to_f64_vec());
    }
}
