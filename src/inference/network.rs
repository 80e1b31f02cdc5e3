use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::features::FEATURE_COUNT;

pub const INPUT_WIDTH: usize = FEATURE_COUNT;
pub const CLASS_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Softmax,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "class_name")]
pub enum LayerSpec {
    Dense { units: usize, activation: Activation },
    Dropout { rate: f32 },
}

impl LayerSpec {
    fn same_shape(&self, other: &LayerSpec) -> bool {
        match (self, other) {
            (
                LayerSpec::Dense { units, activation },
                LayerSpec::Dense {
                    units: other_units,
                    activation: other_activation,
                },
            ) => units == other_units && activation == other_activation,
            (LayerSpec::Dropout { rate }, LayerSpec::Dropout { rate: other_rate }) => {
                (rate - other_rate).abs() < 1e-6
            }
            _ => false,
        }
    }
}

/// The only topology the assessment engine accepts.
pub const ARCHITECTURE: [LayerSpec; 6] = [
    LayerSpec::Dense {
        units: 64,
        activation: Activation::Relu,
    },
    LayerSpec::Dropout { rate: 0.2 },
    LayerSpec::Dense {
        units: 32,
        activation: Activation::Relu,
    },
    LayerSpec::Dropout { rate: 0.2 },
    LayerSpec::Dense {
        units: 16,
        activation: Activation::Relu,
    },
    LayerSpec::Dense {
        units: CLASS_COUNT,
        activation: Activation::Softmax,
    },
];

pub fn matches_architecture(layers: &[LayerSpec]) -> bool {
    layers.len() == ARCHITECTURE.len()
        && layers
            .iter()
            .zip(ARCHITECTURE.iter())
            .all(|(layer, expected)| layer.same_shape(expected))
}

pub fn architecture_summary() -> String {
    let mut widths = vec![INPUT_WIDTH.to_string()];
    for layer in ARCHITECTURE {
        if let LayerSpec::Dense { units, .. } = layer {
            widths.push(units.to_string());
        }
    }
    widths.join("-")
}

#[derive(Debug, Clone)]
pub struct DenseLayer {
    /// `[inputs, units]`
    pub kernel: Array2<f32>,
    pub bias: Array1<f32>,
    pub activation: Activation,
}

#[derive(Debug, Clone)]
enum Layer {
    Dense(DenseLayer),
    /// Identity at inference time.
    Dropout,
}

/// Feed-forward CTG classifier. Immutable once built.
#[derive(Debug, Clone)]
pub struct Classifier {
    layers: Vec<Layer>,
}

impl Classifier {
    /// Assembles a classifier from `(kernel, bias)` pairs, one per dense layer
    /// in [`ARCHITECTURE`] order.
    pub fn from_dense(weights: Vec<(Array2<f32>, Array1<f32>)>) -> EngineResult<Self> {
        let mut weights = weights.into_iter();
        let mut layers = Vec::with_capacity(ARCHITECTURE.len());
        let mut fan_in = INPUT_WIDTH;

        for spec in ARCHITECTURE {
            match spec {
                LayerSpec::Dropout { .. } => layers.push(Layer::Dropout),
                LayerSpec::Dense { units, activation } => {
                    let (kernel, bias) = weights.next().ok_or_else(|| {
                        EngineError::ModelLoad("missing weights for dense layer".into())
                    })?;
                    if kernel.dim() != (fan_in, units) || bias.len() != units {
                        return Err(EngineError::ModelLoad(format!(
                            "dense layer expects kernel [{fan_in}, {units}] and bias [{units}], got {:?} and [{}]",
                            kernel.dim(),
                            bias.len()
                        )));
                    }
                    if kernel.iter().chain(bias.iter()).any(|w| !w.is_finite()) {
                        return Err(EngineError::ModelLoad("non-finite weight".into()));
                    }
                    layers.push(Layer::Dense(DenseLayer {
                        kernel,
                        bias,
                        activation,
                    }));
                    fan_in = units;
                }
            }
        }

        if weights.next().is_some() {
            return Err(EngineError::ModelLoad(
                "more weight tensors than dense layers".into(),
            ));
        }

        Ok(Self { layers })
    }

    /// Same topology with Glorot-uniform kernels and zero biases.
    pub fn untrained<R: Rng>(rng: &mut R) -> Self {
        let mut layers = Vec::with_capacity(ARCHITECTURE.len());
        let mut fan_in = INPUT_WIDTH;

        for spec in ARCHITECTURE {
            match spec {
                LayerSpec::Dropout { .. } => layers.push(Layer::Dropout),
                LayerSpec::Dense { units, activation } => {
                    let limit = (6.0 / (fan_in + units) as f32).sqrt();
                    let kernel =
                        Array2::from_shape_fn((fan_in, units), |_| rng.gen_range(-limit..limit));
                    layers.push(Layer::Dense(DenseLayer {
                        kernel,
                        bias: Array1::zeros(units),
                        activation,
                    }));
                    fan_in = units;
                }
            }
        }

        Self { layers }
    }

    pub fn dense_layers(&self) -> impl Iterator<Item = &DenseLayer> {
        self.layers.iter().filter_map(|layer| match layer {
            Layer::Dense(dense) => Some(dense),
            Layer::Dropout => None,
        })
    }

    /// Runs one forward pass. Intermediate activations live only for the call.
    pub fn forward(&self, input: &[f32; INPUT_WIDTH]) -> Array1<f32> {
        let mut x = Array1::from(input.to_vec());
        for layer in &self.layers {
            if let Layer::Dense(dense) = layer {
                x = x.dot(&dense.kernel) + &dense.bias;
                apply_activation(&mut x, dense.activation);
            }
        }
        x
    }
}

fn apply_activation(x: &mut Array1<f32>, activation: Activation) {
    match activation {
        Activation::Relu => x.mapv_inplace(|v| v.max(0.0)),
        Activation::Softmax => {
            let max = x.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
            x.mapv_inplace(|v| (v - max).exp());
            let sum = x.sum();
            if sum > 0.0 {
                x.mapv_inplace(|v| v / sum);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn untrained_output_is_a_distribution() {
        let mut rng = StdRng::seed_from_u64(7);
        let classifier = Classifier::untrained(&mut rng);
        let input = [1.5f32; INPUT_WIDTH];

        let output = classifier.forward(&input);
        assert_eq!(output.len(), CLASS_COUNT);
        assert!((output.sum() - 1.0).abs() < 1e-4);
        assert!(output.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn softmax_survives_large_logits() {
        let mut logits = Array1::from(vec![1000.0f32, 999.0, -1000.0]);
        apply_activation(&mut logits, Activation::Softmax);
        assert!(logits.iter().all(|p| p.is_finite()));
        assert!((logits.sum() - 1.0).abs() < 1e-4);
        assert!(logits[0] > logits[1]);
    }

    #[test]
    fn from_dense_rejects_wrong_shapes() {
        let weights = vec![(Array2::zeros((20, 64)), Array1::zeros(64))];
        assert!(matches!(
            Classifier::from_dense(weights),
            Err(EngineError::ModelLoad(_))
        ));
    }

    #[test]
    fn from_dense_rejects_missing_layers() {
        let weights = vec![(Array2::zeros((21, 64)), Array1::zeros(64))];
        assert!(Classifier::from_dense(weights).is_err());
    }

    #[test]
    fn summary_lists_dense_widths() {
        assert_eq!(architecture_summary(), "21-64-32-16-3");
        assert!(matches_architecture(&ARCHITECTURE));
        assert!(!matches_architecture(&ARCHITECTURE[..5]));
    }
}
