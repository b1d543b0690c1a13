use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::encode::{class_of, CLASS_COUNT};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initializer {
    #[default]
    GlorotUniform,
    Zeros,
}

/// Loss gradients with the same shapes as the classifier parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

/// One dense layer from `feature_count` inputs to two classes, followed by softmax.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftmaxClassifier {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl SoftmaxClassifier {
    pub fn new(feature_count: usize, initializer: Initializer, seed: u64) -> Self {
        let weights = match initializer {
            Initializer::Zeros => Array2::zeros((feature_count, CLASS_COUNT)),
            Initializer::GlorotUniform => {
                let limit = (6.0 / (feature_count + CLASS_COUNT) as f64).sqrt();
                let mut rng = StdRng::seed_from_u64(seed);
                Array2::from_shape_simple_fn((feature_count, CLASS_COUNT), || {
                    rng.gen_range(-limit..=limit)
                })
            }
        };

        Self {
            weights,
            bias: Array1::zeros(CLASS_COUNT),
        }
    }

    pub fn from_parameters(weights: Array2<f64>, bias: Array1<f64>) -> Result<Self> {
        if weights.ncols() != CLASS_COUNT {
            return Err(Error::DimensionMismatch {
                expected: CLASS_COUNT,
                actual: weights.ncols(),
            });
        }
        if bias.len() != CLASS_COUNT {
            return Err(Error::DimensionMismatch {
                expected: CLASS_COUNT,
                actual: bias.len(),
            });
        }
        Ok(Self { weights, bias })
    }

    pub fn feature_count(&self) -> usize {
        self.weights.nrows()
    }

    pub fn weights(&self) -> ArrayView2<'_, f64> {
        self.weights.view()
    }

    pub fn bias(&self) -> ArrayView1<'_, f64> {
        self.bias.view()
    }

    /// Class probabilities for each row of `features`.
    pub fn predict_proba(&self, features: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_width(features.ncols())?;
        Ok(self.forward(features))
    }

    /// Most probable class per row; ties go to the healthy class.
    pub fn predict(&self, features: ArrayView2<f64>) -> Result<Vec<usize>> {
        let probabilities = self.predict_proba(features)?;
        Ok(probabilities.rows().into_iter().map(class_of).collect())
    }

    pub(crate) fn check_width(&self, width: usize) -> Result<()> {
        if width == self.feature_count() {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected: self.feature_count(),
                actual: width,
            })
        }
    }

    pub(crate) fn forward(&self, features: ArrayView2<f64>) -> Array2<f64> {
        softmax(features.dot(&self.weights) + &self.bias)
    }

    /// Gradient of the batch-mean cross-entropy, using `dL/dz = p - y` for softmax outputs.
    pub(crate) fn gradients(
        features: ArrayView2<f64>,
        probabilities: &Array2<f64>,
        labels: ArrayView2<f64>,
    ) -> Gradients {
        let rows = features.nrows().max(1) as f64;
        let delta = (probabilities - &labels) / rows;

        Gradients {
            weights: features.t().dot(&delta),
            bias: delta.sum_axis(Axis(0)),
        }
    }

    pub(crate) fn parameters_mut(&mut self) -> (&mut Array2<f64>, &mut Array1<f64>) {
        (&mut self.weights, &mut self.bias)
    }
}

/// Row-wise softmax, shifted by each row's maximum for stability.
pub fn softmax(mut logits: Array2<f64>) -> Array2<f64> {
    for mut row in logits.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    logits
}
