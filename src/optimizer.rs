use ndarray::{Array1, Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::model::{Gradients, SoftmaxClassifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

impl OptimizerKind {
    pub fn build(self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            Self::Adam => Box::new(Adam::new(learning_rate)),
            Self::Sgd => Box::new(GradientDescent::new(learning_rate)),
        }
    }
}

pub trait Optimizer: Send {
    fn step(&mut self, classifier: &mut SoftmaxClassifier, gradients: &Gradients);

    fn learning_rate(&self) -> f64;
}

pub struct GradientDescent {
    pub learning_rate: f64,
}

impl GradientDescent {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    fn step(&mut self, classifier: &mut SoftmaxClassifier, gradients: &Gradients) {
        let (weights, bias) = classifier.parameters_mut();

        weights.scaled_add(-self.learning_rate, &gradients.weights);
        bias.scaled_add(-self.learning_rate, &gradients.bias);
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

/// Adam with bias correction folded into the step size.
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    steps: i32,
    weight_moments: Option<(Array2<f64>, Array2<f64>)>,
    bias_moments: Option<(Array1<f64>, Array1<f64>)>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            steps: 0,
            weight_moments: None,
            bias_moments: None,
        }
    }

    pub fn steps(&self) -> i32 {
        self.steps
    }
}

impl Optimizer for Adam {
    fn step(&mut self, classifier: &mut SoftmaxClassifier, gradients: &Gradients) {
        self.steps = self.steps.saturating_add(1);

        let step_size = self.learning_rate * (1.0 - self.beta2.powi(self.steps)).sqrt()
            / (1.0 - self.beta1.powi(self.steps));
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);

        let (weights, bias) = classifier.parameters_mut();

        let (m, v) = self.weight_moments.get_or_insert_with(|| {
            (Array2::zeros(weights.raw_dim()), Array2::zeros(weights.raw_dim()))
        });
        Zip::from(&mut *weights)
            .and(&mut *m)
            .and(&mut *v)
            .and(&gradients.weights)
            .for_each(|w, m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                *w -= step_size * *m / (v.sqrt() + epsilon);
            });

        let (m, v) = self
            .bias_moments
            .get_or_insert_with(|| (Array1::zeros(bias.raw_dim()), Array1::zeros(bias.raw_dim())));
        Zip::from(&mut *bias)
            .and(&mut *m)
            .and(&mut *v)
            .and(&gradients.bias)
            .for_each(|b, m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                *b -= step_size * *m / (v.sqrt() + epsilon);
            });
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}
