use ndarray::ArrayView2;

use crate::encode::class_of;

/// Probabilities are clipped to `[EPSILON, 1 - EPSILON]` before taking the log.
pub const EPSILON: f64 = 1e-7;

/// Mean categorical cross-entropy over the rows of a batch.
pub fn cross_entropy(probabilities: ArrayView2<f64>, labels: ArrayView2<f64>) -> f64 {
    let rows = probabilities.nrows();
    if rows == 0 {
        return 0.0;
    }

    let total: f64 = probabilities
        .iter()
        .zip(labels.iter())
        .map(|(&p, &y)| -y * p.clamp(EPSILON, 1.0 - EPSILON).ln())
        .sum();

    total / rows as f64
}

/// Rows whose most probable class matches the one-hot label.
pub fn correct_count(probabilities: ArrayView2<f64>, labels: ArrayView2<f64>) -> usize {
    probabilities
        .rows()
        .into_iter()
        .zip(labels.rows())
        .filter(|(predicted, expected)| class_of(*predicted) == class_of(*expected))
        .count()
}

pub fn accuracy(probabilities: ArrayView2<f64>, labels: ArrayView2<f64>) -> f64 {
    let rows = probabilities.nrows();
    if rows == 0 {
        return 0.0;
    }
    correct_count(probabilities, labels) as f64 / rows as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn even_odds_cost_ln_two() {
        let probabilities = array![[0.5, 0.5], [0.5, 0.5]];
        let labels = array![[1.0, 0.0], [0.0, 1.0]];

        let loss = cross_entropy(probabilities.view(), labels.view());
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-12);
    }

    #[test]
    fn certain_predictions_stay_finite() {
        let probabilities = array![[1.0, 0.0]];

        let right = cross_entropy(probabilities.view(), array![[1.0, 0.0]].view());
        let wrong = cross_entropy(probabilities.view(), array![[0.0, 1.0]].view());

        assert!(right < 1e-6);
        assert!(wrong.is_finite());
        assert!((wrong - -(EPSILON.ln())).abs() < 1e-9);
    }

    #[test]
    fn accuracy_compares_argmax_classes() {
        let probabilities = array![[0.9, 0.1], [0.2, 0.8], [0.6, 0.4], [0.3, 0.7]];
        let labels = array![[1.0, 0.0], [0.0, 1.0], [0.0, 1.0], [1.0, 0.0]];

        assert_eq!(correct_count(probabilities.view(), labels.view()), 2);
        assert!((accuracy(probabilities.view(), labels.view()) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_batch_scores_zero() {
        let empty = ndarray::Array2::<f64>::zeros((0, 2));
        assert_eq!(cross_entropy(empty.view(), empty.view()), 0.0);
        assert_eq!(accuracy(empty.view(), empty.view()), 0.0);
    }
}
