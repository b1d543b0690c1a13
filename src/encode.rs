use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::parse::Record;

pub const CLASS_COUNT: usize = 2;

/// Column of the one-hot label holding `Outcome = 0`.
pub const HEALTHY: usize = 0;

/// Column of the one-hot label holding `Outcome = 1`.
pub const DIABETIC: usize = 1;

/// Row-aligned feature and label matrices. Row `i` of both came from input record `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub features: Array2<f64>,
    pub labels: Array2<f64>,
}

impl Encoded {
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn feature_count(&self) -> usize {
        self.features.ncols()
    }

    /// Number of rows per class, indexed by [`HEALTHY`] and [`DIABETIC`].
    pub fn class_balance(&self) -> [usize; CLASS_COUNT] {
        let mut counts = [0; CLASS_COUNT];
        for label in self.labels.rows() {
            counts[class_of(label)] += 1;
        }
        counts
    }
}

/// `0 -> [1, 0]`, anything else `-> [0, 1]`.
#[allow(clippy::float_cmp)]
pub fn one_hot(outcome: f64) -> [f64; CLASS_COUNT] {
    if outcome == 0.0 {
        [1.0, 0.0]
    } else {
        [0.0, 1.0]
    }
}

/// Index of the largest entry; ties resolve to the lower index.
pub fn class_of(row: ArrayView1<f64>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_value), (i, &value)| {
            if value > best_value {
                (i, value)
            } else {
                (best, best_value)
            }
        })
        .0
}

pub fn encode<S: AsRef<str>>(records: &[Record], feature_names: &[S]) -> Encoded {
    let mut features = Array2::zeros((records.len(), feature_names.len()));
    let mut labels = Array2::zeros((records.len(), CLASS_COUNT));

    for (i, record) in records.iter().enumerate() {
        for (j, name) in feature_names.iter().enumerate() {
            features[(i, j)] = record.get(name.as_ref()).unwrap_or(0.0);
        }

        let label = one_hot(record.outcome().unwrap_or(0.0));
        labels.row_mut(i).assign(&ArrayView1::from(&label));
    }

    Encoded { features, labels }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Standardization {
    pub means: Array1<f64>,
    pub std_devs: Array1<f64>,
}

/// Z-score every feature column in place. Constant columns are only centred.
pub fn standardize(encoded: &mut Encoded) -> Standardization {
    let width = encoded.feature_count();

    let means = encoded
        .features
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(width));
    let std_devs = if encoded.is_empty() {
        Array1::zeros(width)
    } else {
        encoded.features.std_axis(Axis(0), 0.0)
    };

    for mut row in encoded.features.rows_mut() {
        for (j, value) in row.iter_mut().enumerate() {
            *value -= means[j];
            if std_devs[j] > 0.0 {
                *value /= std_devs[j];
            }
        }
    }

    Standardization { means, std_devs }
}
