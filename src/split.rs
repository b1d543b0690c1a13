use ndarray::{Array2, ArrayView2, Axis, Slice};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::info;

use crate::encode::Encoded;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitOptions {
    /// Fraction of rows held out for validation, strictly between 0 and 1.
    pub test_size: f64,
    pub batch_size: usize,
    pub seed: u64,
    /// Start validation at the split index instead of one past it.
    pub keep_boundary_row: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            test_size: 0.1,
            batch_size: 16,
            seed: 42,
            keep_boundary_row: false,
        }
    }
}

impl SplitOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "test size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be > 0".to_owned()));
        }
        Ok(())
    }
}

/// Rows owned in their final (shuffled) order, handed out in fixed-size batches.
/// Iterating never copies or reorders rows, so a stream can be walked any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStream {
    features: Array2<f64>,
    labels: Array2<f64>,
    row_indices: Vec<usize>,
    batch_size: usize,
}

impl BatchStream {
    pub fn new(features: Array2<f64>, labels: Array2<f64>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be > 0".to_owned()));
        }
        if features.nrows() != labels.nrows() {
            return Err(Error::InvalidConfig(format!(
                "{} feature rows but {} label rows",
                features.nrows(),
                labels.nrows()
            )));
        }

        let row_indices = (0..features.nrows()).collect();

        Ok(Self {
            features,
            labels,
            row_indices,
            batch_size,
        })
    }

    fn select(encoded: &Encoded, rows: &[usize], batch_size: usize) -> Self {
        Self {
            features: encoded.features.select(Axis(0), rows),
            labels: encoded.labels.select(Axis(0), rows),
            row_indices: rows.to_vec(),
            batch_size,
        }
    }

    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn feature_count(&self) -> usize {
        self.features.ncols()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batch_count(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    /// Pre-shuffle position of every row, in stream order.
    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn labels(&self) -> ArrayView2<'_, f64> {
        self.labels.view()
    }

    /// Starts a fresh pass from the first batch.
    pub fn batches(&self) -> Batches<'_> {
        Batches {
            stream: self,
            start: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub features: ArrayView2<'a, f64>,
    pub labels: ArrayView2<'a, f64>,
}

impl Batch<'_> {
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Batches<'a> {
    stream: &'a BatchStream,
    start: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let stream = self.stream;
        let total = stream.len();
        if self.start >= total {
            return None;
        }

        let end = (self.start + stream.batch_size).min(total);
        let batch = Batch {
            features: stream.features.slice_axis(Axis(0), Slice::from(self.start..end)),
            labels: stream.labels.slice_axis(Axis(0), Slice::from(self.start..end)),
        };
        self.start = end;

        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .stream
            .len()
            .saturating_sub(self.start)
            .div_ceil(self.stream.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches<'_> {}

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: BatchStream,
    pub validation: BatchStream,
    /// Original index of the row sitting at the split boundary when it is left out.
    pub dropped_row: Option<usize>,
}

/// `k = floor((1 - test_size) * N)`; train gets shuffled rows `[0, k)`, validation
/// `[k + 1, N)`, or `[k, N)` when `keep_boundary_row` is set.
pub fn split(encoded: &Encoded, options: &SplitOptions) -> Result<Split> {
    options.validate()?;

    let total = encoded.len();
    if total == 0 {
        return Err(Error::EmptyDataset { stage: "split" });
    }

    let mut order: Vec<usize> = (0..total).collect();
    let mut rng = StdRng::seed_from_u64(options.seed);
    order.shuffle(&mut rng);

    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    let split_index = (((1.0 - options.test_size) * total as f64).floor() as usize).min(total);

    let (validation_start, dropped_row) = if options.keep_boundary_row || split_index == total {
        (split_index, None)
    } else {
        (split_index + 1, Some(order[split_index]))
    };

    let train = BatchStream::select(encoded, &order[..split_index], options.batch_size);
    let validation = BatchStream::select(encoded, &order[validation_start..], options.batch_size);

    info!(
        rows = total,
        split_index,
        train_rows = train.len(),
        validation_rows = validation.len(),
        dropped_row = ?dropped_row,
        "dataset split"
    );

    Ok(Split {
        train,
        validation,
        dropped_row,
    })
}
