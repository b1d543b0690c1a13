//! Fitting a [`SoftmaxClassifier`] against a pair of batch streams.
//!
//! The trainer moves through three compile-time states:
//!
//! - [`Uninitialized`]: feature count and hyperparameters are known, no weights exist.
//! - [`Compiled`]: weights are initialized and the optimizer is attached.
//! - [`TrainedModel`]: returned by [`Trainer::fit`]; weights are frozen and only
//!   inference is available.
//!
//! Every completed epoch produces one [`EpochRecord`], pushed to the caller's
//! [`EpochSink`] and kept in the model's history.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use tracing::{debug, info, info_span, warn};

use crate::error::{Error, Result};
use crate::loss::{correct_count, cross_entropy};
use crate::model::{Initializer, SoftmaxClassifier};
use crate::optimizer::{Optimizer, OptimizerKind};
use crate::split::BatchStream;

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    pub initializer: Initializer,
    /// Seeds the weight initializer.
    pub seed: u64,
    /// Checked once per epoch boundary; setting it stops the fit with [`Error::Cancelled`].
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            learning_rate: 0.001,
            optimizer: OptimizerKind::Adam,
            initializer: Initializer::GlorotUniform,
            seed: 42,
            stop_flag: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f64,
    pub acc: f64,
    pub val_loss: f64,
    pub val_acc: f64,
}

pub trait EpochSink {
    fn record(&mut self, record: &EpochRecord);
}

impl EpochSink for Vec<EpochRecord> {
    fn record(&mut self, record: &EpochRecord) {
        self.push(*record);
    }
}

impl EpochSink for mpsc::Sender<EpochRecord> {
    fn record(&mut self, record: &EpochRecord) {
        // a dropped receiver only means nobody is watching
        let _ = self.send(*record);
    }
}

impl<S: EpochSink + ?Sized> EpochSink for &mut S {
    fn record(&mut self, record: &EpochRecord) {
        (**self).record(record);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EpochSink for NoopSink {
    fn record(&mut self, _record: &EpochRecord) {}
}

pub struct Uninitialized;

pub struct Compiled {
    classifier: SoftmaxClassifier,
    optimizer: Box<dyn Optimizer>,
}

pub struct Trainer<S> {
    feature_count: usize,
    config: TrainConfig,
    state: S,
}

impl<S> Trainer<S> {
    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }
}

impl Trainer<Uninitialized> {
    pub fn new(feature_count: usize, config: TrainConfig) -> Result<Self> {
        if feature_count == 0 {
            return Err(Error::InvalidConfig("feature count must be > 0".to_owned()));
        }
        if config.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        if !(config.learning_rate.is_finite() && config.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {}",
                config.learning_rate
            )));
        }

        Ok(Self {
            feature_count,
            config,
            state: Uninitialized,
        })
    }

    pub fn compile(self) -> Trainer<Compiled> {
        let classifier =
            SoftmaxClassifier::new(self.feature_count, self.config.initializer, self.config.seed);
        let optimizer = self.config.optimizer.build(self.config.learning_rate);

        info!(
            feature_count = self.feature_count,
            optimizer = ?self.config.optimizer,
            learning_rate = self.config.learning_rate,
            initializer = ?self.config.initializer,
            "model compiled"
        );

        Trainer {
            feature_count: self.feature_count,
            config: self.config,
            state: Compiled {
                classifier,
                optimizer,
            },
        }
    }
}

impl Trainer<Compiled> {
    pub fn classifier(&self) -> &SoftmaxClassifier {
        &self.state.classifier
    }

    /// Width and emptiness checks for a stream pair, without touching any weight.
    /// `fit` runs the same checks before its first epoch.
    pub fn check_streams(&self, train: &BatchStream, validation: &BatchStream) -> Result<()> {
        self.check_stream(train, "training")?;
        self.check_stream(validation, "validation")
    }

    /// Runs the configured number of epochs.
    ///
    /// The trainer only learns the data's width here, so this is where a feature
    /// count that disagrees with the one given to [`Trainer::new`] is reported, as
    /// [`Error::DimensionMismatch`], before any epoch runs or any record is emitted.
    pub fn fit<K: EpochSink>(
        self,
        train: &BatchStream,
        validation: &BatchStream,
        mut sink: K,
    ) -> Result<TrainedModel> {
        self.check_streams(train, validation)?;

        let Compiled {
            mut classifier,
            mut optimizer,
        } = self.state;
        let mut history = Vec::with_capacity(self.config.epochs);

        info!(
            epochs = self.config.epochs,
            train_rows = train.len(),
            train_batches = train.batch_count(),
            validation_rows = validation.len(),
            "training started"
        );

        for epoch in 0..self.config.epochs {
            if is_stopped(self.config.stop_flag.as_ref()) {
                info!(completed_epochs = epoch, "training cancelled");
                return Err(Error::Cancelled {
                    completed_epochs: epoch,
                });
            }

            let _span = info_span!("epoch", epoch).entered();

            let (loss, acc) = train_epoch(&mut classifier, optimizer.as_mut(), train);
            let (val_loss, val_acc) = measure(&classifier, validation);

            if let Some(bad) = [loss, val_loss].into_iter().find(|l| !l.is_finite()) {
                warn!(epoch, loss = bad, "loss is no longer finite");
                return Err(Error::NumericDivergence { epoch, loss: bad });
            }

            let record = EpochRecord {
                epoch,
                loss,
                acc,
                val_loss,
                val_acc,
            };
            debug!(loss, acc, val_loss, val_acc, "epoch finished");

            sink.record(&record);
            history.push(record);
        }

        if let Some(last) = history.last() {
            info!(
                loss = last.loss,
                acc = last.acc,
                val_loss = last.val_loss,
                val_acc = last.val_acc,
                "training finished"
            );
        }

        Ok(TrainedModel {
            classifier,
            history,
        })
    }

    fn check_stream(&self, stream: &BatchStream, stage: &'static str) -> Result<()> {
        self.state.classifier.check_width(stream.feature_count())?;
        if stream.is_empty() {
            return Err(Error::EmptyDataset { stage });
        }
        Ok(())
    }
}

fn is_stopped(flag: Option<&Arc<AtomicBool>>) -> bool {
    flag.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

/// One pass over `stream`, stepping the optimizer after every batch. Loss and
/// accuracy come from the forward pass that produced each step.
fn train_epoch(
    classifier: &mut SoftmaxClassifier,
    optimizer: &mut dyn Optimizer,
    stream: &BatchStream,
) -> (f64, f64) {
    let mut loss_sum = 0.0;
    let mut correct = 0;

    for batch in stream.batches() {
        let probabilities = classifier.forward(batch.features);

        loss_sum += cross_entropy(probabilities.view(), batch.labels) * batch.len() as f64;
        correct += correct_count(probabilities.view(), batch.labels);

        let gradients = SoftmaxClassifier::gradients(batch.features, &probabilities, batch.labels);
        optimizer.step(classifier, &gradients);
    }

    let rows = stream.len() as f64;
    (loss_sum / rows, correct as f64 / rows)
}

fn measure(classifier: &SoftmaxClassifier, stream: &BatchStream) -> (f64, f64) {
    let mut loss_sum = 0.0;
    let mut correct = 0;

    for batch in stream.batches() {
        let probabilities = classifier.forward(batch.features);
        loss_sum += cross_entropy(probabilities.view(), batch.labels) * batch.len() as f64;
        correct += correct_count(probabilities.view(), batch.labels);
    }

    let rows = stream.len().max(1) as f64;
    (loss_sum / rows, correct as f64 / rows)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

/// Frozen weights plus the full per-epoch history of the fit that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    classifier: SoftmaxClassifier,
    history: Vec<EpochRecord>,
}

impl TrainedModel {
    pub fn classifier(&self) -> &SoftmaxClassifier {
        &self.classifier
    }

    pub fn history(&self) -> &[EpochRecord] {
        &self.history
    }

    pub fn final_record(&self) -> Option<&EpochRecord> {
        self.history.last()
    }

    pub fn predict(&self, features: ndarray::ArrayView2<f64>) -> Result<Vec<usize>> {
        self.classifier.predict(features)
    }

    pub fn evaluate(&self, stream: &BatchStream) -> Result<Evaluation> {
        self.classifier.check_width(stream.feature_count())?;
        if stream.is_empty() {
            return Err(Error::EmptyDataset {
                stage: "evaluation",
            });
        }

        let (loss, accuracy) = measure(&self.classifier, stream);
        Ok(Evaluation { loss, accuracy })
    }

    pub fn into_parts(self) -> (SoftmaxClassifier, Vec<EpochRecord>) {
        (self.classifier, self.history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> BatchStream {
        BatchStream::new(array![[-1.0], [1.0]], array![[1.0, 0.0], [0.0, 1.0]], 2).expect("stream")
    }

    fn config(epochs: usize) -> TrainConfig {
        TrainConfig {
            epochs,
            initializer: Initializer::Zeros,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn rejects_invalid_hyperparameters() {
        assert!(matches!(Trainer::new(0, config(1)), Err(Error::InvalidConfig(_))));
        assert!(matches!(Trainer::new(1, config(0)), Err(Error::InvalidConfig(_))));

        let bad_rate = TrainConfig {
            learning_rate: -1.0,
            ..config(1)
        };
        assert!(matches!(Trainer::new(1, bad_rate), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn emits_one_record_per_epoch_in_order() {
        let data = separable();
        let mut records: Vec<EpochRecord> = Vec::new();

        let model = Trainer::new(1, config(5))
            .expect("trainer")
            .compile()
            .fit(&data, &data, &mut records)
            .expect("fit");

        assert_eq!(records.len(), 5);
        assert_eq!(records.as_slice(), model.history());
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.epoch, i);
        }
        // first epoch is scored on the zero weights
        assert!((records[0].loss - std::f64::consts::LN_2).abs() < 1e-12);
        assert!(records.last().expect("record").val_acc > 0.99);
    }

    #[test]
    fn loss_decreases_on_separable_data() {
        let data = separable();
        let model = Trainer::new(1, config(50))
            .expect("trainer")
            .compile()
            .fit(&data, &data, NoopSink)
            .expect("fit");

        let history = model.history();
        assert!(history.windows(2).all(|w| w[1].val_loss < w[0].val_loss));
    }

    #[test]
    fn empty_validation_stream_is_rejected() {
        let data = separable();
        let empty = BatchStream::new(
            ndarray::Array2::zeros((0, 1)),
            ndarray::Array2::zeros((0, 2)),
            2,
        )
        .expect("stream");

        let err = Trainer::new(1, config(3))
            .expect("trainer")
            .compile()
            .fit(&data, &empty, NoopSink)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::EmptyDataset {
                stage: "validation"
            }
        ));
    }

    #[test]
    fn stop_flag_is_checked_at_epoch_boundaries() {
        struct StopAfter {
            flag: Arc<AtomicBool>,
            epoch: usize,
            seen: usize,
        }

        impl EpochSink for StopAfter {
            fn record(&mut self, record: &EpochRecord) {
                self.seen += 1;
                if record.epoch == self.epoch {
                    self.flag.store(true, Ordering::Relaxed);
                }
            }
        }

        let flag = Arc::new(AtomicBool::new(false));
        let data = separable();
        let mut sink = StopAfter {
            flag: Arc::clone(&flag),
            epoch: 2,
            seen: 0,
        };

        let err = Trainer::new(
            1,
            TrainConfig {
                stop_flag: Some(flag),
                ..config(10)
            },
        )
        .expect("trainer")
        .compile()
        .fit(&data, &data, &mut sink)
        .unwrap_err();

        assert!(matches!(
            err,
            Error::Cancelled {
                completed_epochs: 3
            }
        ));
        assert_eq!(sink.seen, 3);
    }

    #[test]
    fn overflowing_weights_report_divergence() {
        let data = BatchStream::new(array![[1e300]], array![[0.0, 1.0]], 1).expect("stream");
        let mut records: Vec<EpochRecord> = Vec::new();

        let err = Trainer::new(
            1,
            TrainConfig {
                learning_rate: 1e10,
                optimizer: OptimizerKind::Sgd,
                ..config(10)
            },
        )
        .expect("trainer")
        .compile()
        .fit(&data, &data, &mut records)
        .unwrap_err();

        assert!(matches!(err, Error::NumericDivergence { epoch: 0, .. }));
        assert!(records.is_empty());
    }

    #[test]
    fn channel_sink_streams_records() {
        let (tx, rx) = mpsc::channel();
        let data = separable();

        Trainer::new(1, config(4))
            .expect("trainer")
            .compile()
            .fit(&data, &data, tx)
            .expect("fit");

        let received: Vec<EpochRecord> = rx.iter().collect();
        assert_eq!(received.len(), 4);
        assert_eq!(received[3].epoch, 3);
    }

    #[test]
    fn trained_model_evaluates_and_predicts() {
        let data = separable();
        let model = Trainer::new(1, config(20))
            .expect("trainer")
            .compile()
            .fit(&data, &data, NoopSink)
            .expect("fit");

        let evaluation = model.evaluate(&data).expect("evaluate");
        assert!((evaluation.accuracy - 1.0).abs() < f64::EPSILON);
        assert_eq!(model.predict(array![[-3.0], [3.0]].view()).expect("predict"), vec![0, 1]);

        let wide = BatchStream::new(array![[1.0, 2.0]], array![[1.0, 0.0]], 1).expect("stream");
        assert!(matches!(
            model.evaluate(&wide),
            Err(Error::DimensionMismatch {
                expected: 1,
                actual: 2
            })
        ));
    }
}
