use plotters::coord::Shift;
use plotters::prelude::*;
use std::fmt::Display;
use std::path::Path;

use crate::encode::{one_hot, DIABETIC};
use crate::error::{Error, Result};
use crate::parse::Record;
use crate::trainer::{EpochRecord, EpochSink};

const CURVES_SIZE: (u32, u32) = (960, 400);
const HISTOGRAM_SIZE: (u32, u32) = (640, 400);

fn plot_err<E: Display>(err: E) -> Error {
    Error::Plot(err.to_string())
}

/// Collects epoch records as they arrive and renders them on demand.
#[derive(Debug, Clone, Default)]
pub struct ChartSink {
    history: Vec<EpochRecord>,
}

impl ChartSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[EpochRecord] {
        &self.history
    }

    pub fn render(&self) -> Result<String> {
        training_curves_svg(&self.history)
    }
}

impl EpochSink for ChartSink {
    fn record(&mut self, record: &EpochRecord) {
        self.history.push(*record);
    }
}

/// Loss and accuracy per epoch, training against validation, side by side.
pub fn training_curves_svg(history: &[EpochRecord]) -> Result<String> {
    if history.is_empty() {
        return Err(Error::Plot("no epochs to plot".to_owned()));
    }

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, CURVES_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;

        let (left, right) = root.split_horizontally(480);
        draw_curves(&left, "Loss", history, |r| r.loss, |r| r.val_loss)?;
        draw_curves(&right, "Accuracy", history, |r| r.acc, |r| r.val_acc)?;

        root.present().map_err(plot_err)?;
    }

    Ok(svg)
}

fn draw_curves<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    caption: &str,
    history: &[EpochRecord],
    train: fn(&EpochRecord) -> f64,
    validation: fn(&EpochRecord) -> f64,
) -> Result<()> {
    let last_epoch = history.last().map_or(1, |r| r.epoch.max(1));

    let (low, high) = history
        .iter()
        .flat_map(|r| [train(r), validation(r)])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let padding = ((high - low) * 0.05).max(1e-3);

    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(0..last_epoch, (low - padding)..(high + padding))
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("epoch")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(
            history.iter().map(|r| (r.epoch, train(r))),
            &BLUE,
        ))
        .map_err(plot_err)?
        .label("train")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    chart
        .draw_series(LineSeries::new(
            history.iter().map(|r| (r.epoch, validation(r))),
            &RED,
        ))
        .map_err(plot_err)?
        .label("validation")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_err)?;

    Ok(())
}

/// Per-outcome counts of one feature over equal-width bins.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureHistogram {
    pub feature: String,
    /// `bins + 1` ascending bin boundaries.
    pub edges: Vec<f64>,
    pub healthy: Vec<usize>,
    pub diabetic: Vec<usize>,
}

impl FeatureHistogram {
    pub fn build(records: &[Record], feature: &str, bins: usize) -> Result<Self> {
        if bins == 0 {
            return Err(Error::InvalidConfig("histogram needs at least one bin".to_owned()));
        }

        let values: Vec<(f64, bool)> = records
            .iter()
            .filter_map(|record| {
                let diabetic = one_hot(record.outcome().unwrap_or(0.0))[DIABETIC] > 0.0;
                record.get(feature).map(|value| (value, diabetic))
            })
            .collect();

        if values.is_empty() {
            return Err(Error::Plot(format!("no values for feature {feature}")));
        }

        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(v, _)| {
                (lo.min(v), hi.max(v))
            });
        let width = if max > min {
            (max - min) / bins as f64
        } else {
            1.0
        };

        let edges = (0..=bins).map(|i| min + width * i as f64).collect();
        let mut healthy = vec![0; bins];
        let mut diabetic = vec![0; bins];

        for (value, is_diabetic) in values {
            #[allow(clippy::cast_possible_truncation)]
            #[allow(clippy::cast_sign_loss)]
            let bin = (((value - min) / width) as usize).min(bins - 1);

            if is_diabetic {
                diabetic[bin] += 1;
            } else {
                healthy[bin] += 1;
            }
        }

        Ok(Self {
            feature: feature.to_owned(),
            edges,
            healthy,
            diabetic,
        })
    }

    pub fn bins(&self) -> usize {
        self.healthy.len()
    }

    pub fn render(&self) -> Result<String> {
        let low = self.edges.first().copied().unwrap_or(0.0);
        let high = self.edges.last().copied().unwrap_or(1.0);
        let tallest = self
            .healthy
            .iter()
            .chain(&self.diabetic)
            .copied()
            .max()
            .unwrap_or(0)
            .max(1);

        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, HISTOGRAM_SIZE).into_drawing_area();
            root.fill(&WHITE).map_err(plot_err)?;

            let mut chart = ChartBuilder::on(&root)
                .caption(&self.feature, ("sans-serif", 20))
                .margin(10)
                .x_label_area_size(30)
                .y_label_area_size(50)
                .build_cartesian_2d(low..high, 0.0..(tallest as f64 * 1.1))
                .map_err(plot_err)?;

            chart
                .configure_mesh()
                .x_desc(self.feature.as_str())
                .y_desc("rows")
                .draw()
                .map_err(plot_err)?;

            for (counts, color, label) in [
                (&self.healthy, BLUE, "healthy"),
                (&self.diabetic, RED, "diabetic"),
            ] {
                chart
                    .draw_series(counts.iter().enumerate().map(|(i, &count)| {
                        Rectangle::new(
                            [(self.edges[i], 0.0), (self.edges[i + 1], count as f64)],
                            color.mix(0.5).filled(),
                        )
                    }))
                    .map_err(plot_err)?
                    .label(label)
                    .legend(move |(x, y)| {
                        Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.mix(0.5).filled())
                    });
            }

            chart
                .configure_series_labels()
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()
                .map_err(plot_err)?;

            root.present().map_err(plot_err)?;
        }

        Ok(svg)
    }
}

pub fn feature_histogram_svg(records: &[Record], feature: &str, bins: usize) -> Result<String> {
    FeatureHistogram::build(records, feature, bins)?.render()
}

pub fn write_svg(path: &Path, svg: &str) -> Result<()> {
    std::fs::write(path, svg)
        .map_err(|e| Error::Plot(format!("failed writing {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::OUTCOME_COLUMN;

    fn history() -> Vec<EpochRecord> {
        (0..5)
            .map(|epoch| {
                let progress = epoch as f64 / 5.0;
                EpochRecord {
                    epoch,
                    loss: 0.7 - 0.1 * progress,
                    acc: 0.5 + 0.2 * progress,
                    val_loss: 0.72 - 0.1 * progress,
                    val_acc: 0.48 + 0.2 * progress,
                }
            })
            .collect()
    }

    #[test]
    fn curves_render_both_panels() {
        let svg = training_curves_svg(&history()).expect("render");

        assert!(svg.contains("<svg"));
        assert!(svg.contains("Loss"));
        assert!(svg.contains("Accuracy"));
        assert!(svg.contains("validation"));
    }

    #[test]
    fn chart_sink_renders_what_it_collected() {
        let mut sink = ChartSink::new();
        assert!(matches!(sink.render(), Err(Error::Plot(_))));

        for record in history() {
            sink.record(&record);
        }
        assert_eq!(sink.history().len(), 5);
        assert!(sink.render().expect("render").contains("<svg"));
    }

    #[test]
    fn histogram_splits_counts_by_outcome() {
        let glucose = [
            (80.0, 0.0),
            (90.0, 0.0),
            (150.0, 1.0),
            (180.0, 1.0),
            (100.0, 1.0),
        ];
        let records: Vec<Record> = glucose
            .into_iter()
            .map(|(value, outcome)| {
                Record::new()
                    .with("Glucose", value)
                    .with(OUTCOME_COLUMN, outcome)
            })
            .chain(std::iter::once(Record::new().with(OUTCOME_COLUMN, 1.0)))
            .collect();

        let histogram = FeatureHistogram::build(&records, "Glucose", 4).expect("histogram");

        assert_eq!(histogram.bins(), 4);
        assert_eq!(histogram.edges, vec![80.0, 105.0, 130.0, 155.0, 180.0]);
        assert_eq!(histogram.healthy, vec![2, 0, 0, 0]);
        assert_eq!(histogram.diabetic, vec![1, 0, 1, 1]);

        let svg = histogram.render().expect("render");
        assert!(svg.contains("Glucose"));
    }

    #[test]
    fn histogram_of_missing_feature_fails() {
        let records = vec![Record::new().with(OUTCOME_COLUMN, 0.0)];
        assert!(matches!(
            feature_histogram_svg(&records, "Insulin", 10),
            Err(Error::Plot(_))
        ));
        assert!(matches!(
            FeatureHistogram::build(&records, "Insulin", 0),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn constant_feature_lands_in_first_bin() {
        let records = vec![
            Record::new().with("Age", 30.0),
            Record::new().with("Age", 30.0).with(OUTCOME_COLUMN, 1.0),
        ];
        let histogram = FeatureHistogram::build(&records, "Age", 3).expect("histogram");

        assert_eq!(histogram.healthy, vec![1, 0, 0]);
        assert_eq!(histogram.diabetic, vec![1, 0, 0]);
    }
}
