use std::path::Path;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::encode::{encode, standardize, DIABETIC, HEALTHY};
use crate::error::{Error, Result};
use crate::parse::{loader_for, Record};
use crate::plot::{feature_histogram_svg, training_curves_svg, write_svg};
use crate::split::{split, Split};
use crate::trainer::{Compiled, EpochSink, TrainedModel, Trainer};

/// A compiled trainer and the streams it will fit on, past every pre-training check.
struct Prepared {
    trainer: Trainer<Compiled>,
    parts: Split,
}

fn prepare(records: &[Record], config: &RunConfig) -> Result<Prepared> {
    config.validate()?;
    if records.is_empty() {
        return Err(Error::EmptyDataset { stage: "load" });
    }

    let mut encoded = encode(records, &config.features);
    let balance = encoded.class_balance();
    info!(
        rows = encoded.len(),
        features = encoded.feature_count(),
        healthy = balance[HEALTHY],
        diabetic = balance[DIABETIC],
        "rows encoded"
    );

    if config.standardize {
        let stats = standardize(&mut encoded);
        info!(
            means = ?stats.means.to_vec(),
            std_devs = ?stats.std_devs.to_vec(),
            "features standardized"
        );
    }

    let parts = split(&encoded, &config.split_options())?;

    let trainer = Trainer::new(config.features.len(), config.train_config())?.compile();
    trainer.check_streams(&parts.train, &parts.validation)?;

    Ok(Prepared { trainer, parts })
}

/// Encode, split and fit on rows that are already in memory.
pub fn train_on_records<K: EpochSink>(
    records: &[Record],
    config: &RunConfig,
    sink: K,
) -> Result<TrainedModel> {
    let Prepared { trainer, parts } = prepare(records, config)?;
    trainer.fit(&parts.train, &parts.validation, sink)
}

/// Full run: load from the configured source, fit, and write charts when `plot_dir` is set.
/// Nothing is written until loading, encoding, splitting and the trainer's stream
/// checks have all succeeded.
pub fn run<K: EpochSink>(config: &RunConfig, sink: K) -> Result<TrainedModel> {
    config.validate()?;

    let records = loader_for(&config.source).load()?;
    let Prepared { trainer, parts } = prepare(&records, config)?;

    if let Some(dir) = &config.plot_dir {
        write_histograms(&records, config, dir)?;
    }

    let model = trainer.fit(&parts.train, &parts.validation, sink)?;

    if let Some(dir) = &config.plot_dir {
        let path = dir.join("training.svg");
        write_svg(&path, &training_curves_svg(model.history())?)?;
        info!(path = %path.display(), "training curves written");
    }

    Ok(model)
}

fn write_histograms(records: &[Record], config: &RunConfig, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::Plot(format!("failed creating {}: {e}", dir.display())))?;

    for feature in &config.features {
        if !records.iter().any(|record| record.get(feature).is_some()) {
            warn!(feature = %feature, "no values for feature, histogram skipped");
            continue;
        }

        let svg = feature_histogram_svg(records, feature, config.histogram_bins)?;
        let path = dir.join(format!("{}.svg", feature.to_lowercase()));
        write_svg(&path, &svg)?;
        info!(feature = %feature, path = %path.display(), "histogram written");
    }

    Ok(())
}
