use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use logistic::{config::RunConfig, pipeline, trainer::NoopSink};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = RunConfig::load(config_path.as_deref()).context("failed loading configuration")?;

    info!(
        source = %config.source,
        features = ?config.features,
        epochs = config.epochs,
        batch_size = config.batch_size,
        "diabetes classifier run started"
    );

    let model = pipeline::run(&config, NoopSink).context("training run failed")?;

    if let Some(last) = model.final_record() {
        println!(
            "epoch {}: loss {:.4}, acc {:.3}, val_loss {:.4}, val_acc {:.3}",
            last.epoch + 1,
            last.loss,
            last.acc,
            last.val_loss,
            last.val_acc
        );
    }

    Ok(())
}
