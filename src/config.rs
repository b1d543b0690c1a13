use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::Initializer;
use crate::optimizer::OptimizerKind;
use crate::parse::DEFAULT_SOURCE;
use crate::split::SplitOptions;
use crate::trainer::TrainConfig;

pub const CONFIG_ENV: &str = "LOGISTIC_CONFIG";

pub const DEFAULT_FEATURES: [&str; 6] = [
    "Glucose",
    "BloodPressure",
    "SkinThickness",
    "Insulin",
    "BMI",
    "Age",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// File path or `http(s)://` URL of the CSV.
    pub source: String,
    pub features: Vec<String>,
    pub test_size: f64,
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub optimizer: OptimizerKind,
    pub initializer: Initializer,
    pub standardize: bool,
    pub keep_boundary_row: bool,
    /// Charts are only written when this is set.
    pub plot_dir: Option<PathBuf>,
    pub histogram_bins: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_owned(),
            features: DEFAULT_FEATURES.iter().map(|f| (*f).to_owned()).collect(),
            test_size: 0.1,
            batch_size: 16,
            epochs: 100,
            learning_rate: 0.001,
            seed: 42,
            optimizer: OptimizerKind::Adam,
            initializer: Initializer::GlorotUniform,
            standardize: false,
            keep_boundary_row: false,
            plot_dir: None,
            histogram_bins: 20,
        }
    }
}

impl RunConfig {
    /// Defaults, then the TOML file (`path`, else `$LOGISTIC_CONFIG`), then `LOGISTIC_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| env_non_empty(CONFIG_ENV).map(PathBuf::from));

        let mut config = match file {
            Some(file) => Self::from_file(&file)?,
            None => Self::default(),
        };
        config.apply_overrides(env_non_empty);
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("failed reading config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|e| Error::InvalidConfig(format!("failed parsing TOML config: {e}")))
    }

    /// Values that fail to parse are logged and skipped.
    pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(v) = lookup("LOGISTIC_SOURCE") {
            self.source = v;
        }
        if let Some(v) = lookup("LOGISTIC_FEATURES") {
            self.features = split_csv(&v);
        }
        if let Some(v) = lookup("LOGISTIC_PLOT_DIR") {
            self.plot_dir = Some(PathBuf::from(v));
        }
        override_parsed(&lookup, "LOGISTIC_TEST_SIZE", &mut self.test_size);
        override_parsed(&lookup, "LOGISTIC_BATCH_SIZE", &mut self.batch_size);
        override_parsed(&lookup, "LOGISTIC_EPOCHS", &mut self.epochs);
        override_parsed(&lookup, "LOGISTIC_LEARNING_RATE", &mut self.learning_rate);
        override_parsed(&lookup, "LOGISTIC_SEED", &mut self.seed);
        override_parsed(&lookup, "LOGISTIC_STANDARDIZE", &mut self.standardize);
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(Error::InvalidConfig("source must not be empty".to_owned()));
        }
        if self.features.is_empty() {
            return Err(Error::InvalidConfig("at least one feature is required".to_owned()));
        }
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }
        if self.histogram_bins == 0 {
            return Err(Error::InvalidConfig("histogram bins must be > 0".to_owned()));
        }
        self.split_options().validate()
    }

    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            test_size: self.test_size,
            batch_size: self.batch_size,
            seed: self.seed,
            keep_boundary_row: self.keep_boundary_row,
        }
    }

    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            epochs: self.epochs,
            learning_rate: self.learning_rate,
            optimizer: self.optimizer,
            initializer: self.initializer,
            seed: self.seed,
            stop_flag: None,
        }
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .collect()
}

fn override_parsed<T, F>(lookup: &F, name: &str, target: &mut T)
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => warn!(variable = name, value = %raw, "ignoring unparsable override"),
    }
}
