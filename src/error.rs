use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// The dataset could not be read, downloaded or parsed.
    DataFetch {
        source_name: String,
        cause: FetchCause,
    },
    DimensionMismatch {
        expected: usize,
        actual: usize,
    },
    EmptyDataset {
        stage: &'static str,
    },
    NumericDivergence {
        epoch: usize,
        loss: f64,
    },
    Cancelled {
        completed_epochs: usize,
    },
    InvalidConfig(String),
    Plot(String),
}

#[derive(Debug)]
pub enum FetchCause {
    Io(std::io::Error),
    Csv(csv::Error),
    Http(reqwest::Error),
    Status(u16),
}

impl fmt::Display for FetchCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Csv(err) => write!(f, "csv error: {err}"),
            Self::Http(err) => write!(f, "http error: {err}"),
            Self::Status(code) => write!(f, "unexpected http status {code}"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataFetch { source_name, cause } => {
                write!(f, "failed to load dataset from {source_name}: {cause}")
            }
            Self::DimensionMismatch { expected, actual } => write!(
                f,
                "dimension mismatch: model expects {expected} features, data has {actual}"
            ),
            Self::EmptyDataset { stage } => write!(f, "empty dataset at {stage} stage"),
            Self::NumericDivergence { epoch, loss } => {
                write!(f, "loss diverged to {loss} at epoch {epoch}")
            }
            Self::Cancelled { completed_epochs } => {
                write!(f, "training cancelled after {completed_epochs} epochs")
            }
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Plot(msg) => write!(f, "plot error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DataFetch { cause, .. } => match cause {
                FetchCause::Io(err) => Some(err),
                FetchCause::Csv(err) => Some(err),
                FetchCause::Http(err) => Some(err),
                FetchCause::Status(_) => None,
            },
            _ => None,
        }
    }
}

impl Error {
    pub(crate) fn fetch(source_name: impl Into<String>, cause: FetchCause) -> Self {
        Self::DataFetch {
            source_name: source_name.into(),
            cause,
        }
    }

    /// Errors raised before the first training step. A run that hits one of
    /// these has produced neither charts nor a model. `Plot` is excluded: charts
    /// are only drawn once every one of these checks has passed.
    pub fn is_pre_training(&self) -> bool {
        matches!(
            self,
            Self::DataFetch { .. }
                | Self::DimensionMismatch { .. }
                | Self::EmptyDataset { .. }
                | Self::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_load_and_setup_failures_are_pre_training() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(Error::fetch("data.csv", FetchCause::Io(missing)).is_pre_training());
        assert!(Error::EmptyDataset { stage: "split" }.is_pre_training());
        assert!(Error::InvalidConfig("epochs".to_owned()).is_pre_training());
        assert!(Error::DimensionMismatch {
            expected: 2,
            actual: 1
        }
        .is_pre_training());

        assert!(!Error::Plot("disk full".to_owned()).is_pre_training());
        assert!(!Error::Cancelled {
            completed_epochs: 3
        }
        .is_pre_training());
        assert!(!Error::NumericDivergence {
            epoch: 0,
            loss: f64::NAN
        }
        .is_pre_training());
    }

    #[test]
    fn fetch_errors_expose_their_cause() {
        use std::error::Error as _;

        let err = Error::fetch("data.csv", FetchCause::Status(404));
        assert!(err.source().is_none());
        assert_eq!(
            err.to_string(),
            "failed to load dataset from data.csv: unexpected http status 404"
        );

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(Error::fetch("data.csv", FetchCause::Io(missing)).source().is_some());
    }
}
