use csv::{ReaderBuilder, Trim};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use tracing::info;

use crate::error::{Error, FetchCause, Result};

pub const DEFAULT_SOURCE: &str = "https://raw.githubusercontent.com/mnseong/study-tensorflow.js/main/logistic-regression/data/diabetes.csv";

pub const OUTCOME_COLUMN: &str = "Outcome";

/// One CSV row. Blank or non-numeric cells are simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: HashMap<String, f64>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, column: &str, value: f64) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: f64) {
        self.values.insert(column.to_owned(), value);
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }

    pub fn outcome(&self) -> Option<f64> {
        self.get(OUTCOME_COLUMN)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

pub trait Loader {
    fn load(&self) -> Result<Vec<Record>>;
}

#[derive(Debug, Clone)]
pub struct CsvFileLoader {
    path: PathBuf,
}

impl CsvFileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Loader for CsvFileLoader {
    fn load(&self) -> Result<Vec<Record>> {
        let source_name = self.path.display().to_string();
        let file =
            File::open(&self.path).map_err(|e| Error::fetch(&source_name, FetchCause::Io(e)))?;

        parse_reader(BufReader::new(file), &source_name)
    }
}

#[derive(Debug, Clone)]
pub struct HttpCsvLoader {
    url: String,
}

impl HttpCsvLoader {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Loader for HttpCsvLoader {
    fn load(&self) -> Result<Vec<Record>> {
        info!(url = %self.url, "downloading dataset");

        let response = reqwest::blocking::get(self.url.as_str())
            .map_err(|e| Error::fetch(&self.url, FetchCause::Http(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(&self.url, FetchCause::Status(status.as_u16())));
        }

        let body = response
            .bytes()
            .map_err(|e| Error::fetch(&self.url, FetchCause::Http(e)))?;

        parse_reader(body.as_ref(), &self.url)
    }
}

/// Picks the HTTP loader for `http(s)://` sources and the file loader otherwise.
pub fn loader_for(source: &str) -> Box<dyn Loader> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Box::new(HttpCsvLoader::new(source))
    } else {
        Box::new(CsvFileLoader::new(source))
    }
}

pub fn parse_reader<R: Read>(reader: R, source_name: &str) -> Result<Vec<Record>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| Error::fetch(source_name, FetchCause::Csv(e)))?
        .clone();

    let mut records = Vec::new();

    for result in reader.records() {
        let row = result.map_err(|e| Error::fetch(source_name, FetchCause::Csv(e)))?;

        let record: Record = headers
            .iter()
            .zip(row.iter())
            .filter_map(|(column, cell)| {
                cell.parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .map(|value| (column, value))
            })
            .collect();

        records.push(record);
    }

    if records.is_empty() {
        return Err(Error::EmptyDataset { stage: "load" });
    }

    info!(source = source_name, rows = records.len(), "dataset loaded");

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Pregnancies,Glucose,BloodPressure,Insulin,BMI,Age,Outcome
6,148,72,0,33.6,50,1
1,85,,0,26.6,31,0
8,183,64,n/a,23.3,32,1
";

    #[test]
    fn parses_rows_in_order_with_blank_cells_absent() {
        let records = parse_reader(SAMPLE.as_bytes(), "inline").expect("parse sample");

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].get("Glucose"), Some(148.0));
        assert_eq!(records[0].outcome(), Some(1.0));
        assert_eq!(records[1].get("BloodPressure"), None);
        assert_eq!(records[1].get("BMI"), Some(26.6));
        assert_eq!(records[2].get("Insulin"), None);
        assert_eq!(records[2].len(), 6);
    }

    #[test]
    fn header_only_csv_is_empty_dataset() {
        let err = parse_reader("Glucose,Outcome\n".as_bytes(), "inline").unwrap_err();
        assert!(matches!(err, Error::EmptyDataset { stage: "load" }));
    }

    #[test]
    fn ragged_row_is_fetch_error() {
        let err = parse_reader("Glucose,Outcome\n1,0,7\n".as_bytes(), "inline").unwrap_err();
        assert!(matches!(
            err,
            Error::DataFetch {
                cause: FetchCause::Csv(_),
                ..
            }
        ));
        assert!(err.is_pre_training());
    }

    #[test]
    fn file_loader_reads_from_disk_and_reports_missing_files() {
        let path = std::env::temp_dir().join(format!("logistic-parse-{}.csv", std::process::id()));
        std::fs::write(&path, SAMPLE).expect("write temp csv");

        let records = CsvFileLoader::new(&path).load().expect("load temp csv");
        assert_eq!(records.len(), 3);
        std::fs::remove_file(&path).expect("remove temp csv");

        let err = CsvFileLoader::new(&path).load().unwrap_err();
        assert!(matches!(
            err,
            Error::DataFetch {
                cause: FetchCause::Io(_),
                ..
            }
        ));
    }

    #[test]
    fn record_builder_and_collect_agree() {
        let built = Record::new().with("BMI", 30.0).with(OUTCOME_COLUMN, 1.0);
        let collected: Record = [("BMI", 30.0), ("Outcome", 1.0)].into_iter().collect();

        assert_eq!(built, collected);
        assert!(Record::new().is_empty());
    }
}
