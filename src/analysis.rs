//! Prerequisite analysis over polars DataFrames
//!
//! A minimal stand-in for the profiling / datatype / key identification
//! pipeline: enough to make raw CSV tables ready for link prediction.

use crate::dataset::{ColumnStat, Dataset, L1Type};
use crate::error::{LinkError, Result};
use crate::intersection::frame::text_values;
use async_trait::async_trait;
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

const SAMPLE_SIZE: usize = 5;

/// Word count above which a text value is treated as free text.
const OPEN_TEXT_MIN_WORDS: usize = 4;

/// Runs missing prerequisite analysis on a dataset. Must be idempotent:
/// analyzing an analyzed dataset returns it unchanged.
#[async_trait]
pub trait DatasetAnalyzer: Send + Sync {
    async fn analyze(&self, dataset: &Dataset) -> Result<Dataset>;
}

/// Profiles the frames it was given, by dataset name.
#[derive(Default, Clone)]
pub struct FrameAnalyzer {
    frames: HashMap<String, DataFrame>,
}

impl FrameAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frames<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = (S, DataFrame)>,
        S: Into<String>,
    {
        Self {
            frames: frames.into_iter().map(|(name, df)| (name.into(), df)).collect(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, df: DataFrame) {
        self.frames.insert(name.into(), df);
    }
}

#[async_trait]
impl DatasetAnalyzer for FrameAnalyzer {
    async fn analyze(&self, dataset: &Dataset) -> Result<Dataset> {
        if dataset.is_analyzed() {
            return Ok(dataset.clone());
        }
        let df = self
            .frames
            .get(dataset.name())
            .ok_or_else(|| LinkError::UnknownDataset(dataset.name().to_string()))?;
        profile_frame(dataset.name(), df)
    }
}

/// Profile every column of `df`, tag L1 types and identify a key.
pub fn profile_frame(name: &str, df: &DataFrame) -> Result<Dataset> {
    let rows = df.height() as u64;
    let mut columns = Vec::with_capacity(df.width());
    let mut values = Vec::with_capacity(df.width());

    for series in df.get_columns() {
        let text = text_values(series)?;
        let mut seen = HashSet::new();
        let mut samples = Vec::new();
        for value in text.iter().flatten() {
            if seen.insert(value.as_str()) && samples.len() < SAMPLE_SIZE {
                samples.push(value.clone());
            }
        }
        let distinct = seen.len() as u64;
        let l1 = l1_type(series.dtype(), &text);

        columns.push(
            ColumnStat::new(series.name(), l1, rows, series.null_count() as u64, distinct).with_samples(samples),
        );
        values.push(text);
    }

    let key = identify_key(&columns, &values, rows);
    info!(dataset = name, rows, columns = columns.len(), key = ?key, "Profiled dataset");
    Ok(Dataset::analyzed(name, columns, Some(key.unwrap_or_default())))
}

fn l1_type(dtype: &DataType, values: &[Option<String>]) -> L1Type {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => L1Type::Integer,
        DataType::Float32 | DataType::Float64 => L1Type::Float,
        DataType::Date | DataType::Datetime(_, _) | DataType::Time => L1Type::DateTime,
        DataType::Duration(_) => L1Type::Range,
        DataType::Boolean => L1Type::CloseEndedText,
        DataType::List(_) => L1Type::Collection,
        DataType::String => text_type(values),
        _ => L1Type::Others,
    }
}

fn text_type(values: &[Option<String>]) -> L1Type {
    let present: Vec<&str> = values.iter().flatten().map(String::as_str).collect();
    if present.is_empty() {
        return L1Type::Others;
    }
    if present.iter().all(|v| v.parse::<i64>().is_ok()) {
        return L1Type::Integer;
    }
    if present.iter().all(|v| v.parse::<f64>().is_ok()) {
        return L1Type::Float;
    }
    let code_like = |v: &&str| {
        !v.chars().any(char::is_whitespace)
            && v.chars().any(|c| c.is_ascii_digit())
            && v.chars().any(char::is_alphabetic)
    };
    if present.iter().all(code_like) {
        return L1Type::Alphanumeric;
    }
    if present
        .iter()
        .any(|v| v.split_whitespace().count() >= OPEN_TEXT_MIN_WORDS)
    {
        L1Type::OpenEndedText
    } else {
        L1Type::CloseEndedText
    }
}

/// First complete, fully unique column; failing that, the first such pair of
/// columns. Floats and datetimes are never key material.
fn identify_key(columns: &[ColumnStat], values: &[Vec<Option<String>>], rows: u64) -> Option<Vec<String>> {
    if rows == 0 {
        return None;
    }
    let eligible: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.null_count == 0 && !matches!(c.l1_type, L1Type::Float | L1Type::DateTime))
        .map(|(i, _)| i)
        .collect();

    if let Some(&i) = eligible.iter().find(|&&i| columns[i].distinct_count == rows) {
        return Some(vec![columns[i].name.clone()]);
    }

    for (pos, &i) in eligible.iter().enumerate() {
        for &j in &eligible[pos + 1..] {
            let tuples: HashSet<(&Option<String>, &Option<String>)> =
                values[i].iter().zip(values[j].iter()).collect();
            if tuples.len() as u64 == rows {
                debug!(first = %columns[i].name, second = %columns[j].name, "Composite key found");
                return Some(vec![columns[i].name.clone(), columns[j].name.clone()]);
            }
        }
    }
    None
}

/// Load every `*.csv` in `dir` as a frame named after the file stem, sorted
/// by name.
pub fn load_csv_dir(dir: &Path) -> Result<Vec<(String, DataFrame)>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|ext| ext == "csv").unwrap_or(false))
        .collect();
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| LinkError::Config(format!("Bad CSV file name: {}", path.display())))?
            .to_string();
        let df = LazyCsvReader::new(&path)
            .with_has_header(true)
            .with_infer_schema_length(Some(1000))
            .with_try_parse_dates(true)
            .finish()?
            .collect()?;
        debug!(dataset = %name, rows = df.height(), "Loaded CSV");
        frames.push((name, df));
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_profile_counts_and_types() {
        let df = df![
            "id" => [1i64, 2, 3, 4],
            "sku" => ["A100", "B200", "A100", "C300"],
            "price" => [Some(1.5f64), None, Some(2.0), Some(2.0)],
            "note" => ["left at the front door", "ok", "ok", "ring twice"]
        ]
        .unwrap();
        let ds = profile_frame("items", &df).unwrap();

        let price = ds.column("price").unwrap();
        assert_eq!(price.l1_type, L1Type::Float);
        assert_eq!(price.null_count, 1);
        assert_eq!(price.distinct_count, 2);

        assert_eq!(ds.column("sku").unwrap().l1_type, L1Type::Alphanumeric);
        assert_eq!(ds.column("sku").unwrap().sample_values, vec!["A100", "B200", "C300"]);
        assert_eq!(ds.column("note").unwrap().l1_type, L1Type::OpenEndedText);
        assert_eq!(ds.key(), Some(&["id".to_string()][..]));
        assert!(ds.is_analyzed());
    }

    #[test]
    fn test_composite_key_identified() {
        let df = df![
            "name" => ["ana", "ana", "bo", "cy"],
            "class" => ["mage", "rogue", "mage", "mage"],
            "level" => [3i64, 3, 5, 5]
        ]
        .unwrap();
        let ds = profile_frame("players", &df).unwrap();
        assert_eq!(ds.key(), Some(&["name".to_string(), "class".to_string()][..]));
    }

    #[test]
    fn test_no_key_still_counts_as_analyzed() {
        let df = df!["x" => [1i64, 1, 1]].unwrap();
        let ds = profile_frame("t", &df).unwrap();
        assert!(ds.key().is_none());
        assert!(ds.is_analyzed());
    }

    #[tokio::test]
    async fn test_analyzer_is_idempotent() {
        let df = df!["id" => [1i64, 2]].unwrap();
        let analyzer = FrameAnalyzer::from_frames([("t", df)]);
        let once = analyzer.analyze(&Dataset::unanalyzed("t")).await.unwrap();
        let twice = analyzer.analyze(&once).await.unwrap();
        assert_eq!(once, twice);

        let err = analyzer.analyze(&Dataset::unanalyzed("missing")).await.unwrap_err();
        assert!(matches!(err, LinkError::UnknownDataset(_)));
    }

    #[test]
    fn test_load_csv_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("orders.csv"), "order_id,customer_id\n1,10\n2,11\n").unwrap();
        std::fs::write(dir.path().join("customers.csv"), "id,name\n10,ana\n11,bo\n").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "skip me").unwrap();

        let frames = load_csv_dir(dir.path()).unwrap();
        let names: Vec<&str> = frames.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["customers", "orders"]);
        assert_eq!(frames[1].1.height(), 2);
    }
}
