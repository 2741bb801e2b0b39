//! Dataset model - profiled tables the predictor reads

use serde::{Deserialize, Serialize};
use std::fmt;

/// Level-1 semantic type tag assigned by datatype identification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum L1Type {
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "alphanumeric")]
    Alphanumeric,
    #[serde(rename = "close_ended_text")]
    CloseEndedText,
    #[serde(rename = "open_ended_text")]
    OpenEndedText,
    #[serde(rename = "date & time")]
    DateTime,
    #[serde(rename = "range_type")]
    Range,
    #[serde(rename = "collection")]
    Collection,
    #[serde(rename = "others", other)]
    Others,
}

impl L1Type {
    pub fn as_str(&self) -> &'static str {
        match self {
            L1Type::Integer => "integer",
            L1Type::Float => "float",
            L1Type::Alphanumeric => "alphanumeric",
            L1Type::CloseEndedText => "close_ended_text",
            L1Type::OpenEndedText => "open_ended_text",
            L1Type::DateTime => "date & time",
            L1Type::Range => "range_type",
            L1Type::Collection => "collection",
            L1Type::Others => "others",
        }
    }
}

impl fmt::Display for L1Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column-level profiling output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnStat {
    pub name: String,

    pub l1_type: L1Type,

    /// Finer-grained type (e.g. "dimension", "measure"); opaque to the predictor
    #[serde(default)]
    pub l2_type: Option<String>,

    /// Row count
    pub count: u64,

    pub null_count: u64,

    /// Distinct non-null values
    pub distinct_count: u64,

    #[serde(default)]
    pub sample_values: Vec<String>,
}

impl ColumnStat {
    pub fn new(name: impl Into<String>, l1_type: L1Type, count: u64, null_count: u64, distinct_count: u64) -> Self {
        Self {
            name: name.into(),
            l1_type,
            l2_type: None,
            count,
            null_count,
            distinct_count,
            sample_values: Vec::new(),
        }
    }

    pub fn with_samples(mut self, samples: Vec<String>) -> Self {
        self.sample_values = samples;
        self
    }

    /// distinct_count / count, 0 for an empty column
    pub fn uniqueness(&self) -> f64 {
        ratio(self.distinct_count, self.count)
    }

    /// (count - null_count) / count, 0 for an empty column
    pub fn completeness(&self) -> f64 {
        ratio(self.count.saturating_sub(self.null_count), self.count)
    }
}

pub(crate) fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        (numerator as f64 / denominator as f64).clamp(0.0, 1.0)
    }
}

/// A named, profiled table.
///
/// `key` is `None` both when no key was found and when key identification has
/// not run; `key_identified` distinguishes the two.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,

    #[serde(default)]
    columns: Vec<ColumnStat>,

    #[serde(default)]
    key: Option<Vec<String>>,

    #[serde(default)]
    key_identified: bool,
}

impl Dataset {
    /// A dataset whose analysis has not run yet.
    pub fn unanalyzed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            key: None,
            key_identified: false,
        }
    }

    /// A fully analyzed dataset. An empty `key` vector means "no key found".
    pub fn analyzed(name: impl Into<String>, columns: Vec<ColumnStat>, key: Option<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            columns,
            key: key.filter(|k| !k.is_empty()),
            key_identified: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnStat] {
        &self.columns
    }

    pub fn key(&self) -> Option<&[String]> {
        self.key.as_deref()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnStat> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Row count, taken from the column profiles.
    pub fn row_count(&self) -> u64 {
        self.columns.iter().map(|c| c.count).max().unwrap_or(0)
    }

    /// Profiling, typing and key identification have all completed.
    pub fn is_analyzed(&self) -> bool {
        self.key_identified && !self.columns.is_empty()
    }

    /// Why `is_analyzed` is false, if it is.
    pub fn missing_prerequisite(&self) -> Option<&'static str> {
        if self.columns.is_empty() {
            Some("column profiling has not run")
        } else if !self.key_identified {
            Some("key identification has not run")
        } else {
            None
        }
    }

    /// True when `columns` is exactly the identified key, in order.
    pub fn is_key(&self, columns: &[String]) -> bool {
        self.key().map(|k| k == columns).unwrap_or(false)
    }

    pub fn has_composite_key(&self) -> bool {
        self.key().map(|k| k.len() > 1).unwrap_or(false)
    }
}
