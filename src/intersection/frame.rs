//! In-memory intersections over polars DataFrames

use super::IntersectionProvider;
use crate::error::{LinkError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use polars::prelude::{DataFrame, DataType, Series};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

type TupleSet = Arc<HashSet<Vec<String>>>;

/// Hash-set intersections over loaded frames.
///
/// Values are compared as text. Floats with an integral value render without
/// a fractional part so `integer` and `float` columns can match. Tuple sets
/// are cached per (dataset, columns).
#[derive(Default)]
pub struct FrameIntersection {
    frames: HashMap<String, DataFrame>,
    tuple_cache: DashMap<(String, Vec<String>), TupleSet>,
}

impl FrameIntersection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frames<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = (S, DataFrame)>,
        S: Into<String>,
    {
        let mut provider = Self::new();
        for (name, df) in frames {
            provider.insert(name, df);
        }
        provider
    }

    pub fn insert(&mut self, name: impl Into<String>, df: DataFrame) {
        let name = name.into();
        self.tuple_cache.retain(|(dataset, _), _| dataset != &name);
        self.frames.insert(name, df);
    }

    pub fn frame(&self, name: &str) -> Option<&DataFrame> {
        self.frames.get(name)
    }

    fn tuples(&self, dataset: &str, columns: &[String]) -> Result<TupleSet> {
        if columns.is_empty() {
            return Err(LinkError::InvalidCandidate(format!(
                "empty column list for dataset '{}'",
                dataset
            )));
        }
        let cache_key = (dataset.to_string(), columns.to_vec());
        if let Some(hit) = self.tuple_cache.get(&cache_key) {
            return Ok(Arc::clone(hit.value()));
        }

        let df = self
            .frames
            .get(dataset)
            .ok_or_else(|| LinkError::UnknownDataset(dataset.to_string()))?;

        let mut per_column = Vec::with_capacity(columns.len());
        for column in columns {
            let series = df.column(column).map_err(|_| LinkError::UnknownColumn {
                dataset: dataset.to_string(),
                column: column.clone(),
            })?;
            per_column.push(text_values(series)?);
        }

        let mut set = HashSet::new();
        for row in 0..df.height() {
            let tuple: Option<Vec<String>> = per_column.iter().map(|values| values[row].clone()).collect();
            if let Some(tuple) = tuple {
                set.insert(tuple);
            }
        }
        debug!(dataset, ?columns, distinct = set.len(), "Built tuple set");

        let set = Arc::new(set);
        self.tuple_cache.insert(cache_key, Arc::clone(&set));
        Ok(set)
    }
}

/// Column values as comparable text; `None` for nulls.
pub(crate) fn text_values(series: &Series) -> Result<Vec<Option<String>>> {
    match series.dtype() {
        DataType::Float32 | DataType::Float64 => {
            let floats = series.cast(&DataType::Float64)?;
            Ok(floats.f64()?.into_iter().map(|v| v.map(float_text)).collect())
        }
        _ => {
            let strings = series.cast(&DataType::String)?;
            Ok(strings
                .str()?
                .into_iter()
                .map(|v| v.map(|s| s.to_string()))
                .collect())
        }
    }
}

fn float_text(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[async_trait]
impl IntersectionProvider for FrameIntersection {
    async fn intersect(
        &self,
        dataset_a: &str,
        columns_a: &[String],
        dataset_b: &str,
        columns_b: &[String],
    ) -> Result<u64> {
        if columns_a.len() != columns_b.len() {
            return Err(LinkError::InvalidCandidate(format!(
                "cannot intersect {} column(s) with {}",
                columns_a.len(),
                columns_b.len()
            )));
        }
        let a = self.tuples(dataset_a, columns_a)?;
        let b = self.tuples(dataset_b, columns_b)?;
        let (small, large) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
        Ok(small.iter().filter(|t| large.contains(*t)).count() as u64)
    }

    async fn distinct_tuple_count(&self, dataset: &str, columns: &[String]) -> Result<u64> {
        Ok(self.tuples(dataset, columns)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn provider() -> FrameIntersection {
        let customers = df![
            "id" => [1i64, 2, 3, 4],
            "region" => ["north", "south", "north", "east"]
        ]
        .unwrap();
        let orders = df![
            "customer_id" => [Some(1.0f64), Some(1.0), Some(3.0), None, Some(9.0)],
            "region" => ["north", "north", "west", "south", "south"]
        ]
        .unwrap();
        FrameIntersection::from_frames([("customers", customers), ("orders", orders)])
    }

    #[tokio::test]
    async fn test_integer_float_values_match() {
        let p = provider();
        let count = p
            .intersect("customers", &cols(&["id"]), "orders", &cols(&["customer_id"]))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_distinct_counts_skip_nulls() {
        let p = provider();
        assert_eq!(p.distinct_tuple_count("orders", &cols(&["customer_id"])).await.unwrap(), 3);
        assert_eq!(
            p.distinct_tuple_count("orders", &cols(&["customer_id", "region"])).await.unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_composite_intersection_uses_whole_tuple() {
        let p = provider();
        let count = p
            .intersect(
                "customers",
                &cols(&["id", "region"]),
                "orders",
                &cols(&["customer_id", "region"]),
            )
            .await
            .unwrap();
        // (1, north) matches; (3, north) vs (3, west) does not
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_unknown_column_is_an_error() {
        let p = provider();
        let err = p
            .distinct_tuple_count("customers", &cols(&["missing"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::UnknownColumn { .. }));
    }

    #[test]
    fn test_float_text() {
        assert_eq!(float_text(3.0), "3");
        assert_eq!(float_text(2.5), "2.5");
    }
}
