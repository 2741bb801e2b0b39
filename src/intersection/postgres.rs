//! Pushed-down intersections against PostgreSQL using sqlx

use super::{quote_ident, quote_table, IntersectionProvider};
use crate::error::{LinkError, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Runs `INTERSECT` / `COUNT(DISTINCT ...)` queries on the backing tables.
///
/// Values are cast to text before comparison so integer and float columns
/// compare by rendered value.
#[derive(Clone)]
pub struct PgIntersection {
    pool: PgPool,
    /// Dataset name -> (optionally schema-qualified) table name
    tables: HashMap<String, String>,
}

impl PgIntersection {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tables: HashMap::new(),
        }
    }

    /// Open a pool and check it with `SELECT 1`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self::new(pool))
    }

    /// Map a dataset to a table; by default a dataset reads the table of the same name.
    pub fn with_table(mut self, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        self.tables.insert(dataset.into(), table.into());
        self
    }

    fn table_for<'a>(&'a self, dataset: &'a str) -> &'a str {
        self.tables.get(dataset).map(String::as_str).unwrap_or(dataset)
    }

    fn distinct_select(&self, dataset: &str, columns: &[String]) -> String {
        build_distinct_select(self.table_for(dataset), columns)
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        debug!(%sql, "Running intersection query");
        let count: i64 = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        u64::try_from(count).map_err(|_| LinkError::Database(format!("negative count {} from: {}", count, sql)))
    }
}

pub(crate) fn build_distinct_select(table: &str, columns: &[String]) -> String {
    let projection = columns
        .iter()
        .map(|c| format!("CAST({} AS TEXT)", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let not_null = columns
        .iter()
        .map(|c| format!("{} IS NOT NULL", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(
        "SELECT DISTINCT {} FROM {} WHERE {}",
        projection,
        quote_table(table),
        not_null
    )
}

#[async_trait]
impl IntersectionProvider for PgIntersection {
    async fn intersect(
        &self,
        dataset_a: &str,
        columns_a: &[String],
        dataset_b: &str,
        columns_b: &[String],
    ) -> Result<u64> {
        if columns_a.is_empty() || columns_a.len() != columns_b.len() {
            return Err(LinkError::InvalidCandidate(format!(
                "cannot intersect {} column(s) with {}",
                columns_a.len(),
                columns_b.len()
            )));
        }
        let sql = format!(
            "SELECT COUNT(*) FROM ({} INTERSECT {}) AS shared",
            self.distinct_select(dataset_a, columns_a),
            self.distinct_select(dataset_b, columns_b)
        );
        self.count(&sql).await
    }

    async fn distinct_tuple_count(&self, dataset: &str, columns: &[String]) -> Result<u64> {
        if columns.is_empty() {
            return Err(LinkError::InvalidCandidate(format!(
                "empty column list for dataset '{}'",
                dataset
            )));
        }
        let sql = format!(
            "SELECT COUNT(*) FROM ({}) AS tuples",
            self.distinct_select(dataset, columns)
        );
        self.count(&sql).await
    }
}
