//! Intersection providers
//!
//! The predictor never reads data itself. It asks an [`IntersectionProvider`]
//! how many distinct non-null tuples two column sets share, and how many
//! distinct tuples a column set holds on its own.

pub mod frame;
pub mod postgres;

pub use frame::FrameIntersection;
pub use postgres::PgIntersection;

use crate::error::Result;
use async_trait::async_trait;

/// Must be safe to share across the predictor's worker tasks.
#[async_trait]
pub trait IntersectionProvider: Send + Sync {
    /// Distinct non-null tuples of `columns_a` in `dataset_a` that also occur
    /// as tuples of `columns_b` in `dataset_b`. Columns are compared
    /// positionally.
    async fn intersect(
        &self,
        dataset_a: &str,
        columns_a: &[String],
        dataset_b: &str,
        columns_b: &[String],
    ) -> Result<u64>;

    /// Distinct non-null tuples of `columns` within `dataset`.
    async fn distinct_tuple_count(&self, dataset: &str, columns: &[String]) -> Result<u64>;
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Like [`quote_ident`], keeping schema qualification (`schema.table`).
pub(crate) fn quote_table(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("a.b"), "\"a.b\"");
        assert_eq!(quote_table("sales.orders"), "\"sales\".\"orders\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
