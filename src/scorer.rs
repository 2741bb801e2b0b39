//! Link scoring - intersection counts to ratios, accuracy and acceptance

use crate::candidate::CandidatePair;
use crate::dataset::{ratio, Dataset};
use crate::error::{LinkError, Result};
use crate::intersection::IntersectionProvider;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A candidate with its intersection metrics, oriented as generated (A -> B).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: CandidatePair,
    pub intersect_count: u64,
    pub intersect_ratio_from_col: f64,
    pub intersect_ratio_to_col: f64,
    pub accuracy: f64,
    pub from_uniqueness_ratio: Option<f64>,
    pub to_uniqueness_ratio: Option<f64>,
    /// Columns on one side are exactly that dataset's identified key
    pub key_anchored: bool,
}

pub struct LinkScorer {
    provider: Arc<dyn IntersectionProvider>,
    threshold: f64,
    timeout: Duration,
}

impl LinkScorer {
    pub fn new(provider: Arc<dyn IntersectionProvider>, threshold: f64, timeout: Duration) -> Self {
        Self {
            provider,
            threshold,
            timeout,
        }
    }

    /// Acceptance gate: closed lower bound on accuracy, or a key-anchored
    /// single column with a non-empty intersection. Composites are anchored
    /// by construction, so they only pass on accuracy.
    pub fn accepts(&self, scored: &ScoredCandidate) -> bool {
        if scored.candidate.is_composite() {
            return scored.accuracy >= self.threshold;
        }
        scored.accuracy >= self.threshold || (scored.key_anchored && scored.intersect_count > 0)
    }

    pub async fn score(&self, a: &Dataset, b: &Dataset, candidate: &CandidatePair) -> Result<ScoredCandidate> {
        let intersect_count = self
            .bounded(self.provider.intersect(
                a.name(),
                &candidate.columns_a,
                b.name(),
                &candidate.columns_b,
            ))
            .await?;

        let (distinct_a, uniqueness_a) = self.own_side(a, &candidate.columns_a).await?;
        let (distinct_b, uniqueness_b) = self.own_side(b, &candidate.columns_b).await?;

        let ratio_from = ratio(intersect_count, distinct_a);
        let ratio_to = ratio(intersect_count, distinct_b);

        Ok(ScoredCandidate {
            candidate: candidate.clone(),
            intersect_count,
            intersect_ratio_from_col: ratio_from,
            intersect_ratio_to_col: ratio_to,
            accuracy: ratio_from.max(ratio_to),
            from_uniqueness_ratio: uniqueness_a,
            to_uniqueness_ratio: uniqueness_b,
            key_anchored: a.is_key(&candidate.columns_a) || b.is_key(&candidate.columns_b),
        })
    }

    /// Score every candidate in order, skipping those whose intersection
    /// fails. Returns the accepted candidates.
    pub async fn score_accepted(
        &self,
        a: &Dataset,
        b: &Dataset,
        candidates: &[CandidatePair],
    ) -> Vec<ScoredCandidate> {
        self.score_all(a, b, candidates)
            .await
            .into_iter()
            .filter(|scored| self.gate(scored))
            .collect()
    }

    /// Score composite candidates. Per multi-column key, every assignment
    /// that clears the gate is kept; when none does, only the most accurate
    /// overlapping assignment survives.
    pub async fn score_composites(
        &self,
        a: &Dataset,
        b: &Dataset,
        candidates: &[CandidatePair],
    ) -> Vec<ScoredCandidate> {
        let (keyed_on_a, keyed_on_b): (Vec<_>, Vec<_>) = self
            .score_all(a, b, candidates)
            .await
            .into_iter()
            .partition(|scored| a.is_key(&scored.candidate.columns_a));

        let mut accepted = Vec::new();
        for group in [keyed_on_a, keyed_on_b] {
            let (passed, below): (Vec<_>, Vec<_>) = group.into_iter().partition(|scored| self.gate(scored));
            if !passed.is_empty() {
                accepted.extend(passed);
                continue;
            }
            let best = below
                .into_iter()
                .filter(|scored| scored.intersect_count > 0)
                .reduce(|best, scored| if scored.accuracy > best.accuracy { scored } else { best });
            if let Some(best) = best {
                debug!(
                    from = %a.name(), from_columns = ?best.candidate.columns_a,
                    to = %b.name(), to_columns = ?best.candidate.columns_b,
                    accuracy = best.accuracy,
                    "Keeping best composite assignment below threshold"
                );
                accepted.push(best);
            }
        }
        accepted
    }

    fn gate(&self, scored: &ScoredCandidate) -> bool {
        let accepted = self.accepts(scored);
        debug!(
            from = %scored.candidate.dataset_a, from_columns = ?scored.candidate.columns_a,
            to = %scored.candidate.dataset_b, to_columns = ?scored.candidate.columns_b,
            accuracy = scored.accuracy,
            accepted,
            "Candidate scored"
        );
        accepted
    }

    async fn score_all(&self, a: &Dataset, b: &Dataset, candidates: &[CandidatePair]) -> Vec<ScoredCandidate> {
        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.score(a, b, candidate).await {
                Ok(s) => scored.push(s),
                Err(e) => {
                    warn!(
                        "Skipping candidate {}.{:?} <-> {}.{:?}: {}",
                        a.name(),
                        candidate.columns_a,
                        b.name(),
                        candidate.columns_b,
                        e
                    );
                }
            }
        }
        scored
    }

    /// Distinct tuples and uniqueness of the candidate columns in their own table.
    async fn own_side(&self, dataset: &Dataset, columns: &[String]) -> Result<(u64, Option<f64>)> {
        if let [column] = columns {
            let stat = dataset.column(column).ok_or_else(|| LinkError::UnknownColumn {
                dataset: dataset.name().to_string(),
                column: column.clone(),
            })?;
            let uniqueness = (stat.count > 0).then(|| stat.uniqueness());
            return Ok((stat.distinct_count, uniqueness));
        }

        let distinct = self
            .bounded(self.provider.distinct_tuple_count(dataset.name(), columns))
            .await?;
        let rows = dataset.row_count();
        let uniqueness = (rows > 0).then(|| ratio(distinct, rows));
        Ok((distinct, uniqueness))
    }

    /// Apply the call timeout; every failure surfaces as `IntersectionFailure`.
    async fn bounded<F>(&self, call: F) -> Result<u64>
    where
        F: Future<Output = Result<u64>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(count)) => Ok(count),
            Ok(Err(LinkError::IntersectionFailure(msg))) => Err(LinkError::IntersectionFailure(msg)),
            Ok(Err(e)) => Err(LinkError::IntersectionFailure(e.to_string())),
            Err(_) => Err(LinkError::IntersectionFailure(format!(
                "timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ColumnStat, L1Type};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Fixed answers: every intersection returns `shared`, composite distinct
    /// counts return `tuples`.
    struct Fixed {
        shared: u64,
        tuples: u64,
    }

    #[async_trait]
    impl IntersectionProvider for Fixed {
        async fn intersect(&self, _: &str, _: &[String], _: &str, _: &[String]) -> Result<u64> {
            Ok(self.shared)
        }

        async fn distinct_tuple_count(&self, _: &str, _: &[String]) -> Result<u64> {
            Ok(self.tuples)
        }
    }

    struct Stalled;

    #[async_trait]
    impl IntersectionProvider for Stalled {
        async fn intersect(&self, _: &str, _: &[String], _: &str, _: &[String]) -> Result<u64> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0)
        }

        async fn distinct_tuple_count(&self, _: &str, _: &[String]) -> Result<u64> {
            Ok(0)
        }
    }

    fn customers() -> Dataset {
        Dataset::analyzed(
            "customers",
            vec![ColumnStat::new("id", L1Type::Integer, 10, 0, 10)],
            Some(vec!["id".to_string()]),
        )
    }

    fn orders() -> Dataset {
        Dataset::analyzed(
            "orders",
            vec![
                ColumnStat::new("customer_id", L1Type::Integer, 40, 0, 9),
                ColumnStat::new("quantity", L1Type::Integer, 40, 0, 5),
            ],
            Some(vec![]),
        )
    }

    fn scorer(shared: u64, threshold: f64) -> LinkScorer {
        LinkScorer::new(Arc::new(Fixed { shared, tuples: 0 }), threshold, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_ratios_and_accuracy() {
        let candidate = CandidatePair::single("customers", "id", "orders", "customer_id");
        let scored = scorer(9, 0.9).score(&customers(), &orders(), &candidate).await.unwrap();

        assert_eq!(scored.intersect_count, 9);
        assert!((scored.intersect_ratio_from_col - 0.9).abs() < 1e-12);
        assert_eq!(scored.intersect_ratio_to_col, 1.0);
        assert_eq!(scored.accuracy, 1.0);
        assert_eq!(scored.from_uniqueness_ratio, Some(1.0));
        assert!((scored.to_uniqueness_ratio.unwrap() - 9.0 / 40.0).abs() < 1e-12);
        assert!(scored.key_anchored);
    }

    #[tokio::test]
    async fn test_threshold_is_closed_lower_bound() {
        let a = Dataset::analyzed("a", vec![ColumnStat::new("x", L1Type::Integer, 10, 0, 10)], Some(vec![]));
        let b = Dataset::analyzed("b", vec![ColumnStat::new("y", L1Type::Integer, 10, 0, 10)], Some(vec![]));
        let candidate = CandidatePair::single("a", "x", "b", "y");

        let at = scorer(9, 0.9).score(&a, &b, &candidate).await.unwrap();
        assert!(scorer(9, 0.9).accepts(&at));

        let below = scorer(8, 0.9).score(&a, &b, &candidate).await.unwrap();
        assert!(!scorer(8, 0.9).accepts(&below));
    }

    #[tokio::test]
    async fn test_key_anchor_needs_some_overlap() {
        let candidate = CandidatePair::single("customers", "id", "orders", "quantity");

        let disjoint = scorer(0, 0.9).score(&customers(), &orders(), &candidate).await.unwrap();
        assert!(disjoint.key_anchored);
        assert!(!scorer(0, 0.9).accepts(&disjoint));

        let partial = scorer(2, 0.9).score(&customers(), &orders(), &candidate).await.unwrap();
        assert!(partial.accuracy < 0.9);
        assert!(scorer(2, 0.9).accepts(&partial));
    }

    #[tokio::test]
    async fn test_composite_uses_provider_tuple_counts() {
        let players = Dataset::analyzed(
            "players",
            vec![
                ColumnStat::new("name", L1Type::CloseEndedText, 4, 0, 4),
                ColumnStat::new("class", L1Type::CloseEndedText, 4, 0, 3),
            ],
            Some(vec!["name".to_string(), "class".to_string()]),
        );
        let games = Dataset::analyzed(
            "games",
            vec![
                ColumnStat::new("winner_name", L1Type::CloseEndedText, 8, 0, 3),
                ColumnStat::new("winner_class", L1Type::CloseEndedText, 8, 0, 3),
            ],
            Some(vec![]),
        );
        let candidate = CandidatePair::new(
            "players",
            vec!["name".to_string(), "class".to_string()],
            "games",
            vec!["winner_name".to_string(), "winner_class".to_string()],
        )
        .unwrap();
        let scorer = LinkScorer::new(Arc::new(Fixed { shared: 4, tuples: 4 }), 0.9, Duration::from_secs(1));
        let scored = scorer.score(&players, &games, &candidate).await.unwrap();

        assert_eq!(scored.from_uniqueness_ratio, Some(1.0));
        assert_eq!(scored.to_uniqueness_ratio, Some(0.5));
        assert_eq!(scored.accuracy, 1.0);
    }

    /// Intersections keyed by the B-side columns; tuple counts by dataset.
    struct Lookup {
        shared: HashMap<Vec<String>, u64>,
        tuples: HashMap<String, u64>,
    }

    #[async_trait]
    impl IntersectionProvider for Lookup {
        async fn intersect(&self, _: &str, _: &[String], _: &str, cols_b: &[String]) -> Result<u64> {
            Ok(self.shared.get(cols_b).copied().unwrap_or(0))
        }

        async fn distinct_tuple_count(&self, dataset: &str, _: &[String]) -> Result<u64> {
            Ok(self.tuples.get(dataset).copied().unwrap_or(0))
        }
    }

    fn roster() -> (Dataset, Dataset) {
        let text = |name: &str, distinct| ColumnStat::new(name, L1Type::CloseEndedText, 6, 0, distinct);
        let players = Dataset::analyzed(
            "players",
            vec![text("name", 4), text("class", 3)],
            Some(vec!["name".to_string(), "class".to_string()]),
        );
        let games = Dataset::analyzed(
            "games",
            vec![
                text("winner_name", 2),
                text("winner_class", 2),
                text("loser_name", 3),
                text("loser_class", 2),
            ],
            Some(vec![]),
        );
        (players, games)
    }

    fn against_players(columns_b: [&str; 2]) -> CandidatePair {
        CandidatePair::new(
            "players",
            vec!["name".to_string(), "class".to_string()],
            "games",
            columns_b.iter().map(|c| c.to_string()).collect(),
        )
        .unwrap()
    }

    fn lookup(shared: &[([&str; 2], u64)]) -> LinkScorer {
        let provider = Lookup {
            shared: shared
                .iter()
                .map(|(cols, n)| (cols.iter().map(|c| c.to_string()).collect(), *n))
                .collect(),
            tuples: HashMap::from([("players".to_string(), 5), ("games".to_string(), 3)]),
        };
        LinkScorer::new(Arc::new(provider), 0.9, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_composite_mix_below_threshold_is_dropped() {
        let (players, games) = roster();
        let scorer = lookup(&[
            (["winner_name", "winner_class"], 3),
            (["winner_name", "loser_class"], 1),
            (["loser_name", "loser_class"], 3),
        ]);
        let candidates = vec![
            against_players(["winner_name", "winner_class"]),
            against_players(["winner_name", "loser_class"]),
            against_players(["loser_name", "loser_class"]),
        ];

        let mix = scorer.score(&players, &games, &candidates[1]).await.unwrap();
        assert!(mix.key_anchored);
        assert!(!scorer.accepts(&mix));

        let accepted = scorer.score_composites(&players, &games, &candidates).await;
        assert_eq!(accepted.len(), 2);
        assert!(accepted
            .iter()
            .all(|s| s.candidate.columns_b != vec!["winner_name", "loser_class"]));
    }

    #[tokio::test]
    async fn test_best_composite_kept_when_none_clears_threshold() {
        let (players, games) = roster();
        let scorer = lookup(&[(["winner_name", "loser_class"], 1), (["loser_name", "winner_class"], 2)]);
        let candidates = vec![
            against_players(["winner_name", "loser_class"]),
            against_players(["loser_name", "winner_class"]),
        ];

        let accepted = scorer.score_composites(&players, &games, &candidates).await;
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].candidate.columns_b, vec!["loser_name", "winner_class"]);
        assert_eq!(accepted[0].intersect_count, 2);

        let disjoint = lookup(&[]);
        assert!(disjoint.score_composites(&players, &games, &candidates).await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_becomes_intersection_failure() {
        let scorer = LinkScorer::new(Arc::new(Stalled), 0.9, Duration::from_millis(50));
        let candidate = CandidatePair::single("customers", "id", "orders", "customer_id");
        let err = scorer.score(&customers(), &orders(), &candidate).await.unwrap_err();
        assert!(matches!(err, LinkError::IntersectionFailure(_)));

        let accepted = scorer.score_accepted(&customers(), &orders(), &[candidate]).await;
        assert!(accepted.is_empty());
    }
}
