//! Candidate generation
//!
//! Enumerates the column pairs between two datasets that are worth scoring:
//! - single-column pairs filtered by datatype compatibility
//! - composite pairs that test a multi-column key as a whole tuple

use crate::dataset::Dataset;
use crate::dtype::DtypeFilter;
use crate::error::{LinkError, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Columns of A positionally aligned with columns of B.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidatePair {
    pub dataset_a: String,
    pub columns_a: Vec<String>,
    pub dataset_b: String,
    pub columns_b: Vec<String>,
}

impl CandidatePair {
    pub fn new(
        dataset_a: impl Into<String>,
        columns_a: Vec<String>,
        dataset_b: impl Into<String>,
        columns_b: Vec<String>,
    ) -> Result<Self> {
        debug_assert_eq!(columns_a.len(), columns_b.len(), "candidate columns must align");
        if columns_a.is_empty() || columns_a.len() != columns_b.len() {
            return Err(LinkError::InvalidCandidate(format!(
                "column lists must be non-empty and aligned, got {} vs {}",
                columns_a.len(),
                columns_b.len()
            )));
        }
        Ok(Self {
            dataset_a: dataset_a.into(),
            columns_a,
            dataset_b: dataset_b.into(),
            columns_b,
        })
    }

    pub fn single(dataset_a: &str, column_a: &str, dataset_b: &str, column_b: &str) -> Self {
        Self {
            dataset_a: dataset_a.to_string(),
            columns_a: vec![column_a.to_string()],
            dataset_b: dataset_b.to_string(),
            columns_b: vec![column_b.to_string()],
        }
    }

    pub fn width(&self) -> usize {
        self.columns_a.len()
    }

    pub fn is_composite(&self) -> bool {
        self.width() > 1
    }

    pub fn aligned(&self) -> impl Iterator<Item = (&String, &String)> {
        self.columns_a.iter().zip(self.columns_b.iter())
    }

    /// True when every aligned column pair of `other` is also aligned here and
    /// `other` is narrower. Used to drop the parts of an accepted composite key.
    pub fn covers(&self, other: &CandidatePair) -> bool {
        if self.dataset_a != other.dataset_a
            || self.dataset_b != other.dataset_b
            || other.width() >= self.width()
        {
            return false;
        }
        let own: HashSet<(&String, &String)> = self.aligned().collect();
        other.aligned().all(|pair| own.contains(&pair))
    }

    fn dedup_key(&self) -> (Vec<String>, Vec<String>) {
        (self.columns_a.clone(), self.columns_b.clone())
    }
}

/// Stateless generator; all state is in its configuration.
#[derive(Debug, Clone, Copy)]
pub struct CandidateGenerator {
    filter: DtypeFilter,
    max_composite_candidates: usize,
}

impl CandidateGenerator {
    pub fn new(filter: DtypeFilter, max_composite_candidates: usize) -> Self {
        Self {
            filter,
            max_composite_candidates,
        }
    }

    /// Every compatible (a, b) column pair, in column order of A then B.
    pub fn single_column(&self, a: &Dataset, b: &Dataset) -> Vec<CandidatePair> {
        let pairs = a
            .columns()
            .iter()
            .cartesian_product(b.columns().iter())
            .filter(|(col_a, col_b)| self.filter.pair_feasible(col_a, col_b))
            .map(|(col_a, col_b)| CandidatePair::single(a.name(), &col_a.name, b.name(), &col_b.name))
            .collect();
        dedup(pairs)
    }

    /// Composite candidates for every multi-column key on either side.
    ///
    /// `accepted` holds the single-column candidates that passed the gate;
    /// for each key column they narrow the partner columns in the other
    /// dataset. Without accepted partners, every compatible column is tried.
    pub fn composite(&self, a: &Dataset, b: &Dataset, accepted: &[CandidatePair]) -> Vec<CandidatePair> {
        let mut out = Vec::new();
        out.extend(self.composite_for_key(a, b, accepted, false));
        out.extend(self.composite_for_key(b, a, accepted, true));
        dedup(out)
    }

    fn composite_for_key(
        &self,
        owner: &Dataset,
        other: &Dataset,
        accepted: &[CandidatePair],
        owner_is_b: bool,
    ) -> Vec<CandidatePair> {
        let key = match owner.key() {
            Some(key) if key.len() > 1 => key,
            _ => return Vec::new(),
        };

        let mut options: Vec<Vec<String>> = Vec::with_capacity(key.len());
        for key_col in key {
            let stat = match owner.column(key_col) {
                Some(stat) if self.filter.admits(stat) => stat,
                _ => return Vec::new(),
            };

            let mut partners: Vec<String> = accepted
                .iter()
                .filter(|c| !c.is_composite())
                .filter_map(|c| {
                    let (own, theirs) = if owner_is_b {
                        (&c.columns_b[0], &c.columns_a[0])
                    } else {
                        (&c.columns_a[0], &c.columns_b[0])
                    };
                    (own == key_col).then(|| theirs.clone())
                })
                .unique()
                .collect();

            if partners.is_empty() {
                partners = other
                    .columns()
                    .iter()
                    .filter(|col| self.filter.pair_feasible(stat, col))
                    .map(|col| col.name.clone())
                    .collect();
            }
            if partners.is_empty() {
                return Vec::new();
            }
            options.push(partners);
        }

        options
            .into_iter()
            .multi_cartesian_product()
            .filter(|assignment| assignment.iter().all_unique())
            .take(self.max_composite_candidates)
            .map(|assignment| {
                if owner_is_b {
                    CandidatePair {
                        dataset_a: other.name().to_string(),
                        columns_a: assignment,
                        dataset_b: owner.name().to_string(),
                        columns_b: key.to_vec(),
                    }
                } else {
                    CandidatePair {
                        dataset_a: owner.name().to_string(),
                        columns_a: key.to_vec(),
                        dataset_b: other.name().to_string(),
                        columns_b: assignment,
                    }
                }
            })
            .collect()
    }
}

fn dedup(pairs: Vec<CandidatePair>) -> Vec<CandidatePair> {
    let mut seen = HashSet::new();
    pairs
        .into_iter()
        .filter(|p| seen.insert(p.dedup_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ColumnStat, L1Type};

    fn text(name: &str) -> ColumnStat {
        ColumnStat::new(name, L1Type::CloseEndedText, 10, 0, 5)
    }

    fn players() -> Dataset {
        Dataset::analyzed(
            "players",
            vec![text("name"), text("class")],
            Some(vec!["name".to_string(), "class".to_string()]),
        )
    }

    fn games() -> Dataset {
        Dataset::analyzed(
            "games",
            vec![
                ColumnStat::new("game_id", L1Type::Integer, 10, 0, 10),
                text("winner_name"),
                text("winner_class"),
                text("loser_name"),
                text("loser_class"),
            ],
            Some(vec!["game_id".to_string()]),
        )
    }

    #[test]
    fn test_single_column_pass_respects_compatibility() {
        let customers = Dataset::analyzed(
            "customers",
            vec![
                ColumnStat::new("id", L1Type::Integer, 3, 0, 3),
                ColumnStat::new("signup", L1Type::DateTime, 3, 0, 3),
            ],
            Some(vec!["id".to_string()]),
        );
        let orders = Dataset::analyzed(
            "orders",
            vec![
                ColumnStat::new("customer_id", L1Type::Float, 5, 0, 3),
                ColumnStat::new("note", L1Type::OpenEndedText, 5, 0, 5),
                ColumnStat::new("placed", L1Type::DateTime, 5, 0, 5),
            ],
            None,
        );

        let generator = CandidateGenerator::new(DtypeFilter::new(false), 16);
        let pairs = generator.single_column(&customers, &orders);
        assert_eq!(
            pairs,
            vec![
                CandidatePair::single("customers", "id", "orders", "customer_id"),
                CandidatePair::single("customers", "signup", "orders", "placed"),
            ]
        );

        let generator = CandidateGenerator::new(DtypeFilter::new(true), 16);
        assert_eq!(generator.single_column(&customers, &orders).len(), 1);
    }

    #[test]
    fn test_composite_uses_accepted_partners_in_key_order() {
        let accepted = vec![
            CandidatePair::single("players", "name", "games", "winner_name"),
            CandidatePair::single("players", "name", "games", "loser_name"),
            CandidatePair::single("players", "class", "games", "winner_class"),
            CandidatePair::single("players", "class", "games", "loser_class"),
        ];
        let generator = CandidateGenerator::new(DtypeFilter::default(), 16);
        let composites = generator.composite(&players(), &games(), &accepted);

        assert_eq!(composites.len(), 4);
        assert!(composites.iter().all(|c| c.columns_a == vec!["name", "class"]));
        assert!(composites
            .iter()
            .any(|c| c.columns_b == vec!["winner_name", "winner_class"]));
        assert!(composites
            .iter()
            .any(|c| c.columns_b == vec!["loser_name", "loser_class"]));
    }

    #[test]
    fn test_composite_orients_when_key_is_on_b_side() {
        let generator = CandidateGenerator::new(DtypeFilter::default(), 16);
        let composites = generator.composite(&games(), &players(), &[]);

        assert!(!composites.is_empty());
        for c in &composites {
            assert_eq!(c.dataset_a, "games");
            assert_eq!(c.dataset_b, "players");
            assert_eq!(c.columns_b, vec!["name", "class"]);
            assert_eq!(c.columns_a.len(), 2);
            assert_ne!(c.columns_a[0], c.columns_a[1]);
        }
    }

    #[test]
    fn test_composite_respects_cap() {
        let generator = CandidateGenerator::new(DtypeFilter::default(), 3);
        assert_eq!(generator.composite(&players(), &games(), &[]).len(), 3);
    }

    #[test]
    fn test_covers_component_links() {
        let composite = CandidatePair::new(
            "players",
            vec!["name".to_string(), "class".to_string()],
            "games",
            vec!["winner_name".to_string(), "winner_class".to_string()],
        )
        .unwrap();
        assert!(composite.covers(&CandidatePair::single("players", "name", "games", "winner_name")));
        assert!(!composite.covers(&CandidatePair::single("players", "name", "games", "loser_name")));
        assert!(!composite.covers(&composite));
    }

    #[test]
    fn test_misaligned_candidate_rejected() {
        let result = std::panic::catch_unwind(|| {
            CandidatePair::new("a", vec!["x".to_string()], "b", vec![])
        });
        // debug builds assert, release builds return an error
        match result {
            Ok(inner) => assert!(matches!(inner, Err(LinkError::InvalidCandidate(_)))),
            Err(_) => assert!(cfg!(debug_assertions)),
        }
    }
}
