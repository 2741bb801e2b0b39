//! Cardinality classification
//!
//! Maps the uniqueness ratios of both endpoints to a relationship type and
//! picks the canonical orientation: the more unique side becomes the source.
//!
//! Rules, in order, with threshold `U`:
//! 1. both ratios unknown -> many_to_many, orientation kept
//! 2. neither side reaches `U` -> many_to_many, orientation kept
//! 3. equal ratios -> one_to_one, source and target swapped
//! 4. source more unique -> kept; one_to_one if both reach `U`, else one_to_many
//! 5. target more unique -> swapped; one_to_one if both reach `U`, else one_to_many
//!
//! A single unknown ratio counts as 0.

use crate::link::RelationshipType;

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub source_table: String,
    pub source_columns: Vec<String>,
    pub target_table: String,
    pub target_columns: Vec<String>,
    pub kind: RelationshipType,
    pub swapped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Keep,
    Swap,
}

fn decide(from_uniq: Option<f64>, to_uniq: Option<f64>, threshold: f64) -> (RelationshipType, Orientation) {
    if from_uniq.is_none() && to_uniq.is_none() {
        return (RelationshipType::ManyToMany, Orientation::Keep);
    }
    let from = from_uniq.unwrap_or(0.0);
    let to = to_uniq.unwrap_or(0.0);

    if from < threshold && to < threshold {
        return (RelationshipType::ManyToMany, Orientation::Keep);
    }
    let both_unique = from >= threshold && to >= threshold;
    let kind = if both_unique {
        RelationshipType::OneToOne
    } else {
        RelationshipType::OneToMany
    };

    if from == to {
        (RelationshipType::OneToOne, Orientation::Swap)
    } else if from > to {
        (kind, Orientation::Keep)
    } else {
        (kind, Orientation::Swap)
    }
}

pub fn classify(
    source_table: &str,
    source_columns: &[String],
    target_table: &str,
    target_columns: &[String],
    from_uniq: Option<f64>,
    to_uniq: Option<f64>,
    threshold: f64,
) -> Classification {
    debug_assert_eq!(source_columns.len(), target_columns.len());
    let (kind, orientation) = decide(from_uniq, to_uniq, threshold);
    match orientation {
        Orientation::Keep => Classification {
            source_table: source_table.to_string(),
            source_columns: source_columns.to_vec(),
            target_table: target_table.to_string(),
            target_columns: target_columns.to_vec(),
            kind,
            swapped: false,
        },
        Orientation::Swap => Classification {
            source_table: target_table.to_string(),
            source_columns: target_columns.to_vec(),
            target_table: source_table.to_string(),
            target_columns: source_columns.to_vec(),
            kind,
            swapped: true,
        },
    }
}

/// Type only; the same for a link and its canonically oriented form.
pub fn relationship_type(from_uniq: Option<f64>, to_uniq: Option<f64>, threshold: f64) -> RelationshipType {
    decide(from_uniq, to_uniq, threshold).0
}
