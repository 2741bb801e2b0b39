//! Predicted links and the relationship view derived from them

use crate::cardinality;
use crate::config::DEFAULT_CARDINALITY_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationshipType::OneToOne => "one_to_one",
            RelationshipType::OneToMany => "one_to_many",
            RelationshipType::ManyToOne => "many_to_one",
            RelationshipType::ManyToMany => "many_to_many",
        };
        f.write_str(s)
    }
}

/// A discovered link between column sets of two datasets.
///
/// Links produced by the predictor are stored in canonical orientation: the
/// "one" side of the relationship is `from`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictedLink {
    pub from_dataset: String,
    pub from_columns: Vec<String>,
    pub to_dataset: String,
    pub to_columns: Vec<String>,
    pub intersect_count: u64,
    pub intersect_ratio_from_col: f64,
    pub intersect_ratio_to_col: f64,
    pub accuracy: f64,
    pub from_uniqueness_ratio: Option<f64>,
    pub to_uniqueness_ratio: Option<f64>,
    /// Kept on heuristic evidence after validation ran out of retries
    #[serde(default)]
    pub low_confidence: bool,
}

impl PredictedLink {
    /// True when this link joins `a` and `b`, in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.from_dataset == a && self.to_dataset == b) || (self.from_dataset == b && self.to_dataset == a)
    }

    pub fn involves(&self, dataset: &str) -> bool {
        self.from_dataset == dataset || self.to_dataset == dataset
    }

    /// Orientation-independent identity of the link's two endpoints.
    pub fn endpoint_key(&self) -> ((String, Vec<String>), (String, Vec<String>)) {
        let from = (self.from_dataset.clone(), self.from_columns.clone());
        let to = (self.to_dataset.clone(), self.to_columns.clone());
        if from <= to {
            (from, to)
        } else {
            (to, from)
        }
    }

    pub fn is_composite(&self) -> bool {
        self.from_columns.len() > 1
    }

    /// Same as [`relationship_with`](Self::relationship_with) at the default
    /// cardinality threshold.
    pub fn relationship(&self) -> Relationship {
        self.relationship_with(DEFAULT_CARDINALITY_THRESHOLD)
    }

    /// Relationship view of this link. The endpoints are taken as stored; only
    /// the type is derived from the uniqueness ratios.
    pub fn relationship_with(&self, cardinality_threshold: f64) -> Relationship {
        let kind = cardinality::relationship_type(
            self.from_uniqueness_ratio,
            self.to_uniqueness_ratio,
            cardinality_threshold,
        );
        let name = format!(
            "{}_{}_{}_{}",
            self.from_dataset,
            self.from_columns.join("_"),
            self.to_dataset,
            self.to_columns.join("_")
        );
        Relationship {
            name,
            kind,
            source: RelationshipTable {
                table: self.from_dataset.clone(),
                columns: self.from_columns.clone(),
            },
            target: RelationshipTable {
                table: self.to_dataset.clone(),
                columns: self.to_columns.clone(),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipTable {
    pub table: String,
    pub columns: Vec<String>,
}

impl RelationshipTable {
    /// `table.col1.col2` - field id used by join-path builders
    pub fn field_id(&self) -> String {
        format!("{}.{}", self.table, self.columns.join("."))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    pub source: RelationshipTable,
    pub target: RelationshipTable,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(from_uniq: Option<f64>, to_uniq: Option<f64>) -> PredictedLink {
        PredictedLink {
            from_dataset: "customers".to_string(),
            from_columns: vec!["id".to_string()],
            to_dataset: "orders".to_string(),
            to_columns: vec!["customer_id".to_string()],
            intersect_count: 3,
            intersect_ratio_from_col: 1.0,
            intersect_ratio_to_col: 1.0,
            accuracy: 1.0,
            from_uniqueness_ratio: from_uniq,
            to_uniqueness_ratio: to_uniq,
            low_confidence: false,
        }
    }

    #[test]
    fn test_relationship_view_keeps_stored_orientation() {
        let rel = link(Some(1.0), Some(0.3)).relationship();
        assert_eq!(rel.kind, RelationshipType::OneToMany);
        assert_eq!(rel.source.table, "customers");
        assert_eq!(rel.target.field_id(), "orders.customer_id");
        assert_eq!(rel.name, "customers_id_orders_customer_id");
    }

    #[test]
    fn test_endpoint_key_is_orientation_free() {
        let forward = link(Some(1.0), Some(1.0));
        let mut backward = forward.clone();
        std::mem::swap(&mut backward.from_dataset, &mut backward.to_dataset);
        std::mem::swap(&mut backward.from_columns, &mut backward.to_columns);

        assert_eq!(forward.endpoint_key(), backward.endpoint_key());
        assert!(backward.connects("customers", "orders"));
        assert!(backward.connects("orders", "customers"));
        assert!(!backward.involves("payments"));
    }

    #[test]
    fn test_composite_link_field_ids() {
        let mut composite = link(Some(1.0), Some(0.5));
        assert!(!composite.is_composite());
        composite.from_columns = vec!["name".to_string(), "class".to_string()];
        composite.to_columns = vec!["winner_name".to_string(), "winner_class".to_string()];

        assert!(composite.is_composite());
        assert_eq!(composite.relationship().source.field_id(), "customers.name.class");
    }

    #[test]
    fn test_type_serializes_snake_case() {
        let rel = link(None, None).relationship();
        let json = serde_json::to_value(&rel).unwrap();
        assert_eq!(json["type"], "many_to_many");
    }
}
