//! Datatype compatibility - which column pairs are worth an intersection

use crate::dataset::{ColumnStat, L1Type};

/// Groups of distinct L1 types whose values can still overlap.
pub const FEASIBLE_GROUPS: [[L1Type; 2]; 3] = [
    [L1Type::Integer, L1Type::Float],
    [L1Type::Alphanumeric, L1Type::CloseEndedText],
    [L1Type::CloseEndedText, L1Type::OpenEndedText],
];

pub fn compatible(a: L1Type, b: L1Type) -> bool {
    if a == b {
        return true;
    }
    FEASIBLE_GROUPS
        .iter()
        .any(|group| group.contains(&a) && group.contains(&b))
}

/// Column-level filter used by candidate generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DtypeFilter {
    pub remove_datetime_candidates: bool,
}

impl DtypeFilter {
    pub fn new(remove_datetime_candidates: bool) -> Self {
        Self { remove_datetime_candidates }
    }

    /// Whether a column may take part in any candidate at all.
    pub fn admits(&self, column: &ColumnStat) -> bool {
        !(self.remove_datetime_candidates && column.l1_type == L1Type::DateTime)
    }

    pub fn pair_feasible(&self, a: &ColumnStat, b: &ColumnStat) -> bool {
        self.admits(a) && self.admits(b) && compatible(a.l1_type, b.l1_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_types_compatible() {
        assert!(compatible(L1Type::DateTime, L1Type::DateTime));
        assert!(compatible(L1Type::Others, L1Type::Others));
    }

    #[test]
    fn test_groups() {
        assert!(compatible(L1Type::Integer, L1Type::Float));
        assert!(compatible(L1Type::Float, L1Type::Integer));
        assert!(compatible(L1Type::Alphanumeric, L1Type::CloseEndedText));
        assert!(compatible(L1Type::OpenEndedText, L1Type::CloseEndedText));
        // no transitivity through close_ended_text
        assert!(!compatible(L1Type::Alphanumeric, L1Type::OpenEndedText));
        assert!(!compatible(L1Type::Integer, L1Type::Alphanumeric));
        assert!(!compatible(L1Type::Others, L1Type::OpenEndedText));
    }

    #[test]
    fn test_datetime_removal() {
        let created = ColumnStat::new("created_at", L1Type::DateTime, 5, 0, 5);
        let shipped = ColumnStat::new("shipped_at", L1Type::DateTime, 5, 0, 5);

        assert!(DtypeFilter::new(false).pair_feasible(&created, &shipped));
        assert!(!DtypeFilter::new(true).pair_feasible(&created, &shipped));
    }
}
