use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Insufficient datasets: link prediction needs at least two, got {0}")]
    InsufficientDatasets(usize),

    #[error("Duplicate dataset name: {0}")]
    DuplicateDataset(String),

    #[error("Prerequisite analysis missing for dataset '{dataset}': {reason}")]
    PrerequisiteMissing { dataset: String, reason: String },

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Unknown column '{column}' in dataset '{dataset}'")]
    UnknownColumn { dataset: String, column: String },

    #[error("Intersection failed: {0}")]
    IntersectionFailure(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid candidate: {0}")]
    InvalidCandidate(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prediction cancelled after {completed_pairs} completed pair(s)")]
    Cancelled { completed_pairs: usize },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Polars error: {0}")]
    Polars(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<polars::error::PolarsError> for LinkError {
    fn from(err: polars::error::PolarsError) -> Self {
        LinkError::Polars(err.to_string())
    }
}

impl From<sqlx::Error> for LinkError {
    fn from(err: sqlx::Error) -> Self {
        LinkError::Database(err.to_string())
    }
}

impl LinkError {
    /// Failures that only cost the current candidate and never the sweep.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LinkError::IntersectionFailure(_)
                | LinkError::Validation(_)
                | LinkError::Database(_)
                | LinkError::Polars(_)
                | LinkError::Llm(_)
                | LinkError::UnknownColumn { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(LinkError::IntersectionFailure("timeout".to_string()).is_recoverable());
        assert!(LinkError::Validation("bad json".to_string()).is_recoverable());
        assert!(!LinkError::InsufficientDatasets(1).is_recoverable());
        assert!(!LinkError::Serialization("disk full".to_string()).is_recoverable());
    }

    #[test]
    fn test_prerequisite_message_names_dataset() {
        let err = LinkError::PrerequisiteMissing {
            dataset: "orders".to_string(),
            reason: "key identification has not run".to_string(),
        };
        assert!(err.to_string().contains("'orders'"));
    }
}
