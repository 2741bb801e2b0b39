pub mod analysis;
pub mod candidate;
pub mod cardinality;
pub mod config;
pub mod dataset;
pub mod dtype;
pub mod error;
pub mod intersection;
pub mod link;
pub mod persistence;
pub mod predictor;
pub mod scorer;
pub mod validator;

pub use analysis::{load_csv_dir, profile_frame, DatasetAnalyzer, FrameAnalyzer};
pub use candidate::{CandidateGenerator, CandidatePair};
pub use cardinality::{classify, Classification};
pub use config::{PredictorConfig, RetryPolicy};
pub use dataset::{ColumnStat, Dataset, L1Type};
pub use dtype::{compatible, DtypeFilter};
pub use error::{LinkError, Result};
pub use intersection::{FrameIntersection, IntersectionProvider, PgIntersection};
pub use link::{PredictedLink, Relationship, RelationshipTable, RelationshipType};
pub use persistence::{load_links, save_links, LinkDocument};
pub use predictor::Predictor;
pub use scorer::{LinkScorer, ScoredCandidate};
pub use validator::{LinkValidator, LlmValidator, ValidationOutcome, ValidationRequest, ValidationState, ValidatorBackend};

// Cancellation handle accepted by `Predictor::predict_with_cancel`
pub use tokio_util::sync::CancellationToken;
