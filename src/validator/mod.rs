//! Link validation
//!
//! Bounded-retry state machine around an optional semantic judge:
//!
//! ```text
//! Pending -> Validating -> Accepted | Rejected | Error
//! Error   -> Validating            (while retries remain)
//! Error   -> RejectedWithWarning   (retry budget spent; link kept, low confidence)
//! Pending -> Accepted              (no backend configured)
//! ```

pub mod llm;

pub use llm::LlmValidator;

use crate::config::RetryPolicy;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::scorer::ScoredCandidate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationState {
    Pending,
    Validating,
    Accepted,
    Rejected,
    Error,
    RejectedWithWarning,
}

impl ValidationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ValidationState::Accepted | ValidationState::Rejected | ValidationState::RejectedWithWarning
        )
    }

    pub fn can_transition_to(&self, next: ValidationState) -> bool {
        use ValidationState::*;
        matches!(
            (self, next),
            (Pending, Validating)
                | (Pending, Accepted)
                | (Validating, Accepted)
                | (Validating, Rejected)
                | (Validating, Error)
                | (Error, Validating)
                | (Error, RejectedWithWarning)
        )
    }
}

/// What the judge sees: the scored candidate plus both datasets for samples.
pub struct ValidationRequest<'a> {
    pub scored: &'a ScoredCandidate,
    pub dataset_a: &'a Dataset,
    pub dataset_b: &'a Dataset,
}

impl<'a> ValidationRequest<'a> {
    /// Sample values of the candidate columns, per side.
    pub fn samples(&self) -> (Vec<(&'a str, &'a [String])>, Vec<(&'a str, &'a [String])>) {
        (
            column_samples(self.dataset_a, &self.scored.candidate.columns_a),
            column_samples(self.dataset_b, &self.scored.candidate.columns_b),
        )
    }
}

fn column_samples<'a>(dataset: &'a Dataset, columns: &[String]) -> Vec<(&'a str, &'a [String])> {
    columns
        .iter()
        .filter_map(|c| dataset.column(c))
        .map(|stat| (stat.name.as_str(), stat.sample_values.as_slice()))
        .collect()
}

/// External semantic judge. `Ok(false)` is a definite rejection; any error is
/// retried.
#[async_trait]
pub trait ValidatorBackend: Send + Sync {
    async fn validate(&self, request: &ValidationRequest<'_>) -> Result<bool>;
}

/// Final state of one candidate's validation plus its working state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub state: ValidationState,
    /// Failed attempts
    pub iteration: usize,
    pub error_msg: Vec<String>,
    pub trace: Vec<ValidationState>,
}

impl ValidationOutcome {
    fn new() -> Self {
        Self {
            state: ValidationState::Pending,
            iteration: 0,
            error_msg: Vec::new(),
            trace: vec![ValidationState::Pending],
        }
    }

    fn transition(&mut self, next: ValidationState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal validation transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
        self.trace.push(next);
    }

    fn record_error(&mut self, message: String) {
        self.transition(ValidationState::Error);
        self.iteration += 1;
        self.error_msg.push(message);
    }

    /// The link survives validation (possibly flagged).
    pub fn keeps_link(&self) -> bool {
        matches!(
            self.state,
            ValidationState::Accepted | ValidationState::RejectedWithWarning
        )
    }

    pub fn low_confidence(&self) -> bool {
        self.state == ValidationState::RejectedWithWarning
    }
}

pub struct LinkValidator {
    backend: Option<Arc<dyn ValidatorBackend>>,
    max_retries: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

impl LinkValidator {
    pub fn new(
        backend: Option<Arc<dyn ValidatorBackend>>,
        max_retries: usize,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            max_retries,
            timeout,
            retry,
        }
    }

    /// Validator with no judge: everything that cleared scoring is accepted.
    pub fn heuristic_only() -> Self {
        Self::new(None, 0, Duration::ZERO, RetryPolicy::immediate())
    }

    pub async fn run(&self, request: &ValidationRequest<'_>) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::new();
        let backend = match &self.backend {
            Some(backend) => backend,
            None => {
                outcome.transition(ValidationState::Accepted);
                return outcome;
            }
        };

        loop {
            outcome.transition(ValidationState::Validating);
            let retryable = match tokio::time::timeout(self.timeout, backend.validate(request)).await {
                Ok(Ok(true)) => {
                    outcome.transition(ValidationState::Accepted);
                    break;
                }
                Ok(Ok(false)) => {
                    outcome.transition(ValidationState::Rejected);
                    break;
                }
                Ok(Err(e)) => {
                    outcome.record_error(e.to_string());
                    e.is_recoverable()
                }
                Err(_) => {
                    outcome.record_error(format!("validation timed out after {:?}", self.timeout));
                    true
                }
            };

            if !retryable || outcome.iteration > self.max_retries {
                warn!(
                    "Validation of {}.{:?} <-> {}.{:?} failed {} time(s), keeping link with low confidence: {:?}",
                    request.scored.candidate.dataset_a,
                    request.scored.candidate.columns_a,
                    request.scored.candidate.dataset_b,
                    request.scored.candidate.columns_b,
                    outcome.iteration,
                    outcome.error_msg
                );
                outcome.transition(ValidationState::RejectedWithWarning);
                break;
            }
            tokio::time::sleep(self.retry.delay_for_attempt(outcome.iteration - 1)).await;
        }

        debug!(trace = ?outcome.trace, "Validation finished");
        outcome
    }
}
