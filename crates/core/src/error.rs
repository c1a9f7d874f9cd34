//! Centralized error types for the interlock workspace.
//!
//! Denials (a lock held by a stronger holder, a release by a non-owner) are
//! not errors; they come back as structured outcomes. Only the cases below
//! surface as `Err`.

use thiserror::Error;

/// Top-level error enum. Variants map to the failure classes of the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InterlockError {
    /// Malformed trigger, rule or request. Rejected before any lock mutation.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Rule store unavailable: {0}")]
    RuleStoreUnavailable(String),

    #[error("Area topology unavailable: {0}")]
    TopologyUnavailable(String),

    /// Audit write failed. Never rolls back a lock decision.
    #[error("Audit sink error: {0}")]
    Audit(String),

    /// Registry state broke one of its own invariants. Always a bug.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl InterlockError {
    /// Collaborator outages are transient; the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        self.is_collaborator_failure()
    }

    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            InterlockError::RuleStoreUnavailable(_) | InterlockError::TopologyUnavailable(_)
        )
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, InterlockError::InvariantViolation(_))
    }
}

pub type InterlockResult<T> = Result<T, InterlockError>;
