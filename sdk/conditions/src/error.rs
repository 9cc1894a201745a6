use thiserror::Error;

/// Condition definition and evaluation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// Malformed definition, caught before any network activity
    #[error("invalid condition: {0}")]
    Invalid(String),

    #[error("context variable {0} was not supplied")]
    MissingContextVariable(String),

    /// The oracle could not answer; retrying later may succeed
    #[error("condition evaluation failed: {0}")]
    Evaluation(String),

    /// The oracle answered and the predicate is false
    #[error("condition not satisfied")]
    NotSatisfied,

    #[error("condition serialization failed: {0}")]
    Serialization(String),
}

impl ConditionError {
    /// Only evaluation failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Evaluation(_))
    }
}

/// Failures reported by a condition oracle
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("oracle query timed out")]
    Timeout,

    #[error("malformed oracle response: {0}")]
    Malformed(String),
}

impl From<OracleError> for ConditionError {
    fn from(err: OracleError) -> Self {
        ConditionError::Evaluation(err.to_string())
    }
}
