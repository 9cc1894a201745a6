//! Protocol errors
//!
//! Every terminal failure carries an [`ErrorKind`] so callers can tell a
//! misconfiguration from an outage, a trust violation, an access denial or
//! a missed quorum without string matching.

use std::collections::BTreeMap;
use std::fmt;

use cbd_conditions::ConditionError;
use cbd_pre::PreError;
use thiserror::Error;

use crate::node::NodeAddress;
use crate::retrieval::work_order::DenialReason;

/// Failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Verification,
    Condition,
    Quorum,
    Decryption,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Transport => "transport",
            ErrorKind::Verification => "verification",
            ErrorKind::Condition => "condition",
            ErrorKind::Quorum => "quorum",
            ErrorKind::Decryption => "decryption",
        };
        f.write_str(name)
    }
}

/// Why a single node did not contribute a fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeFailure {
    /// The node refused for good: conditions not met, unauthorized or
    /// malformed request
    Denied(DenialReason),
    /// The node could not evaluate the conditions right now
    ConditionUnavailable(String),
    Unreachable(String),
    TimedOut,
    /// The node's signature over the fragment did not check out
    InvalidSignature,
    /// Signed by the node, but not a correct reencryption of the capsule
    InvalidFragment(String),
    /// Still outstanding when the aggregate deadline hit
    DeadlineExceeded,
}

impl NodeFailure {
    /// Whether asking the same node again later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NodeFailure::ConditionUnavailable(_)
                | NodeFailure::Denied(DenialReason::ConditionUnavailable(_))
                | NodeFailure::Unreachable(_)
                | NodeFailure::TimedOut
                | NodeFailure::DeadlineExceeded
        )
    }
}

impl From<DenialReason> for NodeFailure {
    fn from(reason: DenialReason) -> Self {
        match reason {
            DenialReason::ConditionUnavailable(msg) => NodeFailure::ConditionUnavailable(msg),
            terminal => NodeFailure::Denied(terminal),
        }
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeFailure::Denied(reason) => write!(f, "denied ({})", reason),
            NodeFailure::ConditionUnavailable(reason) => {
                write!(f, "condition unavailable ({})", reason)
            }
            NodeFailure::Unreachable(reason) => write!(f, "unreachable ({})", reason),
            NodeFailure::TimedOut => f.write_str("timed out"),
            NodeFailure::InvalidSignature => f.write_str("invalid signature"),
            NodeFailure::InvalidFragment(reason) => write!(f, "invalid fragment ({})", reason),
            NodeFailure::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Per-node outcome of a retrieval that missed its quorum
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuorumBreakdown {
    pub failures: BTreeMap<NodeAddress, NodeFailure>,
}

impl QuorumBreakdown {
    pub fn record(&mut self, node: NodeAddress, failure: NodeFailure) {
        self.failures.insert(node, failure);
    }

    /// Terminal refusals
    pub fn denied(&self) -> usize {
        self.count(|f| match f {
            NodeFailure::Denied(reason) => {
                !matches!(reason, DenialReason::ConditionUnavailable(_))
            }
            _ => false,
        })
    }

    pub fn condition_unavailable(&self) -> usize {
        self.count(|f| {
            matches!(
                f,
                NodeFailure::ConditionUnavailable(_)
                    | NodeFailure::Denied(DenialReason::ConditionUnavailable(_))
            )
        })
    }

    pub fn unreachable(&self) -> usize {
        self.count(|f| matches!(f, NodeFailure::Unreachable(_)))
    }

    pub fn timed_out(&self) -> usize {
        self.count(|f| matches!(f, NodeFailure::TimedOut | NodeFailure::DeadlineExceeded))
    }

    pub fn invalid_signatures(&self) -> usize {
        self.count(|f| matches!(f, NodeFailure::InvalidSignature))
    }

    pub fn invalid_fragments(&self) -> usize {
        self.count(|f| matches!(f, NodeFailure::InvalidFragment(_)))
    }

    /// Nodes that might still answer on a later attempt
    pub fn transient(&self) -> usize {
        self.count(NodeFailure::is_transient)
    }

    /// False when every failure is a terminal denial or a bad fragment
    pub fn is_retryable(&self) -> bool {
        self.transient() > 0
    }

    fn count(&self, predicate: impl Fn(&NodeFailure) -> bool) -> usize {
        self.failures.values().filter(|f| predicate(f)).count()
    }
}

impl fmt::Display for QuorumBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} denied, {} condition unavailable, {} unreachable, {} timed out, \
             {} bad signatures, {} bad fragments",
            self.denied(),
            self.condition_unavailable(),
            self.unreachable(),
            self.timed_out(),
            self.invalid_signatures(),
            self.invalid_fragments()
        )
    }
}

/// Protocol-level errors
#[derive(Debug, Error)]
pub enum CbdError {
    // Configuration
    #[error("invalid policy configuration: {0}")]
    InvalidPolicyConfiguration(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    // Transport
    #[error("node discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    #[error("policy publication failed: {0}")]
    PolicyPublicationFailed(String),

    #[error("transport error: {0}")]
    Transport(String),

    // Verification
    #[error("treasure map signature invalid")]
    TreasureMapSignatureInvalid,

    #[error("treasure map rejected: {0}")]
    TreasureMapInvalid(String),

    #[error("malformed protocol data: {0}")]
    Malformed(String),

    // Condition
    #[error("access conditions not satisfied")]
    ConditionNotSatisfied,

    #[error("condition evaluation failed: {0}")]
    ConditionEvaluationError(String),

    // Quorum
    #[error("insufficient fragments: {received} of {threshold} ({breakdown})")]
    InsufficientFragments {
        threshold: usize,
        received: usize,
        breakdown: QuorumBreakdown,
    },

    #[error("not enough fragments to decrypt: {received} of {threshold}")]
    NotEnoughFragments { threshold: usize, received: usize },

    // Decryption
    #[error("decryption failed: {0}")]
    Decryption(#[from] PreError),
}

impl CbdError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CbdError::InvalidPolicyConfiguration(_) | CbdError::InvalidCondition(_) => {
                ErrorKind::Configuration
            }
            CbdError::DiscoveryUnavailable(_)
            | CbdError::PolicyPublicationFailed(_)
            | CbdError::Transport(_) => ErrorKind::Transport,
            CbdError::TreasureMapSignatureInvalid
            | CbdError::TreasureMapInvalid(_)
            | CbdError::Malformed(_) => ErrorKind::Verification,
            CbdError::ConditionNotSatisfied | CbdError::ConditionEvaluationError(_) => {
                ErrorKind::Condition
            }
            CbdError::InsufficientFragments { .. } | CbdError::NotEnoughFragments { .. } => {
                ErrorKind::Quorum
            }
            CbdError::Decryption(_) => ErrorKind::Decryption,
        }
    }

    /// Whether the caller may retry the same call later.
    ///
    /// Publication is left to the caller, who must submit a fresh
    /// transaction, so it is not retryable at this layer. A missed quorum is
    /// retryable only while the transient failures could still close the
    /// gap to the threshold.
    pub fn is_retryable(&self) -> bool {
        match self {
            CbdError::DiscoveryUnavailable(_)
            | CbdError::Transport(_)
            | CbdError::ConditionEvaluationError(_) => true,
            CbdError::InsufficientFragments {
                threshold,
                received,
                breakdown,
            } => breakdown.is_retryable() && received + breakdown.transient() >= *threshold,
            _ => false,
        }
    }
}

impl From<ConditionError> for CbdError {
    fn from(err: ConditionError) -> Self {
        match err {
            ConditionError::NotSatisfied => CbdError::ConditionNotSatisfied,
            ConditionError::Evaluation(msg) => CbdError::ConditionEvaluationError(msg),
            ConditionError::Invalid(msg) | ConditionError::Serialization(msg) => {
                CbdError::InvalidCondition(msg)
            }
            ConditionError::MissingContextVariable(name) => {
                CbdError::InvalidCondition(format!("context variable {} was not supplied", name))
            }
        }
    }
}

impl From<bincode::Error> for CbdError {
    fn from(err: bincode::Error) -> Self {
        CbdError::Malformed(err.to_string())
    }
}

pub type Result<T, E = CbdError> = std::result::Result<T, E>;
