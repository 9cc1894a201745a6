//! CBD Access Conditions
//!
//! Boolean access predicates evaluated against external state, composed into
//! sets with an ALL or m-of-n rule. Chain access is injected through
//! [`ConditionOracle`]; this crate only defines the evaluation contract.
//!
//! ```text
//! ConditionSet ──evaluate(ctx)──▶ Condition_1 ─┐
//!                                 Condition_2 ─┼─▶ ConditionOracle ──▶ Param
//!                                 Condition_n ─┘        │
//!                         combine(rule) ◀── compare ◀───┘
//! ```

pub mod condition;
pub mod context;
pub mod error;
pub mod set;
pub mod value;

pub use condition::{Condition, ConditionRecord, ContractCall, Erc721Ownership, TokenBalance};
pub use context::{ConditionContext, ConditionOracle, ContractQuery};
pub use error::{ConditionError, OracleError};
pub use set::{CombinationRule, ConditionSet};
pub use value::{Comparator, Param, ReturnValueTest, USER_ADDRESS};
