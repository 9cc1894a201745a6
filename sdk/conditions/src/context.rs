//! Evaluation context and the oracle seam
//!
//! Conditions never talk to a chain themselves. They resolve context
//! variables from a [`ConditionContext`] and hand a [`ContractQuery`] to a
//! [`ConditionOracle`], which is injected by the caller.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConditionError, OracleError};
use crate::value::{CONTEXT_VARIABLE_PREFIX, Param, USER_ADDRESS};

/// Caller identity and extra parameters used to fill `:name` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionContext {
    pub user_address: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Param>,
}

impl ConditionContext {
    pub fn for_user(user_address: impl Into<String>) -> Self {
        Self {
            user_address: user_address.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add a custom `:name` parameter
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        let mut name = name.into();
        if !name.starts_with(CONTEXT_VARIABLE_PREFIX) {
            name.insert(0, CONTEXT_VARIABLE_PREFIX);
        }
        self.parameters.insert(name, value.into());
        self
    }

    /// Substitute a placeholder; literal values pass through unchanged
    pub fn resolve(&self, param: &Param) -> Result<Param, ConditionError> {
        match param {
            Param::Text(name) if name.starts_with(CONTEXT_VARIABLE_PREFIX) => {
                if name == USER_ADDRESS {
                    return Ok(Param::Text(self.user_address.clone()));
                }
                self.parameters
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ConditionError::MissingContextVariable(name.clone()))
            }
            other => Ok(other.clone()),
        }
    }
}

/// A fully resolved read-only contract call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractQuery {
    pub chain: u64,
    pub contract_address: String,
    pub standard_contract_type: Option<String>,
    pub method: String,
    pub parameters: Vec<Param>,
}

/// Source of external state for condition evaluation
#[async_trait]
pub trait ConditionOracle: Send + Sync {
    /// Execute `query` and return its single result value
    async fn call(&self, query: &ContractQuery) -> Result<Param, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_address_substitution() {
        let ctx = ConditionContext::for_user("0xabc");
        let resolved = ctx.resolve(&Param::from(USER_ADDRESS)).unwrap();
        assert_eq!(resolved, Param::from("0xabc"));
    }

    #[test]
    fn test_custom_parameter_substitution() {
        let ctx = ConditionContext::for_user("0xabc").with_parameter("minBalance", 10u64);
        assert_eq!(ctx.resolve(&Param::from(":minBalance")).unwrap(), Param::from(10u64));
    }

    #[test]
    fn test_missing_variable() {
        let ctx = ConditionContext::for_user("0xabc");
        assert_eq!(
            ctx.resolve(&Param::from(":nope")),
            Err(ConditionError::MissingContextVariable(":nope".into()))
        );
    }

    #[test]
    fn test_literals_pass_through() {
        let ctx = ConditionContext::default();
        assert_eq!(ctx.resolve(&Param::from(5954u64)).unwrap(), Param::from(5954u64));
        assert_eq!(ctx.resolve(&Param::from("plain")).unwrap(), Param::from("plain"));
    }
}
