//! Access Conditions
//!
//! A closed set of condition kinds, each with its own typed record. All
//! kinds share one wire shape so every endpoint agrees on the encoding:
//!
//! ```text
//! {
//!   "contractAddress": "0x…",
//!   "chain": 5,
//!   "standardContractType": "ERC721",   (optional)
//!   "method": "ownerOf",
//!   "parameters": [5954],
//!   "returnValueTest": { "comparator": "==", "value": ":userAddress" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::{ConditionContext, ConditionOracle, ContractQuery};
use crate::error::ConditionError;
use crate::value::{Comparator, Param, ReturnValueTest, USER_ADDRESS};

const ERC721: &str = "ERC721";
const ERC20: &str = "ERC20";
const OWNER_OF: &str = "ownerOf";
const BALANCE_OF: &str = "balanceOf";

/// The shared wire shape of every condition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionRecord {
    pub contract_address: String,
    pub chain: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_contract_type: Option<String>,
    pub method: String,
    pub parameters: Vec<Param>,
    pub return_value_test: ReturnValueTest,
}

/// Caller owns a specific ERC721 token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc721Ownership {
    pub contract_address: String,
    pub chain: u64,
    pub token_id: u64,
}

/// Caller's token balance passes a comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub contract_address: String,
    pub chain: u64,
    pub return_value_test: ReturnValueTest,
}

/// Any read-only contract call with a return-value test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub contract_address: String,
    pub chain: u64,
    pub standard_contract_type: Option<String>,
    pub method: String,
    pub parameters: Vec<Param>,
    pub return_value_test: ReturnValueTest,
}

/// A single access predicate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "ConditionRecord", try_from = "ConditionRecord")]
pub enum Condition {
    Erc721Ownership(Erc721Ownership),
    Erc721Balance(TokenBalance),
    Erc20Balance(TokenBalance),
    ContractCall(ContractCall),
}

impl Condition {
    pub fn erc721_ownership(
        contract_address: impl Into<String>,
        chain: u64,
        token_id: u64,
    ) -> Self {
        Condition::Erc721Ownership(Erc721Ownership {
            contract_address: contract_address.into(),
            chain,
            token_id,
        })
    }

    pub fn erc721_balance(
        contract_address: impl Into<String>,
        chain: u64,
        return_value_test: ReturnValueTest,
    ) -> Self {
        Condition::Erc721Balance(TokenBalance {
            contract_address: contract_address.into(),
            chain,
            return_value_test,
        })
    }

    pub fn erc20_balance(
        contract_address: impl Into<String>,
        chain: u64,
        return_value_test: ReturnValueTest,
    ) -> Self {
        Condition::Erc20Balance(TokenBalance {
            contract_address: contract_address.into(),
            chain,
            return_value_test,
        })
    }

    pub fn contract_call(call: ContractCall) -> Self {
        Condition::ContractCall(call)
    }

    /// Wire form of this condition
    pub fn to_record(&self) -> ConditionRecord {
        match self {
            Condition::Erc721Ownership(c) => ConditionRecord {
                contract_address: c.contract_address.clone(),
                chain: c.chain,
                standard_contract_type: Some(ERC721.into()),
                method: OWNER_OF.into(),
                parameters: vec![Param::from(c.token_id)],
                return_value_test: ReturnValueTest::new(Comparator::Eq, USER_ADDRESS),
            },
            Condition::Erc721Balance(c) => balance_record(c, ERC721),
            Condition::Erc20Balance(c) => balance_record(c, ERC20),
            Condition::ContractCall(c) => ConditionRecord {
                contract_address: c.contract_address.clone(),
                chain: c.chain,
                standard_contract_type: c.standard_contract_type.clone(),
                method: c.method.clone(),
                parameters: c.parameters.clone(),
                return_value_test: c.return_value_test.clone(),
            },
        }
    }

    pub fn contract_address(&self) -> String {
        self.to_record().contract_address
    }

    pub fn chain(&self) -> u64 {
        self.to_record().chain
    }

    pub fn parameters(&self) -> Vec<Param> {
        self.to_record().parameters
    }

    /// Structural checks that need no network access
    pub fn validate(&self) -> Result<(), ConditionError> {
        let record = self.to_record();
        validate_address(&record.contract_address)?;
        if record.chain == 0 {
            return Err(ConditionError::Invalid("chain id must be non-zero".into()));
        }
        if record.method.is_empty()
            || !record
                .method
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConditionError::Invalid(format!(
                "invalid method name {:?}",
                record.method
            )));
        }
        record.return_value_test.validate()
    }

    /// Evaluate against current external state. Results are never cached.
    pub async fn evaluate(
        &self,
        context: &ConditionContext,
        oracle: &dyn ConditionOracle,
    ) -> Result<bool, ConditionError> {
        let record = self.to_record();
        let parameters = record
            .parameters
            .iter()
            .map(|p| context.resolve(p))
            .collect::<Result<Vec<_>, _>>()?;
        let expected = context.resolve(&record.return_value_test.value)?;

        let query = ContractQuery {
            chain: record.chain,
            contract_address: record.contract_address,
            standard_contract_type: record.standard_contract_type,
            method: record.method,
            parameters,
        };
        let actual = oracle.call(&query).await?;
        let satisfied = record
            .return_value_test
            .comparator
            .compare(&actual, &expected)?;

        debug!(
            "Condition {}.{} on chain {}: {}",
            query.contract_address, query.method, query.chain, satisfied
        );
        Ok(satisfied)
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.to_record() == other.to_record()
    }
}

impl Eq for Condition {}

impl From<Condition> for ConditionRecord {
    fn from(condition: Condition) -> Self {
        condition.to_record()
    }
}

impl TryFrom<ConditionRecord> for Condition {
    type Error = ConditionError;

    fn try_from(record: ConditionRecord) -> Result<Self, Self::Error> {
        let standard = record.standard_contract_type.clone();
        let user_only = record.parameters == [Param::from(USER_ADDRESS)];
        let owner_test =
            record.return_value_test == ReturnValueTest::new(Comparator::Eq, USER_ADDRESS);
        let token_id = match record.parameters.as_slice() {
            [Param::Int(id)] => u64::try_from(id).ok(),
            _ => None,
        };

        let condition = match (standard.as_deref(), record.method.as_str(), token_id) {
            (Some(ERC721), OWNER_OF, Some(token_id)) if owner_test => {
                Condition::erc721_ownership(record.contract_address, record.chain, token_id)
            }
            (Some(ERC721), BALANCE_OF, _) if user_only => Condition::erc721_balance(
                record.contract_address,
                record.chain,
                record.return_value_test,
            ),
            (Some(ERC20), BALANCE_OF, _) if user_only => Condition::erc20_balance(
                record.contract_address,
                record.chain,
                record.return_value_test,
            ),
            _ => Condition::ContractCall(ContractCall {
                contract_address: record.contract_address,
                chain: record.chain,
                standard_contract_type: record.standard_contract_type,
                method: record.method,
                parameters: record.parameters,
                return_value_test: record.return_value_test,
            }),
        };
        condition.validate()?;
        Ok(condition)
    }
}

fn balance_record(balance: &TokenBalance, standard: &str) -> ConditionRecord {
    ConditionRecord {
        contract_address: balance.contract_address.clone(),
        chain: balance.chain,
        standard_contract_type: Some(standard.into()),
        method: BALANCE_OF.into(),
        parameters: vec![Param::from(USER_ADDRESS)],
        return_value_test: balance.return_value_test.clone(),
    }
}

fn validate_address(address: &str) -> Result<(), ConditionError> {
    let hex_part = address
        .strip_prefix("0x")
        .ok_or_else(|| ConditionError::Invalid(format!("address {} lacks 0x prefix", address)))?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConditionError::Invalid(format!(
            "address {} is not 20 hex bytes",
            address
        )));
    }
    Ok(())
}
