//! Condition sets and the combination rule
//!
//! Members are evaluated concurrently on every call. Nothing is cached:
//! the chain state a grant was issued under can change before it is used.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::condition::Condition;
use crate::context::{ConditionContext, ConditionOracle};
use crate::error::ConditionError;

/// How member results combine into one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CombinationRule {
    /// Every member must pass
    #[default]
    All,
    /// At least `m` members must pass
    Threshold(usize),
}

/// Ordered conditions plus a combination rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
    #[serde(default)]
    rule: CombinationRule,
}

impl ConditionSet {
    /// All-must-pass set
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            rule: CombinationRule::All,
        }
    }

    /// m-of-n set
    pub fn with_threshold(conditions: Vec<Condition>, m: usize) -> Result<Self, ConditionError> {
        let set = Self {
            conditions,
            rule: CombinationRule::Threshold(m),
        };
        set.validate()?;
        Ok(set)
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn rule(&self) -> CombinationRule {
        self.rule
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Check every member and the rule without touching the network
    pub fn validate(&self) -> Result<(), ConditionError> {
        if let CombinationRule::Threshold(m) = self.rule {
            if m == 0 || m > self.conditions.len() {
                return Err(ConditionError::Invalid(format!(
                    "threshold {} out of range for {} conditions",
                    m,
                    self.conditions.len()
                )));
            }
        }
        self.conditions.iter().try_for_each(Condition::validate)
    }

    /// Canonical JSON form
    pub fn to_json(&self) -> Result<String, ConditionError> {
        serde_json::to_string(self).map_err(|e| ConditionError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ConditionError> {
        let set: Self =
            serde_json::from_str(json).map_err(|e| ConditionError::Serialization(e.to_string()))?;
        set.validate()?;
        Ok(set)
    }

    /// Evaluate all members concurrently and apply the rule.
    ///
    /// A definite answer wins over an evaluation error: an ALL set with one
    /// failing member is false even if another member's oracle was down.
    pub async fn evaluate(
        &self,
        context: &ConditionContext,
        oracle: &dyn ConditionOracle,
    ) -> Result<bool, ConditionError> {
        let results = join_all(
            self.conditions
                .iter()
                .map(|condition| condition.evaluate(context, oracle)),
        )
        .await;

        let satisfied = results.iter().filter(|r| matches!(r, Ok(true))).count();
        let unsatisfied = results.iter().filter(|r| matches!(r, Ok(false))).count();
        let first_error = results.into_iter().find_map(Result::err);

        let outcome = match self.rule {
            CombinationRule::All => {
                if unsatisfied > 0 {
                    Ok(false)
                } else if let Some(err) = first_error {
                    Err(err)
                } else {
                    Ok(true)
                }
            }
            CombinationRule::Threshold(m) => {
                let errored = self.conditions.len() - satisfied - unsatisfied;
                if satisfied >= m {
                    Ok(true)
                } else if satisfied + errored < m {
                    Ok(false)
                } else {
                    Err(first_error.unwrap_or_else(|| {
                        ConditionError::Evaluation("incomplete evaluation".into())
                    }))
                }
            }
        };

        debug!(
            "Condition set ({} members, {:?}): {} passed, {} failed -> {:?}",
            self.conditions.len(),
            self.rule,
            satisfied,
            unsatisfied,
            outcome
        );
        outcome
    }

    /// Like [`evaluate`](Self::evaluate) but maps `false` to `NotSatisfied`
    pub async fn check(
        &self,
        context: &ConditionContext,
        oracle: &dyn ConditionOracle,
    ) -> Result<(), ConditionError> {
        if self.evaluate(context, oracle).await? {
            Ok(())
        } else {
            Err(ConditionError::NotSatisfied)
        }
    }
}

impl From<Condition> for ConditionSet {
    fn from(condition: Condition) -> Self {
        Self::new(vec![condition])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContractQuery;
    use crate::error::OracleError;
    use crate::value::{Comparator, Param, ReturnValueTest};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NFT: &str = "0x1e988ba4692e52bc50b375bcc8585b95c48aad77";
    const TOKEN: &str = "0x5cf1703a1c99a4b42eb056535840e93118177232";
    const USER: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    /// Answers by contract address; unknown contracts are unavailable
    #[derive(Default)]
    struct MapOracle {
        answers: HashMap<String, Param>,
        calls: AtomicUsize,
    }

    impl MapOracle {
        fn answer(mut self, contract: &str, value: impl Into<Param>) -> Self {
            self.answers.insert(contract.to_string(), value.into());
            self
        }
    }

    #[async_trait]
    impl ConditionOracle for MapOracle {
        async fn call(&self, query: &ContractQuery) -> Result<Param, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers
                .get(&query.contract_address)
                .cloned()
                .ok_or_else(|| OracleError::Unavailable(query.contract_address.clone()))
        }
    }

    fn owns_nft() -> Condition {
        Condition::erc721_ownership(NFT, 5, 5954)
    }

    fn holds_tokens() -> Condition {
        Condition::erc20_balance(TOKEN, 5, ReturnValueTest::new(Comparator::Ge, 100u64))
    }

    #[test]
    fn test_json_roundtrip() {
        let set = ConditionSet::with_threshold(vec![owns_nft(), holds_tokens()], 1).unwrap();
        let json = set.to_json().unwrap();
        let decoded = ConditionSet::from_json(&json).unwrap();
        assert_eq!(decoded, set);
        assert_eq!(decoded.conditions()[0].parameters(), vec![Param::from(5954u64)]);
    }

    #[test]
    fn test_rule_defaults_to_all() {
        let json = format!(r#"{{"conditions":[{}]}}"#, serde_json::to_string(&owns_nft()).unwrap());
        let set = ConditionSet::from_json(&json).unwrap();
        assert_eq!(set.rule(), CombinationRule::All);
    }

    #[test]
    fn test_threshold_out_of_range() {
        assert!(ConditionSet::with_threshold(vec![owns_nft()], 0).is_err());
        assert!(ConditionSet::with_threshold(vec![owns_nft()], 2).is_err());
    }

    #[tokio::test]
    async fn test_all_rule() {
        let ctx = ConditionContext::for_user(USER);
        let set = ConditionSet::new(vec![owns_nft(), holds_tokens()]);

        let pass = MapOracle::default().answer(NFT, USER).answer(TOKEN, 150u64);
        assert!(set.evaluate(&ctx, &pass).await.unwrap());

        let poor = MapOracle::default().answer(NFT, USER).answer(TOKEN, 10u64);
        assert!(!set.evaluate(&ctx, &poor).await.unwrap());
        assert_eq!(
            set.check(&ctx, &poor).await,
            Err(ConditionError::NotSatisfied)
        );
    }

    #[tokio::test]
    async fn test_all_rule_outage_is_retryable() {
        let ctx = ConditionContext::for_user(USER);
        let set = ConditionSet::new(vec![owns_nft(), holds_tokens()]);

        let partial = MapOracle::default().answer(NFT, USER);
        let err = set.evaluate(&ctx, &partial).await.unwrap_err();
        assert!(err.is_retryable());

        // A definite failure outranks the outage
        let denied = MapOracle::default().answer(NFT, "0xother");
        assert!(!set.evaluate(&ctx, &denied).await.unwrap());
    }

    #[tokio::test]
    async fn test_threshold_rule() {
        let ctx = ConditionContext::for_user(USER);
        let set = ConditionSet::with_threshold(vec![owns_nft(), holds_tokens()], 1).unwrap();

        let only_tokens = MapOracle::default().answer(NFT, "0xother").answer(TOKEN, 500u64);
        assert!(set.evaluate(&ctx, &only_tokens).await.unwrap());

        let neither = MapOracle::default().answer(NFT, "0xother").answer(TOKEN, 1u64);
        assert!(!set.evaluate(&ctx, &neither).await.unwrap());

        let unknown = MapOracle::default().answer(NFT, "0xother");
        assert!(set.evaluate(&ctx, &unknown).await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_no_caching_between_calls() {
        let ctx = ConditionContext::for_user(USER);
        let set = ConditionSet::from(owns_nft());
        let oracle = MapOracle::default().answer(NFT, USER);

        set.evaluate(&ctx, &oracle).await.unwrap();
        set.evaluate(&ctx, &oracle).await.unwrap();
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wei_scale_balance() {
        let hundred_tokens = 100_000_000_000_000_000_000u128;
        let rich = Condition::erc20_balance(
            TOKEN,
            1,
            ReturnValueTest::new(Comparator::Ge, hundred_tokens),
        );
        let set = ConditionSet::from(rich);

        let json = set.to_json().unwrap();
        assert!(json.contains(r#""100000000000000000000""#));
        assert_eq!(ConditionSet::from_json(&json).unwrap(), set);

        let ctx = ConditionContext::for_user(USER);
        let whale = MapOracle::default().answer(TOKEN, 150_000_000_000_000_000_000u128);
        assert!(set.evaluate(&ctx, &whale).await.unwrap());

        let minnow = MapOracle::default().answer(TOKEN, 50_000_000_000_000_000_000u128);
        assert!(!set.evaluate(&ctx, &minnow).await.unwrap());
    }
}
