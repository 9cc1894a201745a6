//! Threshold decryption of retrieved kits

use std::sync::Arc;

use cbd_conditions::{ConditionContext, ConditionOracle};
use tracing::debug;

use crate::characters::bob::Bob;
use crate::error::{CbdError, Result};
use crate::kits::retrieval::PolicyMessageKit;

/// Opens policy message kits once enough fragments are in.
///
/// With an oracle attached, the kit's conditions are re-checked locally
/// before any fragment is combined.
#[derive(Clone, Default)]
pub struct Decryptor {
    oracle: Option<Arc<dyn ConditionOracle>>,
}

impl Decryptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_oracle(oracle: Arc<dyn ConditionOracle>) -> Self {
        Self {
            oracle: Some(oracle),
        }
    }

    pub async fn decrypt(
        &self,
        bob: &Bob,
        kit: &PolicyMessageKit,
        context: &ConditionContext,
    ) -> Result<Vec<u8>> {
        if !kit.is_decryptable_by_receiver() {
            return Err(CbdError::NotEnoughFragments {
                threshold: kit.threshold(),
                received: kit.result().len(),
            });
        }

        if let (Some(conditions), Some(oracle)) = (kit.message_kit().conditions(), &self.oracle) {
            debug!("Re-checking {} condition(s) before decryption", conditions.len());
            conditions.check(context, oracle.as_ref()).await?;
        }

        bob.decrypt(kit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::StaticOracle;
    use crate::retrieval::dispatcher::DispatcherConfig;
    use crate::testing::{NFT, Scenario, USER};
    use cbd_conditions::{Condition, ConditionSet, Param};

    #[tokio::test]
    async fn test_decrypts_after_quorum() {
        let scenario = Scenario::new(2, 3).await;
        let kit = scenario.encrypt(b"payload");
        let pmks = scenario
            .dispatcher(DispatcherConfig::default())
            .retrieve(
                vec![kit],
                &scenario.treasure_map,
                &scenario.network.node_infos(),
                &scenario.bob.to_remote(),
                &scenario.context(),
            )
            .await
            .unwrap();

        let plaintext = Decryptor::new()
            .decrypt(&scenario.bob, &pmks[0], &scenario.context())
            .await
            .unwrap();
        assert_eq!(plaintext, b"payload");
    }

    #[tokio::test]
    async fn test_pending_kit_is_not_decryptable() {
        let scenario = Scenario::new(2, 3).await;
        let pmk = PolicyMessageKit::from_message_kit(
            scenario.encrypt(b"payload"),
            scenario.treasure_map.policy_encrypting_key,
            2,
        );

        let err = Decryptor::new()
            .decrypt(&scenario.bob, &pmk, &scenario.context())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CbdError::NotEnoughFragments {
                threshold: 2,
                received: 0
            }
        ));
    }

    #[tokio::test]
    async fn test_local_recheck_denies_when_condition_fails() {
        let conditions = ConditionSet::from(Condition::erc721_ownership(NFT, 5, 5954));
        let scenario = Scenario::with_conditions(2, 3, conditions).await;
        let pmks = scenario
            .dispatcher(DispatcherConfig::default())
            .retrieve(
                vec![scenario.encrypt(b"payload")],
                &scenario.treasure_map,
                &scenario.network.node_infos(),
                &scenario.bob.to_remote(),
                &scenario.context(),
            )
            .await
            .unwrap();

        let local = Arc::new(StaticOracle::new());
        local.set(NFT, "ownerOf", Param::from("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"));
        let err = Decryptor::with_oracle(local.clone())
            .decrypt(&scenario.bob, &pmks[0], &scenario.context())
            .await
            .unwrap_err();
        assert!(matches!(err, CbdError::ConditionNotSatisfied));

        local.set(NFT, "ownerOf", Param::from(USER));
        let plaintext = Decryptor::with_oracle(local)
            .decrypt(&scenario.bob, &pmks[0], &scenario.context())
            .await
            .unwrap();
        assert_eq!(plaintext, b"payload");
    }
}
