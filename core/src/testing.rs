//! Shared fixtures for unit tests

use std::sync::Arc;

use cbd_conditions::{ConditionContext, ConditionSet, Param};

use crate::characters::{Alice, Bob};
use crate::keyring::Keyring;
use crate::kits::MessageKit;
use crate::local::{InMemoryLedger, LocalNetwork, StaticOracle};
use crate::policy::{Cohort, EnactedPolicy, TreasureMap};
use crate::retrieval::{Dispatcher, DispatcherConfig};

pub(crate) const NFT: &str = "0x1e988ba4692e52bc50b375bcc8585b95c48aad77";
pub(crate) const USER: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const LABEL: &str = "fixture";

/// A granted policy over an in-process network whose oracle says
/// [`USER`] owns every [`NFT`] token
pub(crate) struct Scenario {
    pub alice: Alice,
    pub bob: Bob,
    pub network: Arc<LocalNetwork>,
    pub policy: EnactedPolicy,
    pub treasure_map: TreasureMap,
    conditions: Option<ConditionSet>,
}

impl Scenario {
    pub async fn new(threshold: usize, shares: usize) -> Self {
        Self::build(threshold, shares, None).await
    }

    pub async fn with_conditions(
        threshold: usize,
        shares: usize,
        conditions: ConditionSet,
    ) -> Self {
        Self::build(threshold, shares, Some(conditions)).await
    }

    async fn build(threshold: usize, shares: usize, conditions: Option<ConditionSet>) -> Self {
        let oracle = Arc::new(StaticOracle::new());
        oracle.set(NFT, "ownerOf", Param::from(USER));
        oracle.set(NFT, "balanceOf", Param::from(1u64));
        let network = Arc::new(LocalNetwork::with_oracle(shares, oracle));

        let alice = Alice::from_keyring(Keyring::from_seed([7u8; 32]).unwrap());
        let bob = Bob::from_keyring(Keyring::from_seed([8u8; 32]).unwrap());
        let cohort = Cohort::from_nodes(network.node_infos(), threshold).unwrap();

        let policy = alice
            .grant(bob.to_remote(), LABEL, cohort, &InMemoryLedger::default())
            .await
            .unwrap();
        let treasure_map = bob
            .resolve_treasure_map(&policy.treasure_map, &alice.verifying_key())
            .unwrap();

        Self {
            alice,
            bob,
            network,
            policy,
            treasure_map,
            conditions,
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> MessageKit {
        MessageKit::new(
            &self.policy.policy_encrypting_key,
            plaintext,
            self.conditions.clone(),
        )
        .unwrap()
    }

    pub fn dispatcher(&self, config: DispatcherConfig) -> Dispatcher {
        Dispatcher::new(self.network.clone(), config)
    }

    pub fn context(&self) -> ConditionContext {
        ConditionContext::for_user(USER)
    }
}
