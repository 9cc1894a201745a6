//! Policy Builder
//!
//! ```text
//! label ─▶ policy key ─▶ kfrags(m, n) ─▶ TreasureMap ─▶ sign ─▶ publish
//!                          │  one per cohort node        │
//!                          └── sealed to node key ───────┘
//! ```
//!
//! Every step up to publication is a pure transformation; only
//! [`BlockchainPolicy::enact`] touches the ledger.

use cbd_pre::{PublicKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::boundary::PolicyLedger;
use crate::characters::alice::Alice;
use crate::characters::bob::RemoteBob;
use crate::error::{CbdError, Result};
use crate::policy::cohort::Cohort;
use crate::policy::hrac::Hrac;
use crate::policy::treasure_map::{PrePublishedTreasureMap, PublishedTreasureMap, TreasureMap};

/// A policy recorded on the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnactedPolicy {
    pub label: String,
    pub hrac: Hrac,
    pub threshold: usize,
    pub shares: usize,
    pub policy_encrypting_key: PublicKey,
    pub publisher_verifying_key: VerifyingKey,
    pub treasure_map: PublishedTreasureMap,
}

/// Policy draft: publisher, recipient, label and cohort
pub struct BlockchainPolicy<'a> {
    publisher: &'a Alice,
    bob: RemoteBob,
    label: String,
    cohort: Cohort,
}

impl<'a> BlockchainPolicy<'a> {
    pub fn new(
        publisher: &'a Alice,
        bob: RemoteBob,
        label: impl Into<String>,
        cohort: Cohort,
    ) -> Self {
        Self {
            publisher,
            bob,
            label: label.into(),
            cohort,
        }
    }

    pub fn hrac(&self) -> Hrac {
        Hrac::new(
            &self.publisher.verifying_key(),
            &self.bob.verifying_key,
            &self.label,
        )
    }

    /// Generate key fragments, assign them and sign the treasure map
    pub fn build(&self) -> Result<PrePublishedTreasureMap> {
        let threshold = self.cohort.threshold();
        let shares = self.cohort.shares();
        if threshold == 0 || threshold > shares {
            return Err(CbdError::InvalidPolicyConfiguration(format!(
                "cohort of {} cannot satisfy threshold {}",
                shares, threshold
            )));
        }

        let (kfrags, policy_key) =
            self.publisher.generate_kfrags(&self.bob, &self.label, threshold, shares)?;

        let assignments = self.cohort.nodes().iter().cloned().zip(kfrags).collect();
        let map = TreasureMap::construct_by_publisher(
            self.publisher.signer(),
            self.hrac(),
            policy_key,
            assignments,
            threshold,
        )?;

        PrePublishedTreasureMap::new(self.publisher.signer(), &map, &self.bob.encrypting_key)
    }

    /// Build and record the policy on the ledger
    pub async fn enact(self, ledger: &dyn PolicyLedger) -> Result<EnactedPolicy> {
        let pre_published = self.build()?;
        let metadata = pre_published.metadata()?;

        let receipt = ledger
            .publish(&metadata)
            .await
            .map_err(|e| CbdError::PolicyPublicationFailed(e.to_string()))?;

        info!(
            "Policy {} published in {} ({}-of-{})",
            metadata.hrac,
            receipt.tx_hash,
            self.cohort.threshold(),
            self.cohort.shares()
        );

        Ok(EnactedPolicy {
            hrac: metadata.hrac,
            threshold: self.cohort.threshold(),
            shares: self.cohort.shares(),
            policy_encrypting_key: self.publisher.policy_encrypting_key(&self.label),
            publisher_verifying_key: self.publisher.verifying_key(),
            treasure_map: pre_published.publish(receipt),
            label: self.label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::characters::bob::Bob;
    use crate::keyring::Keyring;
    use crate::local::{InMemoryLedger, LocalNetwork};

    const ALICE_SEED: [u8; 32] = *b"fake-keyring-seed-32-bytes-alice";
    const BOB_SEED: [u8; 32] = *b"fake-keyring-seed-32-bytes-bob-x";

    fn actors() -> (Alice, Bob) {
        (
            Alice::from_keyring(Keyring::from_seed(ALICE_SEED).unwrap()),
            Bob::from_keyring(Keyring::from_seed(BOB_SEED).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_enact_publishes_metadata() {
        let (alice, bob) = actors();
        let network = LocalNetwork::new(5);
        let cohort = Cohort::from_nodes(network.node_infos(), 3).unwrap();
        let ledger = InMemoryLedger::default();

        let policy = BlockchainPolicy::new(&alice, bob.to_remote(), "test", cohort);
        let hrac = policy.hrac();
        let enacted = policy.enact(&ledger).await.unwrap();

        assert_eq!(enacted.hrac, hrac);
        assert_eq!(enacted.treasure_map.destinations().len(), 5);
        assert_eq!(enacted.policy_encrypting_key, alice.policy_encrypting_key("test"));

        let published = ledger.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].hrac, hrac);
        assert_eq!(published[0].threshold, 3);
    }

    #[tokio::test]
    async fn test_publication_failure_surfaces() {
        let (alice, bob) = actors();
        let network = LocalNetwork::new(3);
        let cohort = Cohort::from_nodes(network.node_infos(), 2).unwrap();
        let ledger = InMemoryLedger::failing();

        let err = BlockchainPolicy::new(&alice, bob.to_remote(), "test", cohort)
            .enact(&ledger)
            .await
            .unwrap_err();
        assert!(matches!(err, CbdError::PolicyPublicationFailed(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_bob_can_read_built_map() {
        let (alice, bob) = actors();
        let network = LocalNetwork::new(4);
        let cohort = Cohort::from_nodes(network.node_infos(), 2).unwrap();

        let policy = BlockchainPolicy::new(&alice, bob.to_remote(), "test", cohort);
        let map = policy
            .build()
            .unwrap()
            .publish(crate::boundary::TransactionReceipt {
                tx_hash: "0x1".into(),
            });
        let resolved = bob.resolve_treasure_map(&map, &alice.verifying_key()).unwrap();
        assert_eq!(resolved.threshold, 2);
        assert_eq!(resolved.destinations.len(), 4);
    }
}
