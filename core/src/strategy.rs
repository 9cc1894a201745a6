//! Strategy
//!
//! One-call deployment of a policy: a fresh publisher and recipient, a
//! cohort, optional default conditions. Deploying grants the policy,
//! stores its treasure map with the directory and hands back an encrypter
//! and a decrypter bound to it.
//!
//! ```text
//! Strategy::create(cohort, conditions)
//!     │ deploy(label, network)
//!     ▼
//! DeployedStrategy ── encrypter: Enrico ──▶ MessageKit
//!                  └─ decrypter: fetch map ─▶ discover ─▶ dispatch ─▶ decrypt
//! ```

use std::sync::Arc;

use cbd_conditions::{ConditionContext, ConditionOracle, ConditionSet};
use cbd_config::RetrievalConfig;
use cbd_pre::VerifyingKey;
use tracing::info;

use crate::boundary::{BoundaryError, NodeDirectory, NodeQuery, PolicyLedger, ReencryptionClient};
use crate::characters::alice::Alice;
use crate::characters::bob::Bob;
use crate::characters::enrico::Enrico;
use crate::error::{CbdError, Result};
use crate::keyring::Keyring;
use crate::kits::message_kit::MessageKit;
use crate::kits::retrieval::PolicyMessageKit;
use crate::policy::builder::EnactedPolicy;
use crate::policy::cohort::Cohort;
use crate::policy::hrac::Hrac;
use crate::retrieval::decryptor::Decryptor;
use crate::retrieval::dispatcher::{Dispatcher, DispatcherConfig};

/// Boundary handles a deployment talks through
#[derive(Clone)]
pub struct Network {
    pub directory: Arc<dyn NodeDirectory>,
    pub client: Arc<dyn ReencryptionClient>,
    pub ledger: Arc<dyn PolicyLedger>,
    /// Enables a local condition re-check before decryption
    pub oracle: Option<Arc<dyn ConditionOracle>>,
}

pub struct Strategy {
    cohort: Cohort,
    conditions: Option<ConditionSet>,
    publisher: Keyring,
    recipient: Keyring,
}

impl Strategy {
    /// Strategy with freshly generated publisher and recipient keys
    pub fn create(cohort: Cohort, conditions: Option<ConditionSet>) -> Result<Self> {
        if let Some(conditions) = &conditions {
            conditions.validate()?;
        }
        Ok(Self {
            cohort,
            conditions,
            publisher: Keyring::random(),
            recipient: Keyring::random(),
        })
    }

    pub fn with_keyrings(mut self, publisher: Keyring, recipient: Keyring) -> Self {
        self.publisher = publisher;
        self.recipient = recipient;
        self
    }

    pub fn cohort(&self) -> &Cohort {
        &self.cohort
    }

    pub fn conditions(&self) -> Option<&ConditionSet> {
        self.conditions.as_ref()
    }

    /// Grant the policy and publish its treasure map
    pub async fn deploy(
        self,
        label: &str,
        network: &Network,
        retrieval: &RetrievalConfig,
    ) -> Result<DeployedStrategy> {
        let alice = Alice::from_keyring(self.publisher);
        let bob = Bob::from_keyring(self.recipient);

        let policy = alice
            .grant(bob.to_remote(), label, self.cohort, network.ledger.as_ref())
            .await?;

        network
            .directory
            .store_treasure_map(&policy.treasure_map)
            .await
            .map_err(|e| CbdError::Transport(format!("storing treasure map: {}", e)))?;
        info!("Strategy deployed for label {} ({})", label, policy.hrac);

        let mut encrypter = Enrico::new(policy.policy_encrypting_key);
        if let Some(conditions) = self.conditions {
            encrypter = encrypter.with_conditions(conditions);
        }

        let decryptor = match &network.oracle {
            Some(oracle) => Decryptor::with_oracle(Arc::clone(oracle)),
            None => Decryptor::new(),
        };
        let decrypter = Decrypter {
            bob,
            hrac: policy.hrac,
            publisher_verifying_key: policy.publisher_verifying_key,
            directory: Arc::clone(&network.directory),
            dispatcher: Dispatcher::new(
                Arc::clone(&network.client),
                DispatcherConfig::from(retrieval),
            ),
            decryptor,
        };

        Ok(DeployedStrategy {
            label: label.to_string(),
            policy,
            encrypter,
            decrypter,
        })
    }
}

pub struct DeployedStrategy {
    pub label: String,
    pub policy: EnactedPolicy,
    pub encrypter: Enrico,
    pub decrypter: Decrypter,
}

/// Recipient side of a deployed strategy
pub struct Decrypter {
    bob: Bob,
    hrac: Hrac,
    publisher_verifying_key: VerifyingKey,
    directory: Arc<dyn NodeDirectory>,
    dispatcher: Dispatcher,
    decryptor: Decryptor,
}

impl Decrypter {
    pub fn bob(&self) -> &Bob {
        &self.bob
    }

    /// Fetch the treasure map, discover its nodes and collect fragments
    pub async fn retrieve(
        &self,
        kits: Vec<MessageKit>,
        context: &ConditionContext,
    ) -> Result<Vec<PolicyMessageKit>> {
        let published = self
            .directory
            .get_treasure_map(&self.hrac)
            .await
            .map_err(|e| match e {
                BoundaryError::NotFound(what) => {
                    CbdError::TreasureMapInvalid(format!("not published: {}", what))
                }
                other => CbdError::Transport(other.to_string()),
            })?;
        let treasure_map = self
            .bob
            .resolve_treasure_map(&published, &self.publisher_verifying_key)?;

        let nodes = self
            .directory
            .get_nodes(&NodeQuery::exactly(treasure_map.node_addresses()))
            .await
            .map_err(|e| CbdError::DiscoveryUnavailable(e.to_string()))?;

        self.dispatcher
            .retrieve(
                kits,
                &treasure_map,
                &nodes,
                &self.bob.to_remote(),
                context,
            )
            .await
    }

    pub async fn retrieve_and_decrypt(
        &self,
        kits: Vec<MessageKit>,
        context: &ConditionContext,
    ) -> Result<Vec<Vec<u8>>> {
        let retrieved = self.retrieve(kits, context).await?;
        let mut cleartexts = Vec::with_capacity(retrieved.len());
        for kit in &retrieved {
            cleartexts.push(self.decryptor.decrypt(&self.bob, kit, context).await?);
        }
        info!("Decrypted {} message kit(s)", cleartexts.len());
        Ok(cleartexts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{InMemoryLedger, LocalNetwork};

    fn network(local: Arc<LocalNetwork>, ledger: Arc<InMemoryLedger>) -> Network {
        Network {
            directory: local.clone(),
            client: local,
            ledger,
            oracle: None,
        }
    }

    #[tokio::test]
    async fn test_deploy_stores_map_and_decrypts() {
        let local = Arc::new(LocalNetwork::new(4));
        let cohort = Cohort::from_nodes(local.node_infos(), 2).unwrap();
        let deployed = Strategy::create(cohort, None)
            .unwrap()
            .deploy("test", &network(local.clone(), Arc::default()), &RetrievalConfig::default())
            .await
            .unwrap();

        assert_eq!(deployed.label, "test");
        assert!(local.get_treasure_map(&deployed.policy.hrac).await.is_ok());

        let kit = deployed.encrypter.encrypt_message(b"hello", None).unwrap();
        let cleartexts = deployed
            .decrypter
            .retrieve_and_decrypt(vec![kit], &ConditionContext::default())
            .await
            .unwrap();
        assert_eq!(cleartexts, vec![b"hello".to_vec()]);
    }

    #[test]
    fn test_invalid_default_conditions_rejected() {
        let local = LocalNetwork::new(3);
        let cohort = Cohort::from_nodes(local.node_infos(), 2).unwrap();
        let bad = ConditionSet::from(cbd_conditions::Condition::erc721_ownership("0x12", 5, 1));
        assert!(matches!(
            Strategy::create(cohort, Some(bad)),
            Err(CbdError::InvalidCondition(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_publication_leaves_nothing_behind() {
        let local = Arc::new(LocalNetwork::new(3));
        let cohort = Cohort::from_nodes(local.node_infos(), 2).unwrap();
        let strategy = Strategy::create(cohort, None).unwrap();

        let result = strategy
            .deploy(
                "test",
                &network(local.clone(), Arc::new(InMemoryLedger::failing())),
                &RetrievalConfig::default(),
            )
            .await;
        assert!(matches!(result, Err(CbdError::PolicyPublicationFailed(_))));
        assert_eq!(local.dispatched(), 0);
    }
}
