#![allow(dead_code)]

use std::sync::Arc;

use cbd_conditions::{ConditionContext, ConditionSet, Param};
use cbd_config::{CohortConfig, RetrievalConfig};
use cbd_core::local::{InMemoryLedger, LocalNetwork, StaticOracle};
use cbd_core::{Cohort, DeployedStrategy, Keyring, Network, NodeAddress, Result, Strategy};

pub const NFT: &str = "0x1e988ba4692e52bc50b375bcc8585b95c48aad77";
pub const USER: &str = "0x7fff551249d223f723557a96a0e1a469c79cc934";
pub const STRANGER: &str = "0x0000000000000000000000000000000000000bad";

pub const ALICE_SEED: [u8; 32] = *b"fake-keyring-seed-32-bytes-alice";
pub const BOB_SEED: [u8; 32] = *b"fake-keyring-seed-32-bytes-bob-x";

/// In-process network where USER owns every NFT token
pub struct TestFixture {
    pub network: Arc<LocalNetwork>,
    pub oracle: Arc<StaticOracle>,
    pub ledger: Arc<InMemoryLedger>,
}

impl TestFixture {
    pub fn new(nodes: usize) -> Self {
        Self::with_ledger(nodes, InMemoryLedger::default())
    }

    pub fn with_ledger(nodes: usize, ledger: InMemoryLedger) -> Self {
        let oracle = Arc::new(StaticOracle::new());
        oracle.set(NFT, "ownerOf", Param::from(USER));
        oracle.set(NFT, "balanceOf", Param::from(1u64));
        Self {
            network: Arc::new(LocalNetwork::with_oracle(nodes, oracle.clone())),
            oracle,
            ledger: Arc::new(ledger),
        }
    }

    pub fn boundaries(&self) -> Network {
        Network {
            directory: self.network.clone(),
            client: self.network.clone(),
            ledger: self.ledger.clone(),
            oracle: None,
        }
    }

    /// Sample a cohort through discovery and deploy a strategy over it
    pub async fn deploy(
        &self,
        threshold: usize,
        shares: usize,
        conditions: Option<ConditionSet>,
        retrieval: &RetrievalConfig,
    ) -> Result<DeployedStrategy> {
        let cohort = Cohort::create(
            self.network.as_ref(),
            &CohortConfig { threshold, shares },
        )
        .await?;
        Strategy::create(cohort, conditions)?
            .with_keyrings(
                Keyring::from_seed(ALICE_SEED).unwrap(),
                Keyring::from_seed(BOB_SEED).unwrap(),
            )
            .deploy("test-label", &self.boundaries(), retrieval)
            .await
    }

    /// Cohort addresses in the order the dispatcher contacts them
    pub fn sorted_addresses(&self) -> Vec<NodeAddress> {
        let mut addresses = self.network.node_addresses();
        addresses.sort();
        addresses
    }
}

pub fn user_context() -> ConditionContext {
    ConditionContext::for_user(USER)
}

pub fn retrieval(
    node_timeout_ms: u64,
    deadline_ms: u64,
    initial_fanout: Option<usize>,
) -> RetrievalConfig {
    RetrievalConfig {
        node_timeout_ms,
        deadline_ms,
        initial_fanout,
    }
}
