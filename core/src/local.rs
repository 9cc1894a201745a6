//! In-process network
//!
//! Implements every boundary trait without I/O so the whole protocol can
//! run inside one process: the demo command and the test suites use it.
//!
//! ```text
//! LocalNetwork ── NodeDirectory      (discovery + treasure map store)
//!              └─ ReencryptionClient (per-node behaviour injection)
//! InMemoryLedger ─ PolicyLedger
//! StaticOracle ─── ConditionOracle   (contract, method) → value
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cbd_conditions::{ConditionOracle, ContractQuery, OracleError, Param};
use tokio::sync::Mutex;
use tracing::debug;

use crate::boundary::{
    BoundaryError, NodeDirectory, NodeQuery, PolicyLedger, PolicyMetadata, ReencryptionClient,
    TransactionReceipt,
};
use crate::node::{NodeAddress, NodeInfo};
use crate::policy::hrac::Hrac;
use crate::policy::treasure_map::PublishedTreasureMap;
use crate::retrieval::work_order::{DenialReason, NodeReply, ReencryptionNode, ReencryptionRequest};

// ============================================================================
// Nodes
// ============================================================================

/// How a local node answers work orders
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeBehaviour {
    #[default]
    Honest,
    /// Connection refused
    Unreachable,
    /// Answers honestly after a delay
    Slow(Duration),
    /// Returns a fragment signed by the wrong key
    ForgeSignature,
    /// Honestly reencrypts and signs, but for a capsule of its own choosing
    WrongCapsule,
    /// Refuses every work order
    Deny(DenialReason),
}

struct LocalNode {
    node: ReencryptionNode,
    info: NodeInfo,
}

pub struct LocalNetwork {
    nodes: Vec<LocalNode>,
    behaviours: Mutex<BTreeMap<NodeAddress, NodeBehaviour>>,
    treasure_maps: Mutex<HashMap<Hrac, PublishedTreasureMap>>,
    oracle: Arc<dyn ConditionOracle>,
    discovery_available: AtomicBool,
    discovery_calls: AtomicUsize,
    dispatched: AtomicUsize,
}

impl LocalNetwork {
    /// `size` honest nodes answering conditions from an empty oracle
    pub fn new(size: usize) -> Self {
        Self::with_oracle(size, Arc::new(StaticOracle::new()))
    }

    pub fn with_oracle(size: usize, oracle: Arc<dyn ConditionOracle>) -> Self {
        let nodes = (0..size)
            .map(|i| {
                let node = ReencryptionNode::random();
                let info = node.info(format!("local://node-{}", i));
                LocalNode { node, info }
            })
            .collect();
        Self {
            nodes,
            behaviours: Mutex::new(BTreeMap::new()),
            treasure_maps: Mutex::new(HashMap::new()),
            oracle,
            discovery_available: AtomicBool::new(true),
            discovery_calls: AtomicUsize::new(0),
            dispatched: AtomicUsize::new(0),
        }
    }

    pub async fn set_behaviour(&self, address: &NodeAddress, behaviour: NodeBehaviour) {
        self.behaviours.lock().await.insert(address.clone(), behaviour);
    }

    pub fn set_discovery_available(&self, available: bool) {
        self.discovery_available.store(available, Ordering::SeqCst);
    }

    pub fn node_infos(&self) -> Vec<NodeInfo> {
        self.nodes.iter().map(|n| n.info.clone()).collect()
    }

    pub fn node_addresses(&self) -> Vec<NodeAddress> {
        self.nodes.iter().map(|n| n.info.address.clone()).collect()
    }

    pub fn discovery_calls(&self) -> usize {
        self.discovery_calls.load(Ordering::SeqCst)
    }

    /// Work orders received so far, across all nodes
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    fn find(&self, address: &NodeAddress) -> Option<&LocalNode> {
        self.nodes.iter().find(|n| &n.info.address == address)
    }
}

#[async_trait]
impl NodeDirectory for LocalNetwork {
    async fn get_nodes(&self, query: &NodeQuery) -> Result<Vec<NodeInfo>, BoundaryError> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        if !self.discovery_available.load(Ordering::SeqCst) {
            return Err(BoundaryError::Unreachable("discovery offline".into()));
        }

        let included = self
            .nodes
            .iter()
            .filter(|n| query.include.contains(&n.info.address));
        let others = self.nodes.iter().filter(|n| {
            !query.include.contains(&n.info.address) && !query.exclude.contains(&n.info.address)
        });

        Ok(included
            .chain(others)
            .take(query.quantity)
            .map(|n| n.info.clone())
            .collect())
    }

    async fn store_treasure_map(&self, map: &PublishedTreasureMap) -> Result<(), BoundaryError> {
        self.treasure_maps.lock().await.insert(*map.hrac(), map.clone());
        Ok(())
    }

    async fn get_treasure_map(&self, hrac: &Hrac) -> Result<PublishedTreasureMap, BoundaryError> {
        self.treasure_maps
            .lock()
            .await
            .get(hrac)
            .cloned()
            .ok_or_else(|| BoundaryError::NotFound(format!("treasure map {}", hrac)))
    }
}

#[async_trait]
impl ReencryptionClient for LocalNetwork {
    async fn reencrypt(
        &self,
        node: &NodeInfo,
        request: &ReencryptionRequest,
    ) -> Result<NodeReply, BoundaryError> {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        let local = self
            .find(&node.address)
            .ok_or_else(|| BoundaryError::Unreachable(format!("no route to {}", node.address)))?;

        let behaviour = self
            .behaviours
            .lock()
            .await
            .get(&node.address)
            .cloned()
            .unwrap_or_default();
        debug!("Node {} handling work order ({:?})", node.address, behaviour);

        match behaviour {
            NodeBehaviour::Honest => Ok(local.node.handle(request, self.oracle.as_ref()).await),
            NodeBehaviour::Unreachable => {
                Err(BoundaryError::Unreachable("connection refused".into()))
            }
            NodeBehaviour::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(local.node.handle(request, self.oracle.as_ref()).await)
            }
            NodeBehaviour::Deny(reason) => Ok(NodeReply::Denied(reason)),
            NodeBehaviour::ForgeSignature => {
                match local.node.handle(request, self.oracle.as_ref()).await {
                    NodeReply::Fragment { cfrag, .. } => {
                        let signature = cbd_pre::random_signer().sign(&cfrag);
                        Ok(NodeReply::Fragment { cfrag, signature })
                    }
                    denied => Ok(denied),
                }
            }
            NodeBehaviour::WrongCapsule => {
                let (decoy, _) = cbd_pre::encrypt(&request.policy_encrypting_key, b"decoy")
                    .map_err(|e| BoundaryError::Rejected(e.to_string()))?;
                let mut swapped = request.clone();
                swapped.capsule = decoy;
                Ok(local.node.handle(&swapped, self.oracle.as_ref()).await)
            }
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Default)]
pub struct InMemoryLedger {
    published: Mutex<Vec<PolicyMetadata>>,
    failing: bool,
}

impl InMemoryLedger {
    /// Ledger that rejects every transaction
    pub fn failing() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub async fn published(&self) -> Vec<PolicyMetadata> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl PolicyLedger for InMemoryLedger {
    async fn publish(
        &self,
        metadata: &PolicyMetadata,
    ) -> Result<TransactionReceipt, BoundaryError> {
        if self.failing {
            return Err(BoundaryError::Rejected("transaction reverted".into()));
        }

        let mut published = self.published.lock().await;
        let mut hasher = blake3::Hasher::new();
        hasher.update(metadata.hrac.as_bytes());
        hasher.update(&(published.len() as u64).to_le_bytes());
        published.push(metadata.clone());

        Ok(TransactionReceipt {
            tx_hash: format!("0x{}", hasher.finalize().to_hex()),
        })
    }
}

// ============================================================================
// Oracle
// ============================================================================

/// Fixed answers keyed by contract address and method
#[derive(Default)]
pub struct StaticOracle {
    answers: std::sync::Mutex<HashMap<(String, String), Param>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, contract_address: &str, method: &str, value: Param) {
        self.answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key(contract_address, method), value);
    }

    /// Forget an answer; later queries for it report the oracle unavailable
    pub fn remove(&self, contract_address: &str, method: &str) {
        self.answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&key(contract_address, method));
    }
}

fn key(contract_address: &str, method: &str) -> (String, String) {
    (contract_address.to_lowercase(), method.to_string())
}

#[async_trait]
impl ConditionOracle for StaticOracle {
    async fn call(&self, query: &ContractQuery) -> Result<Param, OracleError> {
        self.answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key(&query.contract_address, &query.method))
            .cloned()
            .ok_or_else(|| {
                OracleError::Unavailable(format!(
                    "no answer for {}.{}",
                    query.contract_address, query.method
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_honours_include_and_exclude() {
        let network = LocalNetwork::new(5);
        let addresses = network.node_addresses();

        let mut query = NodeQuery::sample(3);
        query.include.insert(addresses[4].clone());
        query.exclude.insert(addresses[0].clone());

        let nodes = network.get_nodes(&query).await.unwrap();
        let got: Vec<_> = nodes.iter().map(|n| n.address.clone()).collect();
        assert_eq!(got, vec![addresses[4].clone(), addresses[1].clone(), addresses[2].clone()]);
        assert_eq!(network.discovery_calls(), 1);
    }

    #[tokio::test]
    async fn test_discovery_outage() {
        let network = LocalNetwork::new(2);
        network.set_discovery_available(false);
        let err = network.get_nodes(&NodeQuery::sample(2)).await.unwrap_err();
        assert!(matches!(err, BoundaryError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_missing_treasure_map() {
        let network = LocalNetwork::new(1);
        let hrac = Hrac::from_hex("00112233445566778899aabbccddeeff").unwrap();
        let err = network.get_treasure_map(&hrac).await.unwrap_err();
        assert!(matches!(err, BoundaryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_static_oracle_lookup_is_case_insensitive() {
        let oracle = StaticOracle::new();
        oracle.set(
            "0xABCDEF0000000000000000000000000000000000",
            "balanceOf",
            Param::from(3u64),
        );

        let query = ContractQuery {
            chain: 5,
            contract_address: "0xabcdef0000000000000000000000000000000000".into(),
            standard_contract_type: Some("ERC20".into()),
            method: "balanceOf".into(),
            parameters: vec![],
        };
        assert_eq!(oracle.call(&query).await.unwrap(), Param::from(3u64));

        oracle.remove("0xabcdef0000000000000000000000000000000000", "balanceOf");
        assert!(matches!(oracle.call(&query).await, Err(OracleError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_failing_ledger() {
        let ledger = InMemoryLedger::failing();
        let metadata = PolicyMetadata {
            hrac: Hrac::from_hex("00112233445566778899aabbccddeeff").unwrap(),
            public_signature: cbd_pre::random_signer().sign(b"x"),
            payload: vec![],
            destinations: vec![],
            threshold: 1,
        };
        assert!(ledger.publish(&metadata).await.is_err());
        assert!(ledger.published().await.is_empty());
    }
}
