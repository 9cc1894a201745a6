//! External collaborators
//!
//! The protocol engine never talks to the network directly. Discovery, the
//! reencryption nodes and the policy ledger are injected behind these traits;
//! [`crate::porter`] implements them over HTTP and [`crate::local`] in
//! process.
//!
//! ```text
//!              ┌──────────────────┐
//!   Cohort ───▶│  NodeDirectory   │  get_nodes / treasure maps
//!              └──────────────────┘
//!              ┌──────────────────┐
//!   Policy ───▶│   PolicyLedger   │  publish(metadata) → receipt
//!              └──────────────────┘
//!              ┌──────────────────┐
//! Dispatcher ─▶│ReencryptionClient│  work order → fragment | denial
//!              └──────────────────┘
//! ```

use std::collections::BTreeSet;

use async_trait::async_trait;
use cbd_pre::Signature;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::{NodeAddress, NodeInfo};
use crate::policy::hrac::Hrac;
use crate::policy::treasure_map::PublishedTreasureMap;
use crate::retrieval::work_order::{NodeReply, ReencryptionRequest};

/// Transport-level failures; explicit node denials are a [`NodeReply`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoundaryError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out")]
    Timeout,

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Node sampling request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeQuery {
    pub quantity: usize,
    /// Nodes that must be part of the answer
    pub include: BTreeSet<NodeAddress>,
    /// Nodes that must not be part of the answer
    pub exclude: BTreeSet<NodeAddress>,
}

impl NodeQuery {
    pub fn sample(quantity: usize) -> Self {
        Self {
            quantity,
            ..Default::default()
        }
    }

    /// Look up exactly these nodes
    pub fn exactly<'a>(addresses: impl IntoIterator<Item = &'a NodeAddress>) -> Self {
        let include: BTreeSet<_> = addresses.into_iter().cloned().collect();
        Self {
            quantity: include.len(),
            include,
            exclude: BTreeSet::new(),
        }
    }
}

#[async_trait]
pub trait NodeDirectory: Send + Sync {
    async fn get_nodes(&self, query: &NodeQuery) -> Result<Vec<NodeInfo>, BoundaryError>;

    async fn store_treasure_map(&self, map: &PublishedTreasureMap) -> Result<(), BoundaryError>;

    async fn get_treasure_map(&self, hrac: &Hrac) -> Result<PublishedTreasureMap, BoundaryError>;
}

#[async_trait]
pub trait ReencryptionClient: Send + Sync {
    /// Deliver one work order. `Ok` covers both fragments and denials.
    async fn reencrypt(
        &self,
        node: &NodeInfo,
        request: &ReencryptionRequest,
    ) -> Result<NodeReply, BoundaryError>;
}

/// What the ledger records about a policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    pub hrac: Hrac,
    pub public_signature: Signature,
    /// Encoded encrypted treasure map
    pub payload: Vec<u8>,
    pub destinations: Vec<NodeAddress>,
    pub threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: String,
}

#[async_trait]
pub trait PolicyLedger: Send + Sync {
    async fn publish(&self, metadata: &PolicyMetadata) -> Result<TransactionReceipt, BoundaryError>;
}
