//! Retrieval Aggregator
//!
//! Verified capsule fragments accumulate per node until the policy
//! threshold is met:
//!
//! ```text
//! Pending ──first fragment──▶ Accumulating ──threshold reached──▶ Decryptable
//! ```

use std::collections::BTreeMap;

use cbd_pre::{PublicKey, VerifiedCapsuleFrag};

use crate::kits::message_kit::MessageKit;
use crate::node::NodeAddress;

/// Verified fragments keyed by the node that produced them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    cfrags: BTreeMap<NodeAddress, VerifiedCapsuleFrag>,
}

impl RetrievalResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fragment. A node's first fragment wins; returns whether
    /// anything changed.
    pub fn add(&mut self, node: NodeAddress, cfrag: VerifiedCapsuleFrag) -> bool {
        if self.cfrags.contains_key(&node) {
            return false;
        }
        self.cfrags.insert(node, cfrag);
        true
    }

    /// Merge another result; existing entries are kept
    pub fn merge(mut self, other: RetrievalResult) -> Self {
        for (node, cfrag) in other.cfrags {
            self.add(node, cfrag);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.cfrags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cfrags.is_empty()
    }

    pub fn contains(&self, node: &NodeAddress) -> bool {
        self.cfrags.contains_key(node)
    }

    /// Fragments in node address order
    pub fn cfrags(&self) -> impl Iterator<Item = (&NodeAddress, &VerifiedCapsuleFrag)> {
        self.cfrags.iter()
    }
}

impl FromIterator<(NodeAddress, VerifiedCapsuleFrag)> for RetrievalResult {
    fn from_iter<I: IntoIterator<Item = (NodeAddress, VerifiedCapsuleFrag)>>(iter: I) -> Self {
        let mut result = Self::new();
        for (node, cfrag) in iter {
            result.add(node, cfrag);
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KitState {
    Pending,
    Accumulating { received: usize },
    Decryptable,
}

/// A message kit plus the policy context and fragments needed to open it
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyMessageKit {
    message_kit: MessageKit,
    policy_encrypting_key: PublicKey,
    threshold: usize,
    result: RetrievalResult,
}

impl PolicyMessageKit {
    pub fn from_message_kit(
        message_kit: MessageKit,
        policy_encrypting_key: PublicKey,
        threshold: usize,
    ) -> Self {
        Self {
            message_kit,
            policy_encrypting_key,
            threshold,
            result: RetrievalResult::new(),
        }
    }

    pub fn with_result(mut self, result: RetrievalResult) -> Self {
        self.result = self.result.merge(result);
        self
    }

    pub fn message_kit(&self) -> &MessageKit {
        &self.message_kit
    }

    pub fn policy_encrypting_key(&self) -> &PublicKey {
        &self.policy_encrypting_key
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn result(&self) -> &RetrievalResult {
        &self.result
    }

    pub fn state(&self) -> KitState {
        match self.result.len() {
            0 => KitState::Pending,
            n if n >= self.threshold => KitState::Decryptable,
            n => KitState::Accumulating { received: n },
        }
    }

    pub fn is_decryptable_by_receiver(&self) -> bool {
        self.state() == KitState::Decryptable
    }
}
