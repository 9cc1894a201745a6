//! Work Orders
//!
//! A work order asks one node to reencrypt one capsule with the key
//! fragment the treasure map assigned to it. The node answers with a signed
//! capsule fragment or an explicit denial.
//!
//! ```text
//! Bob ── ReencryptionRequest ──▶ Node
//!                                 │ open assignment (node key)
//!                                 │ check publisher authorization + kfrag
//!                                 │ evaluate conditions (context)
//!                                 │ reencrypt, sign cfrag bytes
//! Bob ◀── NodeReply ─────────────┘   Fragment { cfrag, signature } | Denied
//!  │ check node signature
//!  └ check cfrag against capsule, publisher, policy key and Bob's key
//! ```

use std::fmt;

use cbd_conditions::{ConditionContext, ConditionError, ConditionOracle, ConditionSet};
use cbd_pre::{
    Capsule, CapsuleFrag, PublicKey, SecretKey, Signature, Signer, VerifiedCapsuleFrag,
    VerifyingKey, reencrypt,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::characters::bob::RemoteBob;
use crate::codec::{conditions_json, json_option};
use crate::error::{CbdError, NodeFailure, Result};
use crate::kits::message_kit::MessageKit;
use crate::node::{NodeAddress, NodeInfo};
use crate::policy::hrac::Hrac;
use crate::policy::treasure_map::{EncryptedKeyFrag, TreasureMap};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReencryptionRequest {
    pub hrac: Hrac,
    pub encrypted_kfrag: EncryptedKeyFrag,
    pub capsule: Capsule,
    #[serde(with = "conditions_json")]
    pub conditions: Option<ConditionSet>,
    #[serde(with = "json_option")]
    pub context: Option<ConditionContext>,
    pub publisher_verifying_key: VerifyingKey,
    pub bob_verifying_key: VerifyingKey,
    pub bob_encrypting_key: PublicKey,
    pub policy_encrypting_key: PublicKey,
}

/// Why a node refused to reencrypt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialReason {
    ConditionNotSatisfied,
    /// The node could not evaluate the conditions right now
    ConditionUnavailable(String),
    Unauthorized(String),
    Malformed(String),
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::ConditionNotSatisfied => f.write_str("condition not satisfied"),
            DenialReason::ConditionUnavailable(msg) => write!(f, "condition unavailable: {}", msg),
            DenialReason::Unauthorized(msg) => write!(f, "unauthorized: {}", msg),
            DenialReason::Malformed(msg) => write!(f, "malformed: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeReply {
    /// Canonical capsule fragment bytes and the node's signature over them
    Fragment { cfrag: Vec<u8>, signature: Signature },
    Denied(DenialReason),
}

// ============================================================================
// Requester side
// ============================================================================

/// One node's share of a retrieval
#[derive(Debug, Clone)]
pub struct WorkOrder {
    pub node: NodeInfo,
    pub request: ReencryptionRequest,
}

impl WorkOrder {
    pub fn new(
        node: NodeInfo,
        treasure_map: &TreasureMap,
        kit: &MessageKit,
        bob: &RemoteBob,
        context: &ConditionContext,
    ) -> Result<Self> {
        let encrypted_kfrag = treasure_map
            .destinations
            .get(&node.address)
            .cloned()
            .ok_or_else(|| {
                CbdError::TreasureMapInvalid(format!("node {} has no assignment", node.address))
            })?;

        let request = ReencryptionRequest {
            hrac: treasure_map.hrac,
            encrypted_kfrag,
            capsule: kit.capsule.clone(),
            conditions: kit.conditions().cloned(),
            context: kit.conditions().map(|_| context.clone()),
            publisher_verifying_key: treasure_map.publisher_verifying_key,
            bob_verifying_key: bob.verifying_key,
            bob_encrypting_key: bob.encrypting_key,
            policy_encrypting_key: treasure_map.policy_encrypting_key,
        };
        Ok(Self { node, request })
    }
}

/// A capsule fragment that is signed by its node and is a correct
/// reencryption of the requested capsule
#[derive(Debug, Clone)]
pub struct WorkOrderResult {
    pub cfrag: VerifiedCapsuleFrag,
    pub signature: Signature,
}

impl WorkOrderResult {
    /// Accept a fragment only if the order's node signed exactly these bytes
    /// and the fragment was produced from the order's capsule with a key
    /// fragment the publisher issued for this policy and recipient.
    pub fn verify(
        order: &WorkOrder,
        cfrag_bytes: &[u8],
        signature: &Signature,
    ) -> std::result::Result<Self, NodeFailure> {
        if !cbd_pre::verify_signature(&order.node.verifying_key, cfrag_bytes, signature) {
            return Err(NodeFailure::InvalidSignature);
        }

        let cfrag: CapsuleFrag = bincode::deserialize(cfrag_bytes)
            .map_err(|e| NodeFailure::InvalidFragment(format!("undecodable: {}", e)))?;
        let request = &order.request;
        let cfrag = cbd_pre::verify_cfrag(
            cfrag,
            &request.capsule,
            &request.publisher_verifying_key,
            &request.policy_encrypting_key,
            &request.bob_encrypting_key,
        )
        .map_err(|e| NodeFailure::InvalidFragment(e.to_string()))?;

        Ok(Self {
            cfrag,
            signature: signature.clone(),
        })
    }
}

// ============================================================================
// Node side
// ============================================================================

/// Key material of a reencryption node
pub struct ReencryptionNode {
    secret: SecretKey,
    signer: Signer,
}

impl ReencryptionNode {
    pub fn new(secret: SecretKey, signer: Signer) -> Self {
        Self { secret, signer }
    }

    pub fn random() -> Self {
        Self::new(SecretKey::random(), cbd_pre::random_signer())
    }

    pub fn info(&self, uri: impl Into<String>) -> NodeInfo {
        let verifying_key = self.signer.verifying_key();
        NodeInfo {
            address: NodeAddress::from_verifying_key(&verifying_key),
            encrypting_key: self.secret.public_key(),
            verifying_key,
            uri: uri.into(),
        }
    }

    /// Process a work order the way a node does
    pub async fn handle(
        &self,
        request: &ReencryptionRequest,
        oracle: &dyn ConditionOracle,
    ) -> NodeReply {
        match self.try_handle(request, oracle).await {
            Ok(reply) => reply,
            Err(reason) => {
                debug!("Denying work order for {}: {}", request.hrac, reason);
                NodeReply::Denied(reason)
            }
        }
    }

    async fn try_handle(
        &self,
        request: &ReencryptionRequest,
        oracle: &dyn ConditionOracle,
    ) -> std::result::Result<NodeReply, DenialReason> {
        let authorized = request
            .encrypted_kfrag
            .open(&self.secret)
            .map_err(|_| DenialReason::Malformed("cannot open key fragment".into()))?;

        if !authorized.verify(&request.hrac, &request.publisher_verifying_key) {
            return Err(DenialReason::Unauthorized(
                "publisher did not authorize this fragment".into(),
            ));
        }

        let kfrag = cbd_pre::verify_kfrag(
            authorized.kfrag,
            &request.publisher_verifying_key,
            &request.policy_encrypting_key,
            &request.bob_encrypting_key,
        )
        .map_err(|err| DenialReason::Unauthorized(err.to_string()))?;

        if let Some(conditions) = &request.conditions {
            let context = request
                .context
                .as_ref()
                .ok_or_else(|| DenialReason::Malformed("missing condition context".into()))?;
            conditions
                .check(context, oracle)
                .await
                .map_err(|err| match err {
                    ConditionError::NotSatisfied => DenialReason::ConditionNotSatisfied,
                    ConditionError::Evaluation(msg) => DenialReason::ConditionUnavailable(msg),
                    other => DenialReason::Malformed(other.to_string()),
                })?;
        }

        let cfrag = bincode::serialize(&reencrypt(&request.capsule, &kfrag).unverify())
            .map_err(|_| DenialReason::Malformed("cannot encode fragment".into()))?;
        Ok(NodeReply::Fragment {
            signature: self.signer.sign(&cfrag),
            cfrag,
        })
    }
}
