//! Treasure Maps
//!
//! A treasure map tells the recipient which node holds which (encrypted)
//! key fragment. It moves through one-way stages:
//!
//! ```text
//! TreasureMap ──sign+encrypt(bob)──▶ EncryptedTreasureMap
//!      │                                     │
//!      └──────── PrePublishedTreasureMap ◀───┘  (hrac, public signature,
//!                        │                       destinations, threshold)
//!                        │ publish(receipt)
//!                        ▼
//!               PublishedTreasureMap ──decrypt(bob)──▶ TreasureMap
//! ```
//!
//! Every encoded form is bincode over BTreeMaps, so two endpoints always
//! agree on the bytes that were signed.

use std::collections::{BTreeMap, BTreeSet};

use cbd_pre::{
    Capsule, KeyFrag, PublicKey, SecretKey, Signature, Signer, VerifiedKeyFrag, VerifyingKey,
};
use serde::{Deserialize, Serialize};

use crate::boundary::{PolicyMetadata, TransactionReceipt};
use crate::error::{CbdError, Result};
use crate::node::{NodeAddress, NodeInfo};
use crate::policy::hrac::Hrac;

// ============================================================================
// Key fragment assignments
// ============================================================================

/// A key fragment the publisher authorized for one policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizedKeyFrag {
    pub hrac: Hrac,
    pub kfrag: KeyFrag,
    pub signature: Signature,
}

impl AuthorizedKeyFrag {
    pub fn new(signer: &Signer, hrac: Hrac, kfrag: VerifiedKeyFrag) -> Result<Self> {
        let kfrag = kfrag.unverify();
        let signature = signer.sign(&Self::message(&hrac, &kfrag)?);
        Ok(Self {
            hrac,
            kfrag,
            signature,
        })
    }

    fn message(hrac: &Hrac, kfrag: &KeyFrag) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&(hrac, kfrag))?)
    }

    /// Check the publisher's authorization for `hrac`
    pub fn verify(&self, hrac: &Hrac, publisher: &VerifyingKey) -> bool {
        self.hrac == *hrac
            && Self::message(&self.hrac, &self.kfrag)
                .map(|message| verify(publisher, &message, &self.signature))
                .unwrap_or(false)
    }
}

/// An authorized key fragment sealed to its node's encrypting key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedKeyFrag {
    capsule: Capsule,
    ciphertext: Vec<u8>,
}

impl EncryptedKeyFrag {
    pub fn seal(node_key: &PublicKey, authorized: &AuthorizedKeyFrag) -> Result<Self> {
        let plaintext = bincode::serialize(authorized)?;
        let (capsule, ciphertext) = cbd_pre::encrypt(node_key, &plaintext)?;
        Ok(Self {
            capsule,
            ciphertext,
        })
    }

    /// Node side: recover the assignment with the node's secret key
    pub fn open(&self, node_secret: &SecretKey) -> Result<AuthorizedKeyFrag> {
        let plaintext = cbd_pre::decrypt_original(node_secret, &self.capsule, &self.ciphertext)?;
        Ok(bincode::deserialize(&plaintext)?)
    }
}

// ============================================================================
// Treasure map
// ============================================================================

/// Plaintext assignment of encrypted key fragments to nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreasureMap {
    pub hrac: Hrac,
    pub threshold: usize,
    pub destinations: BTreeMap<NodeAddress, EncryptedKeyFrag>,
    pub policy_encrypting_key: PublicKey,
    pub publisher_verifying_key: VerifyingKey,
}

impl TreasureMap {
    /// Pair each node with one key fragment and seal it to that node
    pub fn construct_by_publisher(
        signer: &Signer,
        hrac: Hrac,
        policy_encrypting_key: PublicKey,
        assignments: Vec<(NodeInfo, VerifiedKeyFrag)>,
        threshold: usize,
    ) -> Result<Self> {
        if threshold == 0 || threshold > assignments.len() {
            return Err(CbdError::InvalidPolicyConfiguration(format!(
                "threshold {} with {} assigned nodes",
                threshold,
                assignments.len()
            )));
        }

        let mut destinations = BTreeMap::new();
        for (node, kfrag) in assignments {
            let authorized = AuthorizedKeyFrag::new(signer, hrac, kfrag)?;
            let sealed = EncryptedKeyFrag::seal(&node.encrypting_key, &authorized)?;
            if destinations.insert(node.address.clone(), sealed).is_some() {
                return Err(CbdError::InvalidPolicyConfiguration(format!(
                    "node {} assigned twice",
                    node.address
                )));
            }
        }

        Ok(Self {
            hrac,
            threshold,
            destinations,
            policy_encrypting_key,
            publisher_verifying_key: signer.verifying_key(),
        })
    }

    pub fn node_addresses(&self) -> impl Iterator<Item = &NodeAddress> {
        self.destinations.keys()
    }

    /// Sign with the publisher key and seal for the recipient
    pub fn encrypt(&self, signer: &Signer, recipient: &PublicKey) -> Result<EncryptedTreasureMap> {
        let signature = signer.sign(&bincode::serialize(self)?);
        let signed = SignedTreasureMap {
            map: self.clone(),
            signature,
        };
        let (capsule, ciphertext) = cbd_pre::encrypt(recipient, &bincode::serialize(&signed)?)?;
        Ok(EncryptedTreasureMap {
            capsule,
            ciphertext,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct SignedTreasureMap {
    map: TreasureMap,
    signature: Signature,
}

/// Treasure map readable only by its recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedTreasureMap {
    capsule: Capsule,
    ciphertext: Vec<u8>,
}

impl EncryptedTreasureMap {
    pub fn decrypt(&self, recipient: &SecretKey, publisher: &VerifyingKey) -> Result<TreasureMap> {
        let plaintext = cbd_pre::decrypt_original(recipient, &self.capsule, &self.ciphertext)
            .map_err(|_| CbdError::TreasureMapInvalid("cannot decrypt payload".into()))?;
        let signed: SignedTreasureMap = bincode::deserialize(&plaintext)?;

        if signed.map.publisher_verifying_key != *publisher
            || !verify(publisher, &bincode::serialize(&signed.map)?, &signed.signature)
        {
            return Err(CbdError::TreasureMapSignatureInvalid);
        }
        Ok(signed.map)
    }
}

// ============================================================================
// Publication
// ============================================================================

/// Signed, encrypted map that has not been recorded on the ledger yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrePublishedTreasureMap {
    hrac: Hrac,
    public_signature: Signature,
    payload: EncryptedTreasureMap,
    destinations: Vec<NodeAddress>,
    threshold: usize,
}

impl PrePublishedTreasureMap {
    pub fn new(signer: &Signer, map: &TreasureMap, recipient: &PublicKey) -> Result<Self> {
        let payload = map.encrypt(signer, recipient)?;
        let destinations: Vec<_> = map.node_addresses().cloned().collect();
        let message = public_message(&map.hrac, &payload, &destinations, map.threshold)?;
        Ok(Self {
            hrac: map.hrac,
            public_signature: signer.sign(&message),
            payload,
            destinations,
            threshold: map.threshold,
        })
    }

    pub fn hrac(&self) -> &Hrac {
        &self.hrac
    }

    /// What the ledger needs to record
    pub fn metadata(&self) -> Result<PolicyMetadata> {
        Ok(PolicyMetadata {
            hrac: self.hrac,
            public_signature: self.public_signature.clone(),
            payload: bincode::serialize(&self.payload)?,
            destinations: self.destinations.clone(),
            threshold: self.threshold,
        })
    }

    /// Only way to obtain a [`PublishedTreasureMap`]
    pub fn publish(self, receipt: TransactionReceipt) -> PublishedTreasureMap {
        PublishedTreasureMap {
            inner: self,
            receipt,
        }
    }

    fn verify_public(&self, publisher: &VerifyingKey) -> Result<()> {
        let message =
            public_message(&self.hrac, &self.payload, &self.destinations, self.threshold)?;
        if verify(publisher, &message, &self.public_signature) {
            Ok(())
        } else {
            Err(CbdError::TreasureMapSignatureInvalid)
        }
    }
}

/// A treasure map recorded on the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedTreasureMap {
    inner: PrePublishedTreasureMap,
    receipt: TransactionReceipt,
}

impl PublishedTreasureMap {
    pub fn hrac(&self) -> &Hrac {
        &self.inner.hrac
    }

    pub fn threshold(&self) -> usize {
        self.inner.threshold
    }

    pub fn destinations(&self) -> &[NodeAddress] {
        &self.inner.destinations
    }

    pub fn receipt(&self) -> &TransactionReceipt {
        &self.receipt
    }

    /// Anyone can check the publisher signed this map
    pub fn verify_public(&self, publisher: &VerifyingKey) -> Result<()> {
        self.inner.verify_public(publisher)
    }

    /// Recipient side: verify, decrypt and cross-check against the public part
    pub fn decrypt(&self, recipient: &SecretKey, publisher: &VerifyingKey) -> Result<TreasureMap> {
        self.verify_public(publisher)?;
        let map = self.inner.payload.decrypt(recipient, publisher)?;

        if map.hrac != self.inner.hrac {
            return Err(CbdError::TreasureMapInvalid("policy id mismatch".into()));
        }
        if map.threshold != self.inner.threshold {
            return Err(CbdError::TreasureMapInvalid("threshold mismatch".into()));
        }
        let listed: BTreeSet<_> = self.inner.destinations.iter().collect();
        let assigned: BTreeSet<_> = map.node_addresses().collect();
        if listed != assigned {
            return Err(CbdError::TreasureMapInvalid("destination mismatch".into()));
        }
        Ok(map)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

fn verify(key: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
    cbd_pre::verify_signature(key, message, signature)
}

fn public_message(
    hrac: &Hrac,
    payload: &EncryptedTreasureMap,
    destinations: &[NodeAddress],
    threshold: usize,
) -> Result<Vec<u8>> {
    Ok(bincode::serialize(&(hrac, payload, destinations, threshold as u64))?)
}
