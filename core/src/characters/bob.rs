//! Recipient

use cbd_pre::{PublicKey, VerifiedCapsuleFrag, VerifyingKey, decrypt_reencrypted};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CbdError, Result};
use crate::keyring::Keyring;
use crate::kits::retrieval::PolicyMessageKit;
use crate::policy::treasure_map::{PublishedTreasureMap, TreasureMap};

/// Public identity of a recipient, as the publisher knows it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RemoteBob {
    pub verifying_key: VerifyingKey,
    pub encrypting_key: PublicKey,
}

impl RemoteBob {
    pub fn from_public_keys(verifying_key: VerifyingKey, encrypting_key: PublicKey) -> Self {
        Self {
            verifying_key,
            encrypting_key,
        }
    }
}

#[derive(Debug)]
pub struct Bob {
    keyring: Keyring,
}

impl Bob {
    pub fn from_keyring(keyring: Keyring) -> Self {
        Self { keyring }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.keyring.signer().verifying_key()
    }

    pub fn encrypting_key(&self) -> PublicKey {
        self.keyring.encrypting_public_key()
    }

    pub fn to_remote(&self) -> RemoteBob {
        RemoteBob::from_public_keys(self.verifying_key(), self.encrypting_key())
    }

    /// Decrypt and authenticate a published treasure map
    pub fn resolve_treasure_map(
        &self,
        published: &PublishedTreasureMap,
        publisher: &VerifyingKey,
    ) -> Result<TreasureMap> {
        published.decrypt(&self.keyring.encrypting_secret_key(), publisher)
    }

    /// Combine the first `threshold` fragments, in node address order
    pub fn decrypt(&self, kit: &PolicyMessageKit) -> Result<Vec<u8>> {
        if !kit.is_decryptable_by_receiver() {
            return Err(CbdError::NotEnoughFragments {
                threshold: kit.threshold(),
                received: kit.result().len(),
            });
        }

        let cfrags: Vec<VerifiedCapsuleFrag> = kit
            .result()
            .cfrags()
            .take(kit.threshold())
            .map(|(_, cfrag)| cfrag.clone())
            .collect();
        debug!("Combining {} capsule fragments", cfrags.len());

        let message_kit = kit.message_kit();
        Ok(decrypt_reencrypted(
            &self.keyring.encrypting_secret_key(),
            kit.policy_encrypting_key(),
            &message_kit.capsule,
            cfrags,
            &message_kit.ciphertext,
        )?)
    }
}
