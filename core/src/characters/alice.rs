//! Publisher

use cbd_pre::{PreError, PublicKey, Signer, VerifiedKeyFrag, VerifyingKey, generate_kfrags};
use tracing::debug;

use crate::boundary::PolicyLedger;
use crate::characters::bob::RemoteBob;
use crate::error::{CbdError, Result};
use crate::keyring::Keyring;
use crate::kits::message_kit::MessageKit;
use crate::policy::builder::{BlockchainPolicy, EnactedPolicy};
use crate::policy::cohort::Cohort;

/// Owns the delegating keys and grants policies over them
pub struct Alice {
    keyring: Keyring,
    signer: Signer,
}

impl std::fmt::Debug for Alice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alice")
            .field("verifying_key", &self.verifying_key())
            .finish_non_exhaustive()
    }
}

impl Alice {
    pub fn from_keyring(keyring: Keyring) -> Self {
        let signer = keyring.signer();
        Self { keyring, signer }
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signer.verifying_key()
    }

    pub fn policy_encrypting_key(&self, label: &str) -> PublicKey {
        self.keyring.policy_encrypting_key(label)
    }

    /// Split the label's delegating key into `shares` fragments for `bob`
    pub fn generate_kfrags(
        &self,
        bob: &RemoteBob,
        label: &str,
        threshold: usize,
        shares: usize,
    ) -> Result<(Vec<VerifiedKeyFrag>, PublicKey)> {
        let delegating = self.keyring.policy_secret_key(label);
        let kfrags = generate_kfrags(
            &delegating,
            &bob.encrypting_key,
            &self.signer,
            threshold,
            shares,
        )
        .map_err(|e| match e {
            PreError::InvalidThreshold { .. } => {
                CbdError::InvalidPolicyConfiguration(e.to_string())
            }
            other => CbdError::Decryption(other),
        })?;
        debug!("Generated {} key fragments for label {}", kfrags.len(), label);
        Ok((kfrags, delegating.public_key()))
    }

    /// Grant `bob` a policy over `label`, assigned to `cohort`
    pub async fn grant(
        &self,
        bob: RemoteBob,
        label: &str,
        cohort: Cohort,
        ledger: &dyn PolicyLedger,
    ) -> Result<EnactedPolicy> {
        BlockchainPolicy::new(self, bob, label, cohort)
            .enact(ledger)
            .await
    }

    /// Open a kit encrypted under one of this publisher's policy keys
    pub fn decrypt_own(&self, label: &str, kit: &MessageKit) -> Result<Vec<u8>> {
        kit.decrypt(&self.keyring.policy_secret_key(label))
    }
}
