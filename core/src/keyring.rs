//! Deterministic key material from a single 32-byte seed
//!
//! ```text
//! seed ──▶ SecretKeyFactory ──"signing"───────────▶ Signer
//!                           ──"encrypting"────────▶ SecretKey (PRE receiving key)
//!                           ──"delegating/<label>"▶ policy key
//! ```

use cbd_pre::{PreError, PublicKey, SEED_SIZE, SecretKey, SecretKeyFactory, Signer};
use zeroize::Zeroize;

const SIGNING_LABEL: &[u8] = b"signing";
const ENCRYPTING_LABEL: &[u8] = b"encrypting";
const DELEGATING_PREFIX: &str = "delegating/";

pub struct Keyring {
    factory: SecretKeyFactory,
}

impl Keyring {
    /// Build from a caller-held seed; the caller's copy is wiped.
    pub fn from_seed(mut seed: [u8; SEED_SIZE]) -> Result<Self, PreError> {
        let factory = cbd_pre::factory_from_seed(&seed);
        seed.zeroize();
        Ok(Self { factory: factory? })
    }

    pub fn random() -> Self {
        Self {
            factory: SecretKeyFactory::random(),
        }
    }

    pub fn signer(&self) -> Signer {
        Signer::new(self.factory.make_key(SIGNING_LABEL))
    }

    /// Receiving key: capsule fragments are reencrypted towards it
    pub fn encrypting_secret_key(&self) -> SecretKey {
        self.factory.make_key(ENCRYPTING_LABEL)
    }

    pub fn encrypting_public_key(&self) -> PublicKey {
        self.encrypting_secret_key().public_key()
    }

    /// Delegating key for one policy label
    pub fn policy_secret_key(&self, label: &str) -> SecretKey {
        let label = format!("{}{}", DELEGATING_PREFIX, label);
        self.factory.make_key(label.as_bytes())
    }

    pub fn policy_encrypting_key(&self, label: &str) -> PublicKey {
        self.policy_secret_key(label).public_key()
    }
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field("verifying_key", &self.signer().verifying_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE_SEED: &[u8; 32] = b"fake-keyring-seed-32-bytes-alice";

    #[test]
    fn test_same_seed_same_keys() {
        let a = Keyring::from_seed(*ALICE_SEED).unwrap();
        let b = Keyring::from_seed(*ALICE_SEED).unwrap();
        assert_eq!(a.signer().verifying_key(), b.signer().verifying_key());
        assert_eq!(a.encrypting_public_key(), b.encrypting_public_key());
        assert_eq!(a.policy_encrypting_key("label"), b.policy_encrypting_key("label"));
    }

    #[test]
    fn test_labels_separate_policy_keys() {
        let keyring = Keyring::from_seed(*ALICE_SEED).unwrap();
        assert_ne!(
            keyring.policy_encrypting_key("label-a"),
            keyring.policy_encrypting_key("label-b")
        );
        assert_ne!(keyring.policy_encrypting_key(""), keyring.encrypting_public_key());
        assert_ne!(keyring.signer().verifying_key(), keyring.encrypting_public_key());
    }
}
