//! Policy identifier
//!
//! The HRAC binds a policy to its publisher, its recipient and its label
//! without revealing the label.

use std::fmt;

use cbd_pre::VerifyingKey;
use serde::{Deserialize, Serialize};

const HRAC_CONTEXT: &str = "CBD-HRAC-V1";
pub const HRAC_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hrac([u8; HRAC_SIZE]);

impl Hrac {
    pub fn new(publisher: &VerifyingKey, recipient: &VerifyingKey, label: &str) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(HRAC_CONTEXT);
        hasher.update(&cbd_pre::key_bytes(publisher));
        hasher.update(&cbd_pre::key_bytes(recipient));
        hasher.update(label.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; HRAC_SIZE];
        bytes.copy_from_slice(&digest.as_bytes()[..HRAC_SIZE]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HRAC_SIZE] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let bytes: [u8; HRAC_SIZE] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for Hrac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbd_pre::signer_from_seed;

    #[test]
    fn test_hrac_binds_all_inputs() {
        let alice = signer_from_seed(&[1u8; 32]).unwrap().verifying_key();
        let bob = signer_from_seed(&[2u8; 32]).unwrap().verifying_key();

        let hrac = Hrac::new(&alice, &bob, "label");
        assert_eq!(hrac, Hrac::new(&alice, &bob, "label"));
        assert_ne!(hrac, Hrac::new(&alice, &bob, "other"));
        assert_ne!(hrac, Hrac::new(&bob, &alice, "label"));
    }

    #[test]
    fn test_hex_roundtrip() {
        let alice = signer_from_seed(&[1u8; 32]).unwrap().verifying_key();
        let hrac = Hrac::new(&alice, &alice, "x");
        assert_eq!(Hrac::from_hex(&hrac.to_string()), Some(hrac));
        assert_eq!(Hrac::from_hex("abcd"), None);
    }
}
