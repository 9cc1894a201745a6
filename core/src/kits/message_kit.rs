//! Message Kit
//!
//! Ciphertext, capsule and the condition set that gates it. The condition
//! set travels as its canonical JSON string so that Enrico, every node and
//! the decryptor see byte-identical conditions.

use cbd_conditions::ConditionSet;
use cbd_pre::{Capsule, PublicKey, SecretKey};
use serde::{Deserialize, Serialize};

use crate::codec::conditions_json;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageKit {
    pub capsule: Capsule,
    pub ciphertext: Vec<u8>,
    #[serde(with = "conditions_json")]
    conditions: Option<ConditionSet>,
}

impl MessageKit {
    /// Encrypt under a policy key, binding `conditions` to the result
    pub fn new(
        policy_encrypting_key: &PublicKey,
        plaintext: &[u8],
        conditions: Option<ConditionSet>,
    ) -> Result<Self> {
        if let Some(conditions) = &conditions {
            conditions.validate()?;
        }
        let (capsule, ciphertext) = cbd_pre::encrypt(policy_encrypting_key, plaintext)?;
        Ok(Self {
            capsule,
            ciphertext,
            conditions,
        })
    }

    pub fn conditions(&self) -> Option<&ConditionSet> {
        self.conditions.as_ref()
    }

    /// Decrypt with the policy's delegating secret key
    pub fn decrypt(&self, delegating_sk: &SecretKey) -> Result<Vec<u8>> {
        Ok(cbd_pre::decrypt_original(delegating_sk, &self.capsule, &self.ciphertext)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbd_conditions::{Comparator, Condition, ReturnValueTest};

    fn conditions() -> ConditionSet {
        ConditionSet::new(vec![
            Condition::erc721_ownership("0x1e988ba4692e52Bc50b375bcC8585b95c48AaD77", 5, 3591),
            Condition::erc721_balance(
                "0x1e988ba4692e52Bc50b375bcC8585b95c48AaD77",
                5,
                ReturnValueTest::new(Comparator::Ge, 3u64),
            ),
        ])
    }

    #[test]
    fn test_bytes_roundtrip_keeps_conditions() {
        let sk = SecretKey::random();
        let kit = MessageKit::new(&sk.public_key(), b"fake-message", Some(conditions())).unwrap();

        let decoded = MessageKit::from_bytes(&kit.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, kit);
        assert_eq!(decoded.conditions(), Some(&conditions()));
        assert_eq!(decoded.decrypt(&sk).unwrap(), b"fake-message");
    }

    #[test]
    fn test_without_conditions() {
        let sk = SecretKey::random();
        let kit = MessageKit::new(&sk.public_key(), b"plain", None).unwrap();
        let decoded = MessageKit::from_bytes(&kit.to_bytes().unwrap()).unwrap();
        assert!(decoded.conditions().is_none());
    }

    #[test]
    fn test_invalid_conditions_rejected_before_encryption() {
        let sk = SecretKey::random();
        let bad = ConditionSet::new(vec![Condition::erc721_ownership("0xnope", 5, 1)]);
        assert!(MessageKit::new(&sk.public_key(), b"x", Some(bad)).is_err());
    }
}
