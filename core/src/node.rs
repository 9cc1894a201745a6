//! Reencryption node identity

use std::fmt;

use cbd_pre::{PublicKey, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Checksum address of a node, normalized to lower case
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress(String);

impl NodeAddress {
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().to_ascii_lowercase())
    }

    /// Address derived from a node's verifying key
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let digest = blake3::hash(&cbd_pre::key_bytes(key));
        Self(format!("0x{}", hex::encode(&digest.as_bytes()[..20])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// Everything needed to reach a node and check its answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub address: NodeAddress,
    /// Key fragments assigned to this node are sealed to it
    pub encrypting_key: PublicKey,
    /// Signs the capsule fragments this node returns
    pub verifying_key: VerifyingKey,
    pub uri: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_normalized() {
        let a = NodeAddress::new("0x7fff551249D223f723557a96a0e1a469C79cC934");
        let b = NodeAddress::new("0x7fff551249d223f723557a96a0e1a469c79cc934");
        assert_eq!(a, b);
    }

    #[test]
    fn test_address_from_key_is_stable() {
        let signer = cbd_pre::signer_from_seed(&[9u8; 32]).unwrap();
        let a = NodeAddress::from_verifying_key(&signer.verifying_key());
        let b = NodeAddress::from_verifying_key(&signer.verifying_key());
        assert_eq!(a, b);
        let other = cbd_pre::random_signer().verifying_key();
        assert_ne!(a, NodeAddress::from_verifying_key(&other));
        assert_eq!(a.as_str().len(), 42);
        assert!(a.as_str().starts_with("0x"));
    }
}
