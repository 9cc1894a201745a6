//! Key Material
//!
//! Umbral secp256k1 key pairs double as encrypting keys and as the
//! verifying keys of signers, so a single public key type covers both.

pub use umbral_pre::{PublicKey, SecretKey, SecretKeyFactory, Signature, Signer};

use crate::error::PreError;

/// Public half of a [`Signer`]
pub type VerifyingKey = PublicKey;

/// Seed length accepted by [`factory_from_seed`]
pub const SEED_SIZE: usize = 32;

/// Compressed SEC1 encoding (33 bytes)
pub fn key_bytes(key: &PublicKey) -> Vec<u8> {
    key.to_compressed_bytes().into_vec()
}

pub fn key_from_bytes(bytes: &[u8]) -> Result<PublicKey, PreError> {
    PublicKey::try_from_compressed_bytes(bytes)
        .map_err(|_| PreError::InvalidBytes("compressed public key"))
}

/// Deterministic key factory for a 32-byte seed
pub fn factory_from_seed(seed: &[u8; SEED_SIZE]) -> Result<SecretKeyFactory, PreError> {
    SecretKeyFactory::from_secure_randomness(seed)
        .map_err(|_| PreError::InvalidBytes("secret key factory seed"))
}

/// Signer whose key is derived from `seed`
pub fn signer_from_seed(seed: &[u8; SEED_SIZE]) -> Result<Signer, PreError> {
    Ok(Signer::new(factory_from_seed(seed)?.make_key(b"signing")))
}

pub fn random_signer() -> Signer {
    Signer::new(SecretKey::random())
}

pub fn verify_signature(key: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
    signature.verify(key, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bytes_roundtrip() {
        let pk = SecretKey::random().public_key();
        let bytes = key_bytes(&pk);
        assert_eq!(bytes.len(), 33);
        assert_eq!(key_from_bytes(&bytes).unwrap(), pk);
        assert!(key_from_bytes(&bytes[1..]).is_err());
    }

    #[test]
    fn test_factory_is_deterministic_per_label() {
        let factory = factory_from_seed(&[7u8; 32]).unwrap();
        let a = factory.make_key(b"label-a").public_key();
        let a_again = factory_from_seed(&[7u8; 32])
            .unwrap()
            .make_key(b"label-a")
            .public_key();
        let b = factory.make_key(b"label-b").public_key();

        assert_eq!(a, a_again);
        assert_ne!(a, b);
    }

    #[test]
    fn test_signer_roundtrip() {
        let signer = signer_from_seed(&[3u8; 32]).unwrap();
        let signature = signer.sign(b"payload");
        assert!(verify_signature(&signer.verifying_key(), b"payload", &signature));
        assert!(!verify_signature(&signer.verifying_key(), b"other", &signature));
        assert!(!verify_signature(&random_signer().verifying_key(), b"payload", &signature));
    }
}
