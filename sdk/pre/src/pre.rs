//! Encryption, Re-encryption and Decryption
//!
//! Thin wrappers over `umbral_pre` that fix the protocol's choices: key
//! fragments always sign both the delegating and the receiving key, and
//! every fragment is verified against the full key set before use.
//!
//! ```text
//! encrypt(P, m)               -> (capsule, ct)
//! generate_kfrags(p, B, m, n) -> n kfrags, any m of them re-key P to B
//! reencrypt(capsule, kfrag_i) -> cfrag_i
//! verify_cfrag(cfrag_i, ..)   -> verified cfrag_i
//! decrypt_reencrypted(b, P, capsule, >= m verified cfrags, ct) -> m
//! ```

use crate::error::PreError;
use crate::keys::{PublicKey, SecretKey, Signer, VerifyingKey};

pub use umbral_pre::{Capsule, CapsuleFrag, KeyFrag, VerifiedCapsuleFrag, VerifiedKeyFrag};

/// Encrypt `plaintext` under `delegating_pk`
pub fn encrypt(
    delegating_pk: &PublicKey,
    plaintext: &[u8],
) -> Result<(Capsule, Vec<u8>), PreError> {
    umbral_pre::encrypt(delegating_pk, plaintext)
        .map(|(capsule, ciphertext)| (capsule, ciphertext.into_vec()))
        .map_err(|e| PreError::EncryptionFailed(e.to_string()))
}

/// Decrypt with the secret key the capsule was created for
pub fn decrypt_original(
    delegating_sk: &SecretKey,
    capsule: &Capsule,
    ciphertext: &[u8],
) -> Result<Vec<u8>, PreError> {
    umbral_pre::decrypt_original(delegating_sk, capsule, ciphertext)
        .map(|plaintext| plaintext.into_vec())
        .map_err(|e| PreError::DecryptionFailed(e.to_string()))
}

/// Split the delegating key into `shares` fragments for `receiving_pk`
pub fn generate_kfrags(
    delegating_sk: &SecretKey,
    receiving_pk: &PublicKey,
    signer: &Signer,
    threshold: usize,
    shares: usize,
) -> Result<Vec<VerifiedKeyFrag>, PreError> {
    if threshold == 0 || threshold > shares {
        return Err(PreError::InvalidThreshold { threshold, shares });
    }
    let kfrags = umbral_pre::generate_kfrags(
        delegating_sk,
        receiving_pk,
        signer,
        threshold,
        shares,
        true,
        true,
    );
    Ok(kfrags.into_vec())
}

/// Check a received key fragment against the keys it must have been issued for
pub fn verify_kfrag(
    kfrag: KeyFrag,
    publisher: &VerifyingKey,
    delegating_pk: &PublicKey,
    receiving_pk: &PublicKey,
) -> Result<VerifiedKeyFrag, PreError> {
    kfrag
        .verify(publisher, Some(delegating_pk), Some(receiving_pk))
        .map_err(|(e, _)| PreError::InvalidKeyFrag(e.to_string()))
}

/// Re-encrypt a capsule with one key fragment
pub fn reencrypt(capsule: &Capsule, kfrag: &VerifiedKeyFrag) -> VerifiedCapsuleFrag {
    umbral_pre::reencrypt(capsule, kfrag.clone())
}

/// Check that a capsule fragment is a correct re-encryption of `capsule`
/// under a key fragment `publisher` issued from `delegating_pk` to
/// `receiving_pk`.
pub fn verify_cfrag(
    cfrag: CapsuleFrag,
    capsule: &Capsule,
    publisher: &VerifyingKey,
    delegating_pk: &PublicKey,
    receiving_pk: &PublicKey,
) -> Result<VerifiedCapsuleFrag, PreError> {
    cfrag
        .verify(capsule, publisher, delegating_pk, receiving_pk)
        .map_err(|(e, _)| PreError::InvalidCapsuleFrag(e.to_string()))
}

/// Combine verified capsule fragments and decrypt as the receiver.
///
/// All fragments must come from one key fragment set and be distinct.
/// With fewer fragments than the set's threshold decryption fails.
pub fn decrypt_reencrypted(
    receiving_sk: &SecretKey,
    delegating_pk: &PublicKey,
    capsule: &Capsule,
    cfrags: impl IntoIterator<Item = VerifiedCapsuleFrag>,
    ciphertext: &[u8],
) -> Result<Vec<u8>, PreError> {
    umbral_pre::decrypt_reencrypted(receiving_sk, delegating_pk, capsule, cfrags, ciphertext)
        .map(|plaintext| plaintext.into_vec())
        .map_err(|e| PreError::DecryptionFailed(e.to_string()))
}
