//! CBD Proxy Re-encryption
//!
//! Threshold proxy re-encryption for the condition-based decryption
//! protocol, backed by `umbral-pre`. The protocol layers treat this crate
//! as sealed: they only call `encrypt`, `generate_kfrags` (split),
//! `reencrypt`, the two `verify_*` checks and `decrypt_reencrypted`
//! (combine).
//!
//! ```text
//! ┌────────────┐  encrypt(P)   ┌──────────────┐
//! │  Encryptor │──────────────▶│ capsule + ct │
//! └────────────┘               └──────┬───────┘
//!                                     │ capsule
//! ┌────────────┐  kfrag_i      ┌──────▼───────┐  cfrag_i   ┌──────────┐
//! │   Alice    │──────────────▶│   Node i     │───────────▶│   Bob    │
//! │ split(m,n) │               │ reencrypt    │  (>= m)    │ verify + │
//! └────────────┘               └──────────────┘            │ combine  │
//!                                                          └──────────┘
//! ```

pub mod error;
pub mod keys;
pub mod pre;

pub use error::PreError;
pub use keys::{
    PublicKey, SEED_SIZE, SecretKey, SecretKeyFactory, Signature, Signer, VerifyingKey,
    factory_from_seed, key_bytes, key_from_bytes, random_signer, signer_from_seed,
    verify_signature,
};
pub use pre::{
    Capsule, CapsuleFrag, KeyFrag, VerifiedCapsuleFrag, VerifiedKeyFrag, decrypt_original,
    decrypt_reencrypted, encrypt, generate_kfrags, reencrypt, verify_cfrag, verify_kfrag,
};
