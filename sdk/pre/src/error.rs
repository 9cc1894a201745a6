use thiserror::Error;

/// Errors raised by the re-encryption primitives
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreError {
    #[error("invalid threshold: threshold={threshold}, shares={shares}")]
    InvalidThreshold { threshold: usize, shares: usize },

    #[error("invalid encoding: {0}")]
    InvalidBytes(&'static str),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("key fragment rejected: {0}")]
    InvalidKeyFrag(String),

    #[error("capsule fragment rejected: {0}")]
    InvalidCapsuleFrag(String),
}
