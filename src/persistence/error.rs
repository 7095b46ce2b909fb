use thiserror::Error;

use crate::platform::StorageError;

/// Error raised while sealing, persisting, or opening a session record.
///
/// Only [`CryptoVault::try_store`](super::CryptoVault::try_store) hands these
/// to callers; reads normalise every variant to "no record".
#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("ciphertext encoding error: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed")]
    Decryption,
    #[error("ciphertext too short to hold a nonce")]
    MalformedCiphertext,
    #[error("unsupported record version {0}")]
    UnsupportedVersion(u16),
    #[error("record expired")]
    Expired,
    #[error("checksum mismatch")]
    ChecksumMismatch,
}
