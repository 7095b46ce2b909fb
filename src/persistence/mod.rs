//! Encrypted save/load persistence with integrity verification
//!
//! Features:
//! - Versioned JSON envelope per wizard step
//! - ChaCha20-Poly1305 encryption at rest
//! - BLAKE3 integrity digest over the ciphertext
//! - Time-to-live expiry
//! - Corruption detection and self-healing (bad records are deleted on read)

pub mod cipher;
pub mod envelope;
pub mod error;
pub mod vault;

pub use cipher::SnapshotCipher;
pub use envelope::SessionRecord;
pub use error::VaultError;
pub use vault::CryptoVault;
