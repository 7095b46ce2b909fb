//! Symmetric envelope for snapshot payloads

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};

use super::VaultError;

/// Nonce length for ChaCha20-Poly1305
pub const NONCE_LEN: usize = 12;

/// Application key baked into the client.
///
/// Anyone holding the client code can read it back: this keeps storage dumps
/// from showing plaintext, it is not a security boundary. Supply a
/// server-issued or user-derived key through [`SnapshotCipher::new`] when real
/// confidentiality is required.
pub const APPLICATION_KEY: [u8; 32] = *b"wizard-session-cache/obfuscation";

/// ChaCha20-Poly1305 cipher producing `nonce || ciphertext || tag`
#[derive(Clone)]
pub struct SnapshotCipher {
    key: [u8; 32],
}

impl Default for SnapshotCipher {
    fn default() -> Self {
        Self::new(APPLICATION_KEY)
    }
}

impl std::fmt::Debug for SnapshotCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCipher").finish_non_exhaustive()
    }
}

impl SnapshotCipher {
    pub const fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    fn aead(&self) -> Result<ChaCha20Poly1305, VaultError> {
        ChaCha20Poly1305::new_from_slice(&self.key).map_err(|_| VaultError::Encryption)
    }

    /// Encrypt under a fresh random nonce
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
        let nonce: [u8; NONCE_LEN] = rand::random();
        let body = self
            .aead()?
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| VaultError::Encryption)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + body.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&body);
        Ok(sealed)
    }

    /// Decrypt a buffer produced by [`seal`](Self::seal)
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, VaultError> {
        if sealed.len() < NONCE_LEN {
            return Err(VaultError::MalformedCiphertext);
        }
        let (nonce, body) = sealed.split_at(NONCE_LEN);
        self.aead()?
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| VaultError::Decryption)
    }
}
