//! Versioned session record envelope
//!
//! What actually lands in storage: base64 ciphertext, creation time, TTL and a
//! BLAKE3 digest of the ciphertext bytes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use super::VaultError;
use crate::platform::time::Timestamp;

/// Current envelope format version
pub const RECORD_VERSION: u16 = 1;

/// One persisted snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub version: u16,
    /// Base64 of `nonce || ciphertext || tag`
    pub ciphertext: String,
    /// Unix timestamp (ms) of the write
    pub created_at: Timestamp,
    pub ttl_ms: u64,
    /// BLAKE3 hex digest of the decoded ciphertext
    pub checksum: String,
}

impl SessionRecord {
    /// Wrap freshly sealed bytes, computing the checksum
    pub fn new(ciphertext: &[u8], created_at: Timestamp, ttl_ms: u64) -> Self {
        Self {
            version: RECORD_VERSION,
            ciphertext: BASE64.encode(ciphertext),
            created_at,
            ttl_ms,
            checksum: blake3::hash(ciphertext).to_hex().to_string(),
        }
    }

    pub fn expires_at(&self) -> Timestamp {
        self.created_at.saturating_add(self.ttl_ms)
    }

    /// A record is expired once strictly more than `ttl` has elapsed
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.saturating_sub(self.created_at) > self.ttl_ms
    }

    /// Milliseconds left before expiry (zero once expired)
    pub fn remaining_ms(&self, now: Timestamp) -> u64 {
        self.expires_at().saturating_sub(now)
    }

    /// Decode the ciphertext and verify it against the stored digest
    pub fn verified_ciphertext(&self) -> Result<Vec<u8>, VaultError> {
        let bytes = BASE64.decode(&self.ciphertext)?;
        let expected =
            blake3::Hash::from_hex(&self.checksum).map_err(|_| VaultError::ChecksumMismatch)?;
        // blake3::Hash equality is constant-time
        if blake3::hash(&bytes) != expected {
            return Err(VaultError::ChecksumMismatch);
        }
        Ok(bytes)
    }

    /// Full validity check: version, expiry, then integrity
    pub fn validate(&self, now: Timestamp) -> Result<Vec<u8>, VaultError> {
        if self.version != RECORD_VERSION {
            return Err(VaultError::UnsupportedVersion(self.version));
        }
        if self.is_expired(now) {
            return Err(VaultError::Expired);
        }
        self.verified_ciphertext()
    }
}
