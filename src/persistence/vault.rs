//! Encrypted, integrity-checked, expiring record store
//!
//! One vault addresses one storage slot. Each wizard step gets its own slot
//! (`<prefix>:<step id>`), so saving one step never clobbers another.
//!
//! Reads are self-healing: an expired, tampered or undecodable record is
//! deleted and reported as absent. Nothing here panics or surfaces raw decode
//! errors to the caller.

use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{SessionRecord, SnapshotCipher, VaultError};
use crate::config::CacheConfig;
use crate::consts;
use crate::platform::time::Timestamp;
use crate::platform::{Clock, KeyValueStorage};

/// Handle to one encrypted slot
///
/// Cloning is cheap: clones share the same storage medium and clock.
#[derive(Clone)]
pub struct CryptoVault {
    storage: Rc<dyn KeyValueStorage>,
    clock: Rc<dyn Clock>,
    cipher: SnapshotCipher,
    slot: String,
    default_ttl: Duration,
}

impl std::fmt::Debug for CryptoVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoVault")
            .field("slot", &self.slot)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl CryptoVault {
    /// Vault over an explicit slot key, using the application key and 24h TTL
    pub fn new(
        storage: Rc<dyn KeyValueStorage>,
        clock: Rc<dyn Clock>,
        slot: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            clock,
            cipher: SnapshotCipher::default(),
            slot: slot.into(),
            default_ttl: Duration::from_millis(consts::DEFAULT_TTL_MS),
        }
    }

    /// Vault for one wizard step's slot
    pub fn for_step(
        storage: Rc<dyn KeyValueStorage>,
        clock: Rc<dyn Clock>,
        config: &CacheConfig,
        step_id: &str,
    ) -> Self {
        Self::new(storage, clock, config.vault_key(step_id)).with_default_ttl(config.ttl())
    }

    pub fn with_cipher(mut self, cipher: SnapshotCipher) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Storage key this vault owns
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Store with the default TTL; failures are logged and swallowed
    pub fn store<T: Serialize + ?Sized>(&self, payload: &T) {
        self.store_with_ttl(payload, self.default_ttl);
    }

    /// Store with an explicit TTL; failures are logged and swallowed
    ///
    /// On failure the previously stored record is left as it was.
    pub fn store_with_ttl<T: Serialize + ?Sized>(&self, payload: &T, ttl: Duration) {
        if let Err(err) = self.try_store(payload, ttl) {
            log::warn!("Session save to {} failed: {err}", self.slot);
        }
    }

    /// Seal and persist `payload`, overwriting any prior record
    pub fn try_store<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        ttl: Duration,
    ) -> Result<(), VaultError> {
        let plaintext = serde_json::to_vec(payload)?;
        let sealed = self.cipher.seal(&plaintext)?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let record = SessionRecord::new(&sealed, self.clock.now_ms(), ttl_ms);
        let json = serde_json::to_string(&record)?;
        self.storage.set(&self.slot, &json)?;
        log::info!("Session saved to {} ({} bytes)", self.slot, json.len());
        Ok(())
    }

    /// Fetch and decrypt the stored payload, if present and valid
    ///
    /// Any invalid record is deleted before returning `None`.
    pub fn retrieve<T: DeserializeOwned>(&self) -> Option<T> {
        let record = match self.read_record() {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(VaultError::Storage(err)) => {
                log::warn!("Session slot {} unreadable: {err}", self.slot);
                return None;
            }
            Err(err) => {
                self.discard(&err);
                return None;
            }
        };

        match self.open_record(&record) {
            Ok(payload) => {
                log::info!("Session restored from {}", self.slot);
                Some(payload)
            }
            Err(err) => {
                self.discard(&err);
                None
            }
        }
    }

    /// Delete the record unconditionally
    pub fn clear(&self) {
        match self.storage.remove(&self.slot) {
            Ok(()) => log::info!("Session slot {} cleared", self.slot),
            Err(err) => log::warn!("Failed to clear session slot {}: {err}", self.slot),
        }
    }

    /// True iff a record exists and passes the expiry and checksum checks.
    /// Never mutates storage.
    pub fn has_valid_record(&self) -> bool {
        self.valid_record().is_some()
    }

    /// When the current record expires, if there is a valid one
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.valid_record().map(|record| record.expires_at())
    }

    /// Time left on the current record; zero if absent or expired
    pub fn remaining(&self) -> Duration {
        let now = self.clock.now_ms();
        self.valid_record()
            .map(|record| Duration::from_millis(record.remaining_ms(now)))
            .unwrap_or(Duration::ZERO)
    }

    fn valid_record(&self) -> Option<SessionRecord> {
        let record = self.read_record().ok()??;
        record.validate(self.clock.now_ms()).ok()?;
        Some(record)
    }

    fn read_record(&self) -> Result<Option<SessionRecord>, VaultError> {
        match self.storage.get(&self.slot)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn open_record<T: DeserializeOwned>(&self, record: &SessionRecord) -> Result<T, VaultError> {
        let sealed = record.validate(self.clock.now_ms())?;
        let plaintext = self.cipher.open(&sealed)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn discard(&self, reason: &VaultError) {
        match reason {
            VaultError::Expired => log::info!("Session in {} expired, discarding", self.slot),
            VaultError::ChecksumMismatch => log::warn!(
                "Session in {} failed integrity check (corrupted or tampered), discarding",
                self.slot
            ),
            other => log::warn!("Session in {} undecodable ({other}), discarding", self.slot),
        }
        if let Err(err) = self.storage.remove(&self.slot) {
            log::warn!("Failed to delete invalid session {}: {err}", self.slot);
        }
    }
}
