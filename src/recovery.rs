//! Restore-or-start-fresh decision at step mount
//!
//! ```text
//! NoDecisionNeeded                      (no valid record at mount)
//! AwaitingUserChoice ──restore──────▶ Resolved(Restored)
//!                    ──start fresh──▶ Resolved(StartedFresh)
//!                    ──dismiss──────▶ Resolved(Dismissed)
//! ```
//!
//! Choices are only accepted while awaiting one; anything else is an error
//! rather than a silent no-op.

use std::rc::Rc;
use std::time::Duration;

use thiserror::Error;

use crate::autosave::FormSnapshot;
use crate::config::CacheConfig;
use crate::persistence::CryptoVault;
use crate::platform::{Clock, KeyValueStorage};
use crate::progress::ProgressTracker;

/// How a pending decision was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Restored,
    StartedFresh,
    /// Dialog closed without a choice; the record is kept and re-offered on next mount
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    NoDecisionNeeded,
    AwaitingUserChoice,
    Resolved(Resolution),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("no recovery decision pending (state: {state:?})")]
    NoPendingDecision { state: RecoveryState },
}

pub struct SessionRecoveryController {
    vault: CryptoVault,
    progress: ProgressTracker,
    state: RecoveryState,
}

impl SessionRecoveryController {
    /// Inspect the vault once, at mount
    pub fn new(vault: CryptoVault, progress: ProgressTracker) -> Self {
        let state = if vault.has_valid_record() {
            log::info!("Saved session found in {}, awaiting user choice", vault.slot());
            RecoveryState::AwaitingUserChoice
        } else {
            RecoveryState::NoDecisionNeeded
        };
        Self {
            vault,
            progress,
            state,
        }
    }

    pub fn for_step(
        storage: Rc<dyn KeyValueStorage>,
        clock: Rc<dyn Clock>,
        config: &CacheConfig,
        step_id: &str,
    ) -> Self {
        let vault = CryptoVault::for_step(storage.clone(), clock.clone(), config, step_id);
        let progress = ProgressTracker::from_config(storage, clock, config);
        Self::new(vault, progress)
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Whether the UI should be showing the restore dialog
    pub fn needs_decision(&self) -> bool {
        self.state == RecoveryState::AwaitingUserChoice
    }

    /// Time left on the saved session, for the dialog copy
    pub fn remaining(&self) -> Duration {
        self.vault.remaining()
    }

    /// Restore the saved snapshot through `on_restore`; progress is untouched
    ///
    /// Returns `Ok(None)` if the record became invalid since mount (e.g. it
    /// expired while the dialog was open); `on_restore` is not called then.
    pub fn choose_restore(
        &mut self,
        on_restore: impl FnOnce(&FormSnapshot),
    ) -> Result<Option<FormSnapshot>, RecoveryError> {
        self.resolve(Resolution::Restored)?;
        let snapshot: Option<FormSnapshot> = self.vault.retrieve();
        match &snapshot {
            Some(snapshot) => on_restore(snapshot),
            None => log::warn!("Saved session in {} vanished before restore", self.vault.slot()),
        }
        Ok(snapshot)
    }

    /// Discard the saved snapshot and all wizard progress
    pub fn choose_start_fresh(&mut self, on_start_fresh: impl FnOnce()) -> Result<(), RecoveryError> {
        self.resolve(Resolution::StartedFresh)?;
        self.vault.clear();
        self.progress.clear();
        on_start_fresh();
        Ok(())
    }

    /// Close the dialog without touching any store
    pub fn dismiss(&mut self) -> Result<(), RecoveryError> {
        self.resolve(Resolution::Dismissed)
    }

    fn resolve(&mut self, resolution: Resolution) -> Result<(), RecoveryError> {
        if self.state != RecoveryState::AwaitingUserChoice {
            return Err(RecoveryError::NoPendingDecision { state: self.state });
        }
        log::info!("Session recovery for {} resolved: {resolution:?}", self.vault.slot());
        self.state = RecoveryState::Resolved(resolution);
        Ok(())
    }
}
