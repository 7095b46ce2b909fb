//! Wizard Session Cache - client-resident autosave for multi-step form wizards
//!
//! Core modules:
//! - `persistence`: Encrypted, integrity-checked, expiring per-step records
//! - `progress`: Unencrypted step-completion map
//! - `scheduler`: Debounce timer (a single cancellable deferred task)
//! - `autosave`: Per-step controller tying edits to the vault and progress
//! - `recovery`: Restore-or-start-fresh decision at step mount
//! - `session`: One mounted step bound to host timers and callbacks
//! - `platform`: Browser/native storage and clock abstraction
//! - `config`: Tunables (TTL, debounce window, storage keys)

pub mod autosave;
pub mod config;
pub mod persistence;
pub mod platform;
pub mod progress;
pub mod recovery;
pub mod scheduler;
pub mod session;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use autosave::{AutosavePersistence, FormSnapshot, SaveIndicator, SaveStatus};
pub use config::CacheConfig;
pub use persistence::{CryptoVault, SessionRecord, SnapshotCipher, VaultError};
pub use progress::{ProgressState, ProgressTracker, StepProgress};
pub use recovery::{RecoveryError, RecoveryState, Resolution, SessionRecoveryController};
pub use scheduler::{TimerHost, TimerId};
pub use session::StepSession;

/// Session cache defaults
pub mod consts {
    /// Snapshot lifetime (24 hours)
    pub const DEFAULT_TTL_MS: u64 = 24 * 60 * 60 * 1000;
    /// Quiet period before a burst of edits is persisted
    pub const DEBOUNCE_MS: u64 = 500;
    /// How long the "just saved" indicator stays visible
    pub const SAVED_DISPLAY_MS: u64 = 3_000;

    /// Storage keys
    pub const VAULT_KEY_PREFIX: &str = "wizard_session";
    pub const PROGRESS_KEY: &str = "wizard_progress";
}
