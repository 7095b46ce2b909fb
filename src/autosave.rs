//! Per-step autosave controller
//!
//! Owns the in-memory snapshot of one mounted wizard step. Edits arm a
//! debounce timer; when it fires the latest snapshot is sealed into the
//! step's vault slot and the step is marked complete in the progress map.
//!
//! Persistence failures never lose in-memory edits: they only flip the status
//! to [`SaveStatus::Error`], and the next edit or manual save tries again.

use std::rc::Rc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::config::CacheConfig;
use crate::persistence::CryptoVault;
use crate::platform::time::Timestamp;
use crate::platform::{Clock, KeyValueStorage};
use crate::progress::ProgressTracker;
use crate::scheduler::Debouncer;

/// Field values of one wizard step
pub type FormSnapshot = Map<String, Value>;

/// Outcome of the most recent persist attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved {
        at: Timestamp,
    },
    Error,
}

/// What the UI should show for a [`SaveStatus`] at a given moment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveIndicator {
    Hidden,
    Saving,
    /// Prominent confirmation, shown for the saved-display window
    JustSaved,
    /// Quiet "saved" state after the window has passed
    Saved,
    Failed,
}

impl SaveIndicator {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveIndicator::Hidden => "hidden",
            SaveIndicator::Saving => "saving",
            SaveIndicator::JustSaved => "just-saved",
            SaveIndicator::Saved => "saved",
            SaveIndicator::Failed => "failed",
        }
    }
}

impl SaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveStatus::Idle => "idle",
            SaveStatus::Saving => "saving",
            SaveStatus::Saved { .. } => "saved",
            SaveStatus::Error => "error",
        }
    }

    pub fn indicator(&self, now: Timestamp, display_ms: u64) -> SaveIndicator {
        match *self {
            SaveStatus::Idle => SaveIndicator::Hidden,
            SaveStatus::Saving => SaveIndicator::Saving,
            SaveStatus::Saved { at } if now.saturating_sub(at) < display_ms => {
                SaveIndicator::JustSaved
            }
            SaveStatus::Saved { .. } => SaveIndicator::Saved,
            SaveStatus::Error => SaveIndicator::Failed,
        }
    }
}

type SaveCallback = Box<dyn FnMut(&FormSnapshot)>;

pub struct AutosavePersistence {
    step_id: String,
    vault: CryptoVault,
    progress: ProgressTracker,
    clock: Rc<dyn Clock>,
    debouncer: Debouncer,
    ttl: Duration,
    saved_display_ms: u64,
    snapshot: Option<FormSnapshot>,
    status: SaveStatus,
    on_save: Option<SaveCallback>,
}

impl AutosavePersistence {
    pub fn new(
        step_id: impl Into<String>,
        storage: Rc<dyn KeyValueStorage>,
        clock: Rc<dyn Clock>,
        config: &CacheConfig,
    ) -> Self {
        let step_id = step_id.into();
        let vault = CryptoVault::for_step(storage.clone(), clock.clone(), config, &step_id);
        let progress = ProgressTracker::from_config(storage, clock.clone(), config);
        Self::with_parts(step_id, vault, progress, clock, config)
    }

    /// Build from an existing vault and tracker (e.g. with a custom cipher)
    pub fn with_parts(
        step_id: impl Into<String>,
        vault: CryptoVault,
        progress: ProgressTracker,
        clock: Rc<dyn Clock>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            vault,
            progress,
            clock,
            debouncer: Debouncer::new(config.debounce()),
            ttl: config.ttl(),
            saved_display_ms: config.saved_display_ms,
            snapshot: None,
            status: SaveStatus::Idle,
            on_save: None,
        }
    }

    /// Called with the snapshot after every successful persist
    pub fn with_on_save(mut self, on_save: impl FnMut(&FormSnapshot) + 'static) -> Self {
        self.on_save = Some(Box::new(on_save));
        self
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn vault(&self) -> &CryptoVault {
        &self.vault
    }

    pub fn snapshot(&self) -> Option<&FormSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn status(&self) -> SaveStatus {
        self.status
    }

    pub fn indicator(&self) -> SaveIndicator {
        self.status.indicator(self.clock.now_ms(), self.saved_display_ms)
    }

    /// Replace the in-memory snapshot and restart the quiet period
    pub fn update_snapshot(&mut self, data: FormSnapshot) {
        self.snapshot = Some(data);
        let deadline = self.debouncer.arm(self.clock.now_ms());
        log::debug!("Autosave for {} armed until {deadline}", self.step_id);
    }

    /// When the pending save is due, if one is pending
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.debouncer.deadline()
    }

    pub fn has_pending_save(&self) -> bool {
        self.debouncer.is_armed()
    }

    /// Drive the debounce timer; persists and returns true if it was due
    pub fn poll(&mut self) -> bool {
        if !self.debouncer.fire(self.clock.now_ms()) {
            return false;
        }
        self.persist();
        true
    }

    /// Persist the current snapshot now, cancelling any pending debounced save
    pub fn manual_save(&mut self) -> bool {
        self.debouncer.cancel();
        if self.snapshot.is_none() {
            return false;
        }
        self.persist();
        true
    }

    /// Restore the step's saved snapshot, handing it to `on_restore`
    ///
    /// The restored snapshot also becomes the in-memory snapshot.
    pub fn load_snapshot(&mut self, on_restore: impl FnOnce(&FormSnapshot)) -> Option<FormSnapshot> {
        let snapshot: FormSnapshot = self.vault.retrieve()?;
        on_restore(&snapshot);
        self.adopt_snapshot(snapshot.clone());
        Some(snapshot)
    }

    /// Take a snapshot restored elsewhere as the in-memory snapshot.
    /// Does not schedule a save.
    pub fn adopt_snapshot(&mut self, data: FormSnapshot) {
        self.snapshot = Some(data);
    }

    /// Drop this step's saved data and reset to a pristine state
    pub fn clear(&mut self) {
        self.debouncer.cancel();
        self.vault.clear();
        self.progress.mark_complete(&self.step_id, false, None);
        self.snapshot = None;
        self.status = SaveStatus::Idle;
    }

    fn persist(&mut self) {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return;
        };
        self.status = SaveStatus::Saving;

        match self.vault.try_store(snapshot, self.ttl) {
            Ok(()) => {
                // Field values stay in the vault; progress only records completion
                self.progress.mark_complete(&self.step_id, true, None);
                self.status = SaveStatus::Saved {
                    at: self.clock.now_ms(),
                };
                if let Some(on_save) = self.on_save.as_mut() {
                    on_save(snapshot);
                }
            }
            Err(err) => {
                log::warn!("Autosave for {} failed: {err}", self.step_id);
                self.status = SaveStatus::Error;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ManualClock, MemoryStorage};
    use serde_json::json;
    use std::cell::RefCell;

    struct Harness {
        storage: Rc<MemoryStorage>,
        clock: Rc<ManualClock>,
        config: CacheConfig,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                storage: Rc::new(MemoryStorage::new()),
                clock: Rc::new(ManualClock::new(1_000_000)),
                config: CacheConfig::default(),
            }
        }

        fn autosave(&self, step_id: &str) -> AutosavePersistence {
            AutosavePersistence::new(
                step_id,
                self.storage.clone(),
                self.clock.clone(),
                &self.config,
            )
        }

        fn tracker(&self) -> ProgressTracker {
            ProgressTracker::new(self.storage.clone(), self.clock.clone())
        }

        fn vault_writes(&self, step_id: &str) -> usize {
            self.storage.writes_to(&self.config.vault_key(step_id))
        }
    }

    fn snapshot(value: Value) -> FormSnapshot {
        match value {
            Value::Object(map) => map,
            _ => panic!("snapshot must be an object"),
        }
    }

    #[test]
    fn test_debounce_coalesces_burst() {
        let h = Harness::new();
        let mut autosave = h.autosave("contact");

        for i in 1..=10 {
            autosave.update_snapshot(snapshot(json!({"keystrokes": i})));
            h.clock.advance(40);
            assert!(!autosave.poll());
        }
        assert_eq!(h.vault_writes("contact"), 0);

        h.clock.advance(500);
        assert!(autosave.poll());
        assert!(!autosave.poll());
        assert_eq!(h.vault_writes("contact"), 1);

        let stored: FormSnapshot = autosave.vault().retrieve().unwrap();
        assert_eq!(stored, snapshot(json!({"keystrokes": 10})));
    }

    #[test]
    fn test_poll_before_window_does_nothing() {
        let h = Harness::new();
        let mut autosave = h.autosave("contact");
        autosave.update_snapshot(snapshot(json!({"a": 1})));
        h.clock.advance(499);
        assert!(!autosave.poll());
        assert_eq!(autosave.status(), SaveStatus::Idle);
        assert_eq!(autosave.next_deadline(), Some(1_000_500));
        h.clock.advance(1);
        assert!(autosave.poll());
        assert!(matches!(autosave.status(), SaveStatus::Saved { .. }));
    }

    #[test]
    fn test_manual_save_bypasses_debounce() {
        let h = Harness::new();
        let mut autosave = h.autosave("contact");
        autosave.update_snapshot(snapshot(json!({"email": "a@b.c"})));
        assert!(autosave.manual_save());
        assert_eq!(h.vault_writes("contact"), 1);
        assert!(!autosave.has_pending_save());

        h.clock.advance(10_000);
        assert!(!autosave.poll());
        assert_eq!(h.vault_writes("contact"), 1);

        let stored: FormSnapshot = autosave.vault().retrieve().unwrap();
        assert_eq!(Some(&stored), autosave.snapshot());
    }

    #[test]
    fn test_manual_save_without_snapshot_is_noop() {
        let h = Harness::new();
        let mut autosave = h.autosave("contact");
        assert!(!autosave.manual_save());
        assert_eq!(h.storage.write_count(), 0);
        assert_eq!(autosave.status(), SaveStatus::Idle);
    }

    #[test]
    fn test_save_marks_progress() {
        let h = Harness::new();
        let tracker = h.tracker();
        tracker.initialize(&["contact", "payment"], &[]);

        let mut autosave = h.autosave("contact");
        autosave.update_snapshot(snapshot(json!({"name": "Ada"})));
        autosave.manual_save();

        assert!(tracker.is_step_complete("contact"));
        assert_eq!(tracker.current_step_index(), 1);
        // Field values never reach the unencrypted channel
        let raw = h.storage.get(&h.config.progress_key).unwrap().unwrap();
        assert!(!raw.contains("Ada"));
    }

    #[test]
    fn test_write_failure_sets_error_and_recovers() {
        let h = Harness::new();
        let mut autosave = h.autosave("contact");

        h.storage.set_fail_writes(true);
        autosave.update_snapshot(snapshot(json!({"v": 1})));
        h.clock.advance(500);
        assert!(autosave.poll());
        assert_eq!(autosave.status(), SaveStatus::Error);
        assert_eq!(autosave.indicator(), SaveIndicator::Failed);
        // In-memory edits survive
        assert_eq!(autosave.snapshot(), Some(&snapshot(json!({"v": 1}))));

        h.storage.set_fail_writes(false);
        autosave.update_snapshot(snapshot(json!({"v": 2})));
        h.clock.advance(500);
        assert!(autosave.poll());
        assert!(matches!(autosave.status(), SaveStatus::Saved { .. }));
        let stored: FormSnapshot = autosave.vault().retrieve().unwrap();
        assert_eq!(stored, snapshot(json!({"v": 2})));
    }

    #[test]
    fn test_indicator_decays() {
        let h = Harness::new();
        let mut autosave = h.autosave("contact");
        assert_eq!(autosave.indicator(), SaveIndicator::Hidden);

        autosave.update_snapshot(snapshot(json!({"a": 1})));
        autosave.manual_save();
        assert_eq!(autosave.indicator(), SaveIndicator::JustSaved);
        h.clock.advance(2_999);
        assert_eq!(autosave.indicator(), SaveIndicator::JustSaved);
        h.clock.advance(1);
        assert_eq!(autosave.indicator(), SaveIndicator::Saved);
        // Decay is display-only
        assert!(matches!(autosave.status(), SaveStatus::Saved { .. }));
        assert!(autosave.vault().has_valid_record());
    }

    #[test]
    fn test_on_save_callback() {
        let h = Harness::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut autosave = h
            .autosave("contact")
            .with_on_save(move |s| sink.borrow_mut().push(s.clone()));

        autosave.update_snapshot(snapshot(json!({"a": 1})));
        autosave.manual_save();
        h.storage.set_fail_writes(true);
        autosave.manual_save();

        assert_eq!(*seen.borrow(), vec![snapshot(json!({"a": 1}))]);
    }

    #[test]
    fn test_load_snapshot_invokes_restore() {
        let h = Harness::new();
        let mut first = h.autosave("contact");
        first.update_snapshot(snapshot(json!({"city": "Berlin"})));
        first.manual_save();

        // Browser closed and reopened
        let mut second = h.autosave("contact");
        let mut restored = None;
        let loaded = second.load_snapshot(|s| restored = Some(s.clone()));
        assert_eq!(loaded, Some(snapshot(json!({"city": "Berlin"}))));
        assert_eq!(restored, loaded);
        assert_eq!(second.snapshot(), loaded.as_ref());
    }

    #[test]
    fn test_adopted_snapshot_is_saved_manually_only() {
        let h = Harness::new();
        let mut autosave = h.autosave("contact");
        autosave.adopt_snapshot(snapshot(json!({"city": "Paris"})));
        assert!(!autosave.has_pending_save());

        assert!(autosave.manual_save());
        let stored: FormSnapshot = autosave.vault().retrieve().unwrap();
        assert_eq!(stored, snapshot(json!({"city": "Paris"})));
    }

    #[test]
    fn test_load_snapshot_absent_skips_restore() {
        let h = Harness::new();
        let mut autosave = h.autosave("contact");
        let mut called = false;
        assert!(autosave.load_snapshot(|_| called = true).is_none());
        assert!(!called);
    }

    #[test]
    fn test_load_snapshot_after_expiry() {
        let mut h = Harness::new();
        h.config.ttl_ms = 1_000;
        let mut autosave = h.autosave("contact");
        autosave.update_snapshot(snapshot(json!({"a": 1})));
        autosave.manual_save();
        h.clock.advance(1_001);
        assert!(autosave.load_snapshot(|_| {}).is_none());
    }

    #[test]
    fn test_clear_isolates_steps() {
        let h = Harness::new();
        let tracker = h.tracker();
        tracker.initialize(&["contact", "payment"], &[]);

        let mut contact = h.autosave("contact");
        let mut payment = h.autosave("payment");
        contact.update_snapshot(snapshot(json!({"name": "Ada"})));
        contact.manual_save();
        payment.update_snapshot(snapshot(json!({"iban": "DE00"})));
        payment.manual_save();

        contact.update_snapshot(snapshot(json!({"name": "Ada L."})));
        contact.clear();

        assert_eq!(contact.status(), SaveStatus::Idle);
        assert!(contact.snapshot().is_none());
        assert!(!contact.has_pending_save());
        assert!(!contact.vault().has_valid_record());
        assert!(!tracker.is_step_complete("contact"));

        assert!(payment.vault().has_valid_record());
        assert!(tracker.is_step_complete("payment"));
    }

    #[test]
    fn test_steps_do_not_overwrite_each_other() {
        let h = Harness::new();
        let mut contact = h.autosave("contact");
        let mut payment = h.autosave("payment");
        contact.update_snapshot(snapshot(json!({"step": 1})));
        contact.manual_save();
        payment.update_snapshot(snapshot(json!({"step": 2})));
        payment.manual_save();

        let stored: FormSnapshot = contact.vault().retrieve().unwrap();
        assert_eq!(stored, snapshot(json!({"step": 1})));
    }
}
