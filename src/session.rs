//! Host-driven step session
//!
//! Binds one step's autosave and recovery controllers to a host event loop
//! ([`TimerHost`]) and host callbacks. Host callbacks may call straight back
//! into the session (refresh a badge, re-hydrate inputs that fire change
//! events), so a callback never runs while session state is borrowed. Only
//! one debounce timer is ever outstanding: re-arming cancels the previous
//! one, and a timer that fires early is rescheduled for the remaining time.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::autosave::{AutosavePersistence, FormSnapshot, SaveIndicator, SaveStatus};
use crate::config::CacheConfig;
use crate::platform::{Clock, KeyValueStorage};
use crate::recovery::{RecoveryError, RecoveryState, SessionRecoveryController};
use crate::scheduler::{TimerHost, TimerId};

/// Host callback receiving a snapshot
pub type SnapshotCallback = Rc<dyn Fn(&FormSnapshot)>;

struct Shared {
    autosave: RefCell<AutosavePersistence>,
    recovery: RefCell<SessionRecoveryController>,
    clock: Rc<dyn Clock>,
    timers: Rc<dyn TimerHost>,
    pending_timer: Cell<Option<TimerId>>,
    on_save: RefCell<Option<SnapshotCallback>>,
}

impl Shared {
    fn cancel_timer(&self) {
        if let Some(id) = self.pending_timer.take() {
            self.timers.cancel(id);
        }
    }

    /// Replace any outstanding timer with one for the current deadline
    fn rearm(self: &Rc<Self>) {
        self.cancel_timer();
        let Some(deadline) = self.autosave.borrow().next_deadline() else {
            return;
        };
        let delay = deadline.saturating_sub(self.clock.now_ms());
        let weak = Rc::downgrade(self);
        let id = self.timers.schedule(
            delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.tick();
                }
            }),
        );
        if id.is_none() {
            log::warn!("Could not schedule autosave timer");
        }
        self.pending_timer.set(id);
    }

    fn tick(self: &Rc<Self>) {
        self.pending_timer.set(None);
        let (saved, still_pending) = {
            let mut autosave = self.autosave.borrow_mut();
            let fired = autosave.poll();
            (
                fired.then(|| saved_snapshot(&autosave)).flatten(),
                autosave.has_pending_save(),
            )
        };
        if still_pending {
            // Fired before the deadline
            self.rearm();
        }
        if let Some(snapshot) = saved {
            self.notify_saved(&snapshot);
        }
    }

    fn notify_saved(&self, snapshot: &FormSnapshot) {
        let on_save = self.on_save.borrow().clone();
        if let Some(on_save) = on_save {
            on_save(snapshot);
        }
    }
}

/// Snapshot just written, if the last persist succeeded
fn saved_snapshot(autosave: &AutosavePersistence) -> Option<FormSnapshot> {
    match autosave.status() {
        SaveStatus::Saved { .. } => autosave.snapshot().cloned(),
        _ => None,
    }
}

/// One mounted wizard step, shared with a host
///
/// Cloning is cheap and yields a handle to the same step.
#[derive(Clone)]
pub struct StepSession {
    shared: Rc<Shared>,
}

impl StepSession {
    pub fn new(
        step_id: &str,
        storage: Rc<dyn KeyValueStorage>,
        clock: Rc<dyn Clock>,
        timers: Rc<dyn TimerHost>,
        config: &CacheConfig,
    ) -> Self {
        let autosave = AutosavePersistence::new(step_id, storage.clone(), clock.clone(), config);
        let recovery =
            SessionRecoveryController::for_step(storage, clock.clone(), config, step_id);
        Self {
            shared: Rc::new(Shared {
                autosave: RefCell::new(autosave),
                recovery: RefCell::new(recovery),
                clock,
                timers,
                pending_timer: Cell::new(None),
                on_save: RefCell::new(None),
            }),
        }
    }

    /// Called with the snapshot after every successful save
    pub fn set_on_save(&self, on_save: SnapshotCallback) {
        *self.shared.on_save.borrow_mut() = Some(on_save);
    }

    pub fn update_snapshot(&self, data: FormSnapshot) {
        self.shared.autosave.borrow_mut().update_snapshot(data);
        self.shared.rearm();
    }

    pub fn manual_save(&self) -> bool {
        self.shared.cancel_timer();
        let (persisted, saved) = {
            let mut autosave = self.shared.autosave.borrow_mut();
            let persisted = autosave.manual_save();
            (persisted, saved_snapshot(&autosave))
        };
        if let (true, Some(snapshot)) = (persisted, saved) {
            self.shared.notify_saved(&snapshot);
        }
        persisted
    }

    pub fn load_snapshot(&self, on_restore: impl FnOnce(&FormSnapshot)) -> Option<FormSnapshot> {
        let snapshot = self.shared.autosave.borrow_mut().load_snapshot(|_| {})?;
        on_restore(&snapshot);
        Some(snapshot)
    }

    pub fn clear(&self) {
        self.shared.cancel_timer();
        self.shared.autosave.borrow_mut().clear();
    }

    pub fn status(&self) -> SaveStatus {
        self.shared.autosave.borrow().status()
    }

    pub fn indicator(&self) -> SaveIndicator {
        self.shared.autosave.borrow().indicator()
    }

    pub fn snapshot(&self) -> Option<FormSnapshot> {
        self.shared.autosave.borrow().snapshot().cloned()
    }

    pub fn has_pending_save(&self) -> bool {
        self.shared.autosave.borrow().has_pending_save()
    }

    pub fn recovery_state(&self) -> RecoveryState {
        self.shared.recovery.borrow().state()
    }

    pub fn needs_recovery_decision(&self) -> bool {
        self.shared.recovery.borrow().needs_decision()
    }

    pub fn remaining(&self) -> Duration {
        self.shared.recovery.borrow().remaining()
    }

    /// Restore the saved snapshot; it also becomes the autosave snapshot
    pub fn choose_restore(
        &self,
        on_restore: impl FnOnce(&FormSnapshot),
    ) -> Result<Option<FormSnapshot>, RecoveryError> {
        let restored = self.shared.recovery.borrow_mut().choose_restore(|_| {})?;
        if let Some(snapshot) = &restored {
            self.shared
                .autosave
                .borrow_mut()
                .adopt_snapshot(snapshot.clone());
            on_restore(snapshot);
        }
        Ok(restored)
    }

    /// Discard saved data and progress, and reset the mounted step
    pub fn choose_start_fresh(&self, on_start_fresh: impl FnOnce()) -> Result<(), RecoveryError> {
        self.shared
            .recovery
            .borrow_mut()
            .choose_start_fresh(|| {})?;
        self.clear();
        on_start_fresh();
        Ok(())
    }

    pub fn dismiss(&self) -> Result<(), RecoveryError> {
        self.shared.recovery.borrow_mut().dismiss()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ManualClock, MemoryStorage};
    use crate::recovery::Resolution;
    use serde_json::{Value, json};
    use std::cell::OnceCell;

    type Task = (TimerId, u64, Box<dyn FnOnce()>);

    /// Timer host that only runs tasks when told to
    #[derive(Default)]
    struct ManualTimers {
        next_id: Cell<TimerId>,
        tasks: RefCell<Vec<Task>>,
    }

    impl ManualTimers {
        fn pending(&self) -> usize {
            self.tasks.borrow().len()
        }

        fn last_delay(&self) -> Option<u64> {
            self.tasks.borrow().last().map(|(_, delay, _)| *delay)
        }

        fn run_all(&self) {
            let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
            for (_, _, task) in tasks {
                task();
            }
        }
    }

    impl TimerHost for ManualTimers {
        fn schedule(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> Option<TimerId> {
            let id = self.next_id.get() + 1;
            self.next_id.set(id);
            self.tasks.borrow_mut().push((id, delay_ms, task));
            Some(id)
        }

        fn cancel(&self, id: TimerId) {
            self.tasks.borrow_mut().retain(|(task_id, _, _)| *task_id != id);
        }
    }

    struct Host {
        storage: Rc<MemoryStorage>,
        clock: Rc<ManualClock>,
        timers: Rc<ManualTimers>,
        config: CacheConfig,
    }

    impl Host {
        fn new() -> Self {
            Self {
                storage: Rc::new(MemoryStorage::new()),
                clock: Rc::new(ManualClock::new(10_000)),
                timers: Rc::new(ManualTimers::default()),
                config: CacheConfig::default(),
            }
        }

        fn mount(&self, step_id: &str) -> StepSession {
            StepSession::new(
                step_id,
                self.storage.clone(),
                self.clock.clone(),
                self.timers.clone(),
                &self.config,
            )
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

    /// Save once in a previous visit, then mount a fresh session
    fn remount_with_saved(host: &Host, data: Value) -> StepSession {
        let earlier = host.mount("contact");
        earlier.update_snapshot(snapshot(data));
        earlier.manual_save();
        host.mount("contact")
    }

    #[test]
    fn test_on_save_can_read_status() {
        let host = Host::new();
        let session = host.mount("contact");
        let seen = Rc::new(RefCell::new(Vec::new()));

        let handle = session.clone();
        let sink = seen.clone();
        session.set_on_save(Rc::new(move |_: &FormSnapshot| {
            sink.borrow_mut().push((handle.status(), handle.indicator()));
        }));

        session.update_snapshot(snapshot(json!({"a": 1})));
        assert!(session.manual_save());
        assert_eq!(seen.borrow().len(), 1);
        assert!(matches!(seen.borrow()[0].0, SaveStatus::Saved { .. }));
        assert_eq!(seen.borrow()[0].1, SaveIndicator::JustSaved);
    }

    #[test]
    fn test_on_save_from_timer_can_edit_again() {
        let host = Host::new();
        let session = host.mount("contact");
        let handle = session.clone();
        let saves = Rc::new(Cell::new(0));
        let count = saves.clone();
        session.set_on_save(Rc::new(move |_: &FormSnapshot| {
            count.set(count.get() + 1);
            if count.get() == 1 {
                handle.update_snapshot(snapshot(json!({"touched": true})));
            }
        }));

        session.update_snapshot(snapshot(json!({"a": 1})));
        host.clock.advance(500);
        host.timers.run_all();
        assert_eq!(saves.get(), 1);
        assert!(session.has_pending_save());
        assert_eq!(host.timers.pending(), 1);

        host.clock.advance(500);
        host.timers.run_all();
        assert_eq!(saves.get(), 2);
        assert_eq!(host.vault_writes("contact"), 2);
    }

    #[test]
    fn test_failed_save_skips_on_save() {
        let host = Host::new();
        let session = host.mount("contact");
        let called = Rc::new(Cell::new(false));
        let flag = called.clone();
        session.set_on_save(Rc::new(move |_: &FormSnapshot| flag.set(true)));

        host.storage.set_fail_writes(true);
        session.update_snapshot(snapshot(json!({"a": 1})));
        assert!(session.manual_save());
        assert_eq!(session.status(), SaveStatus::Error);
        assert!(!called.get());
    }

    #[test]
    fn test_restore_callback_can_update_snapshot() {
        let host = Host::new();
        let session = remount_with_saved(&host, json!({"city": "Berlin"}));

        let handle = session.clone();
        let loaded = session.load_snapshot(|s| {
            // Re-hydrating an input fires its change handler
            handle.update_snapshot(s.clone());
        });
        assert_eq!(loaded, Some(snapshot(json!({"city": "Berlin"}))));
        assert!(session.has_pending_save());
        assert_eq!(host.timers.pending(), 1);
    }

    #[test]
    fn test_single_timer_per_burst() {
        let host = Host::new();
        let session = host.mount("contact");
        for i in 0..10 {
            session.update_snapshot(snapshot(json!({"keystrokes": i})));
            host.clock.advance(30);
        }
        assert_eq!(host.timers.pending(), 1);

        host.clock.advance(500);
        host.timers.run_all();
        assert_eq!(host.vault_writes("contact"), 1);
        assert_eq!(host.timers.pending(), 0);
        assert_eq!(
            session.snapshot(),
            Some(snapshot(json!({"keystrokes": 9})))
        );
    }

    #[test]
    fn test_early_timer_reschedules() {
        let host = Host::new();
        let session = host.mount("contact");
        session.update_snapshot(snapshot(json!({"a": 1})));

        // Host timer fires 1ms before the clock reaches the deadline
        host.clock.advance(499);
        host.timers.run_all();
        assert_eq!(host.vault_writes("contact"), 0);
        assert_eq!(host.timers.pending(), 1);
        assert_eq!(host.timers.last_delay(), Some(1));

        host.clock.advance(1);
        host.timers.run_all();
        assert_eq!(host.vault_writes("contact"), 1);
        assert!(!session.has_pending_save());
    }

    #[test]
    fn test_manual_save_cancels_timer() {
        let host = Host::new();
        let session = host.mount("contact");
        session.update_snapshot(snapshot(json!({"a": 1})));
        session.manual_save();
        assert_eq!(host.timers.pending(), 0);
        assert_eq!(host.vault_writes("contact"), 1);
    }

    #[test]
    fn test_choose_restore_feeds_autosave() {
        let host = Host::new();
        let session = remount_with_saved(&host, json!({"name": "Ada"}));
        assert!(session.needs_recovery_decision());

        let handle = session.clone();
        let mut status_during_restore = None;
        let restored = session
            .choose_restore(|_| status_during_restore = Some(handle.recovery_state()))
            .unwrap();
        assert_eq!(restored, Some(snapshot(json!({"name": "Ada"}))));
        assert_eq!(
            status_during_restore,
            Some(RecoveryState::Resolved(Resolution::Restored))
        );
        assert_eq!(session.snapshot(), restored);

        let writes = host.vault_writes("contact");
        assert!(session.manual_save());
        assert_eq!(host.vault_writes("contact"), writes + 1);
    }

    #[test]
    fn test_start_fresh_resets_step() {
        let host = Host::new();
        let session = remount_with_saved(&host, json!({"name": "Ada"}));
        session.update_snapshot(snapshot(json!({"name": "Ada L."})));

        let handle = session.clone();
        let pending_in_callback = OnceCell::new();
        session
            .choose_start_fresh(|| {
                let _ = pending_in_callback.set(handle.has_pending_save());
            })
            .unwrap();

        assert_eq!(pending_in_callback.get(), Some(&false));
        assert_eq!(host.timers.pending(), 0);
        assert!(session.snapshot().is_none());
        assert!(!host.mount("contact").needs_recovery_decision());
    }

    #[test]
    fn test_dismiss_then_choose_rejected() {
        let host = Host::new();
        let session = remount_with_saved(&host, json!({"name": "Ada"}));
        session.dismiss().unwrap();
        assert!(session.choose_restore(|_| {}).is_err());
        assert!(host.mount("contact").needs_recovery_decision());
    }
}
