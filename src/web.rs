//! Browser bindings (WASM only)
//!
//! One `WizardStep` per mounted wizard step. Snapshots cross the boundary as
//! JSON strings; the debounce timer is driven by `window.setTimeout`. Every
//! method takes `&self`, so JS callbacks may call back into the step.

use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::autosave::FormSnapshot;
use crate::config::CacheConfig;
use crate::platform::{KeyValueStorage, LocalStorage, SystemClock};
use crate::scheduler::{TimerHost, TimerId};
use crate::session::StepSession;

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Info).is_err() {
        web_sys::console::warn_1(&"Logger already initialised".into());
    }
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn call_with_json(callback: &js_sys::Function, snapshot: &FormSnapshot) {
    match serde_json::to_string(snapshot) {
        Ok(json) => {
            if let Err(err) = callback.call1(&JsValue::NULL, &JsValue::from_str(&json)) {
                log::warn!("Snapshot callback threw: {err:?}");
            }
        }
        Err(err) => log::warn!("Could not encode snapshot for callback: {err}"),
    }
}

/// `window.setTimeout` / `clearTimeout`
struct WindowTimers;

impl TimerHost for WindowTimers {
    fn schedule(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> Option<TimerId> {
        let window = web_sys::window()?;
        let callback = Closure::once_into_js(move || task());
        let delay = i32::try_from(delay_ms).unwrap_or(i32::MAX);
        match window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), delay)
        {
            Ok(id) => Some(id),
            Err(err) => {
                log::warn!("setTimeout failed: {err:?}");
                None
            }
        }
    }

    fn cancel(&self, id: TimerId) {
        if let Some(window) = web_sys::window() {
            window.clear_timeout_with_handle(id);
        }
    }
}

#[wasm_bindgen]
pub struct WizardStep {
    session: StepSession,
}

#[wasm_bindgen]
impl WizardStep {
    /// Mount a step; `on_save` receives the JSON snapshot after each save
    #[wasm_bindgen(constructor)]
    pub fn new(step_id: &str, on_save: Option<js_sys::Function>) -> Result<WizardStep, JsValue> {
        let storage: Rc<dyn KeyValueStorage> = Rc::new(LocalStorage::open().map_err(js_error)?);
        let config = CacheConfig::load(storage.as_ref());
        let session = StepSession::new(
            step_id,
            storage,
            Rc::new(SystemClock),
            Rc::new(WindowTimers),
            &config,
        );
        if let Some(on_save) = on_save {
            session.set_on_save(Rc::new(move |snapshot: &FormSnapshot| {
                call_with_json(&on_save, snapshot)
            }));
        }
        Ok(WizardStep { session })
    }

    /// Record the latest field values (JSON object) and schedule a save
    #[wasm_bindgen(js_name = updateSnapshot)]
    pub fn update_snapshot(&self, json: &str) -> Result<(), JsValue> {
        let snapshot: FormSnapshot = serde_json::from_str(json).map_err(js_error)?;
        self.session.update_snapshot(snapshot);
        Ok(())
    }

    #[wasm_bindgen(js_name = manualSave)]
    pub fn manual_save(&self) -> bool {
        self.session.manual_save()
    }

    /// Saved snapshot as JSON, also passed to `on_restore`
    #[wasm_bindgen(js_name = loadSnapshot)]
    pub fn load_snapshot(&self, on_restore: &js_sys::Function) -> Option<String> {
        let snapshot = self
            .session
            .load_snapshot(|s| call_with_json(on_restore, s))?;
        serde_json::to_string(&snapshot).ok()
    }

    pub fn clear(&self) {
        self.session.clear();
    }

    pub fn status(&self) -> String {
        self.session.status().as_str().to_string()
    }

    pub fn indicator(&self) -> String {
        self.session.indicator().as_str().to_string()
    }

    /// Whether to show the restore dialog
    #[wasm_bindgen(js_name = needsRecoveryDecision)]
    pub fn needs_recovery_decision(&self) -> bool {
        self.session.needs_recovery_decision()
    }

    /// Milliseconds until the saved session expires
    #[wasm_bindgen(js_name = remainingMs)]
    pub fn remaining_ms(&self) -> f64 {
        self.session.remaining().as_millis() as f64
    }

    #[wasm_bindgen(js_name = chooseRestore)]
    pub fn choose_restore(&self, on_restore: &js_sys::Function) -> Result<bool, JsValue> {
        let restored = self
            .session
            .choose_restore(|s| call_with_json(on_restore, s))
            .map_err(js_error)?;
        Ok(restored.is_some())
    }

    #[wasm_bindgen(js_name = chooseStartFresh)]
    pub fn choose_start_fresh(&self, on_start_fresh: &js_sys::Function) -> Result<(), JsValue> {
        self.session
            .choose_start_fresh(|| {
                if let Err(err) = on_start_fresh.call0(&JsValue::NULL) {
                    log::warn!("Start-fresh callback threw: {err:?}");
                }
            })
            .map_err(js_error)
    }

    pub fn dismiss(&self) -> Result<(), JsValue> {
        self.session.dismiss().map_err(js_error)
    }
}
