//! Wizard step progress
//!
//! Persisted unencrypted under its own storage key. Holds only completion
//! flags and small auxiliary data, never field values, and has its own
//! lifecycle: it survives a vault record expiring but not "start fresh".

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::CacheConfig;
use crate::consts;
use crate::platform::time::Timestamp;
use crate::platform::{Clock, KeyValueStorage, StorageError};

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A single wizard step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepProgress {
    pub id: String,
    pub name: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Completion state of the whole wizard run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub steps: Vec<StepProgress>,
    /// Furthest step reached; never decreases until the state is cleared
    pub current_step_index: usize,
    /// Unix timestamp (ms) of the last change
    pub last_updated: Timestamp,
}

impl ProgressState {
    /// Fresh state with every step incomplete. Missing names default to the id.
    pub fn new(step_ids: &[&str], names: &[&str], now: Timestamp) -> Self {
        let steps = step_ids
            .iter()
            .enumerate()
            .map(|(i, id)| StepProgress {
                id: id.to_string(),
                name: names.get(i).unwrap_or(id).to_string(),
                completed: false,
                data: None,
            })
            .collect();
        Self {
            steps,
            current_step_index: 0,
            last_updated: now,
        }
    }

    pub fn step(&self, id: &str) -> Option<&StepProgress> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn completed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.completed).count()
    }

    /// Number of completed steps from the start, up to the first gap
    pub fn completed_run(&self) -> usize {
        self.steps.iter().take_while(|s| s.completed).count()
    }

    /// Rounded percentage of completed steps
    pub fn percent_complete(&self) -> u32 {
        if self.steps.is_empty() {
            return 0;
        }
        (self.completed_count() as f64 / self.steps.len() as f64 * 100.0).round() as u32
    }

    /// Set a step's flag and data, appending unknown steps
    pub fn set_completed(
        &mut self,
        step_id: &str,
        completed: bool,
        data: Option<Value>,
        now: Timestamp,
    ) {
        match self.steps.iter_mut().find(|s| s.id == step_id) {
            Some(step) => {
                step.completed = completed;
                step.data = data;
            }
            None => self.steps.push(StepProgress {
                id: step_id.to_string(),
                name: step_id.to_string(),
                completed,
                data,
            }),
        }
        self.current_step_index = self.current_step_index.max(self.completed_run());
        self.last_updated = now;
    }
}

/// Persistent progress channel
#[derive(Clone)]
pub struct ProgressTracker {
    storage: Rc<dyn KeyValueStorage>,
    clock: Rc<dyn Clock>,
    key: String,
}

impl ProgressTracker {
    pub fn new(storage: Rc<dyn KeyValueStorage>, clock: Rc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            key: consts::PROGRESS_KEY.to_string(),
        }
    }

    pub fn from_config(
        storage: Rc<dyn KeyValueStorage>,
        clock: Rc<dyn Clock>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            key: config.progress_key.clone(),
            ..Self::new(storage, clock)
        }
    }

    /// Create and persist a fresh state, replacing any existing one
    pub fn initialize(&self, step_ids: &[&str], names: &[&str]) -> ProgressState {
        let state = ProgressState::new(step_ids, names, self.clock.now_ms());
        match self.save(&state) {
            Ok(()) => log::info!("Progress initialized ({} steps)", state.steps.len()),
            Err(err) => log::warn!("Failed to persist fresh progress: {err}"),
        }
        state
    }

    /// Load the persisted state, if any
    pub fn load(&self) -> Option<ProgressState> {
        let json = match self.storage.get(&self.key) {
            Ok(json) => json?,
            Err(err) => {
                log::warn!("Progress unreadable: {err}");
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(state) => Some(state),
            Err(err) => {
                log::warn!("Ignoring corrupt progress state: {err}");
                None
            }
        }
    }

    /// Flip a step's completion flag. No-op until a state has been initialized.
    pub fn mark_complete(&self, step_id: &str, completed: bool, data: Option<Value>) {
        if let Err(err) = self.try_mark_complete(step_id, completed, data) {
            log::warn!("Failed to update progress for {step_id}: {err}");
        }
    }

    pub fn try_mark_complete(
        &self,
        step_id: &str,
        completed: bool,
        data: Option<Value>,
    ) -> Result<(), ProgressError> {
        let Some(mut state) = self.load() else {
            return Ok(());
        };
        state.set_completed(step_id, completed, data, self.clock.now_ms());
        self.save(&state)?;
        log::debug!(
            "Progress: {step_id} completed={completed}, current step {}",
            state.current_step_index
        );
        Ok(())
    }

    /// Rounded completion percentage; 0 without a state
    pub fn percent_complete(&self) -> u32 {
        self.load().map(|s| s.percent_complete()).unwrap_or(0)
    }

    pub fn is_step_complete(&self, step_id: &str) -> bool {
        self.load()
            .and_then(|s| s.step(step_id).map(|step| step.completed))
            .unwrap_or(false)
    }

    pub fn current_step_index(&self) -> usize {
        self.load().map(|s| s.current_step_index).unwrap_or(0)
    }

    /// Delete the persisted state
    pub fn clear(&self) {
        match self.storage.remove(&self.key) {
            Ok(()) => log::info!("Progress cleared"),
            Err(err) => log::warn!("Failed to clear progress: {err}"),
        }
    }

    fn save(&self, state: &ProgressState) -> Result<(), ProgressError> {
        let json = serde_json::to_string(state)?;
        self.storage.set(&self.key, &json)?;
        Ok(())
    }
}
