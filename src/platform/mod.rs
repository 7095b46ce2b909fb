//! Platform abstraction layer
//!
//! Handles browser/native differences for:
//! - Time (wall clock in milliseconds)
//! - Storage (LocalStorage on web, files or memory natively)

pub mod storage;
pub mod time;

pub use storage::{KeyValueStorage, MemoryStorage, StorageError};
pub use time::{Clock, ManualClock, SystemClock};

#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileStorage;

#[cfg(target_arch = "wasm32")]
pub use storage::LocalStorage;
