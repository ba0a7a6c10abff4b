//! Session-scoped persistence for the buffer
//!
//! A [`SessionStore`] is a plain string key/value store. The collector keeps the
//! whole buffer as one JSON array under [`BUFFER_KEY`]: read once at
//! construction, rewritten after every capture and every acknowledged flush.
//! Running without a store is the normal memory-only mode.

mod sqlite;

pub use sqlite::SqliteStore;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use crate::capture::hook::without_capture;
use crate::capture::Buffer;
use crate::error::{Error, Result};
use crate::handlers::panic_message;

/// Key the buffer is persisted under
pub const BUFFER_KEY: &str = "errbeacon.buffer";

/// Key/value storage scoped to one session
pub trait SessionStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;
}

impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }
}

/// In-process store, lost with the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Read a persisted buffer. Missing or unreadable state yields an empty buffer.
pub(crate) fn load_buffer(store: &dyn SessionStore) -> Buffer {
    let raw = match call_store("get_item", || store.get_item(BUFFER_KEY)) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Buffer::new(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read persisted errors, starting empty");
            return Buffer::new();
        }
    };

    match serde_json::from_str::<Buffer>(&raw) {
        Ok(buffer) => {
            tracing::debug!(records = buffer.len(), "Restored persisted errors");
            buffer
        }
        Err(e) => {
            tracing::warn!(error = %e, "Persisted errors are corrupt, starting empty");
            Buffer::new()
        }
    }
}

/// Persist `buffer`, logging instead of failing
pub(crate) fn save_buffer(store: &dyn SessionStore, buffer: &Buffer) {
    let result = serde_json::to_string(buffer)
        .map_err(Error::from)
        .and_then(|json| call_store("set_item", || store.set_item(BUFFER_KEY, &json)));

    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to persist errors");
    }
}

/// Run a store call; a panicking store is reported as [`Error::Store`] and never
/// reaches the panic hook
fn call_store<T>(op: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    without_capture(|| catch_unwind(AssertUnwindSafe(f))).unwrap_or_else(|panic| {
        Err(Error::Store(format!(
            "{} panicked: {}",
            op,
            panic_message(panic.as_ref())
        )))
    })
}
