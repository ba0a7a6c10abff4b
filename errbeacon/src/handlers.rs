//! Registered observers for capture and flush events
//!
//! Handlers run synchronously at fixed points in the pipeline and must not
//! take the pipeline down with them: a panicking handler is caught and logged.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::capture::hook::without_capture;
use crate::transport::Response;
use crate::types::ErrorRecord;

type RecordHandler = Box<dyn Fn(&ErrorRecord) + Send + Sync>;
type ResponseHandler = Box<dyn Fn(&Response) + Send + Sync>;

/// Optional callbacks invoked by the collector
#[derive(Default)]
pub struct Handlers {
    on_error: Option<RecordHandler>,
    on_save: Option<ResponseHandler>,
    on_save_error: Option<ResponseHandler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per captured error with the buffered record, before the
    /// flush is attempted
    pub fn on_error(mut self, handler: impl Fn(&ErrorRecord) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    /// Called after the remote collector accepted a flush
    pub fn on_save(mut self, handler: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        self.on_save = Some(Box::new(handler));
        self
    }

    /// Called after a flush failed
    pub fn on_save_error(mut self, handler: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        self.on_save_error = Some(Box::new(handler));
        self
    }

    pub(crate) fn error(&self, record: &ErrorRecord) {
        if let Some(handler) = &self.on_error {
            guarded("on_error", || handler(record));
        }
    }

    pub(crate) fn save(&self, response: &Response) {
        if let Some(handler) = &self.on_save {
            guarded("on_save", || handler(response));
        }
    }

    pub(crate) fn save_error(&self, response: &Response) {
        if let Some(handler) = &self.on_save_error {
            guarded("on_save_error", || handler(response));
        }
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("on_error", &self.on_error.is_some())
            .field("on_save", &self.on_save.is_some())
            .field("on_save_error", &self.on_save_error.is_some())
            .finish()
    }
}

/// Run a handler, logging instead of unwinding if it panics
fn guarded(name: &'static str, f: impl FnOnce()) {
    if let Err(panic) = without_capture(|| catch_unwind(AssertUnwindSafe(f))) {
        let reason = panic_message(panic.as_ref());
        tracing::warn!(handler = name, reason = %reason, "Handler panicked");
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
