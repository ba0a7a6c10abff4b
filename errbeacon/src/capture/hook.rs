//! Process-wide panic capture
//!
//! [`install`] chains a panic hook in front of the one already registered. Every
//! panic is turned into a [`RawErrorEvent`] and captured before the previous
//! hook runs, so default panic output is unchanged.
//!
//! Panics raised by the pipeline itself (handlers, transports) are not captured
//! again; they are logged where they are caught.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::Cell;
use std::panic::PanicHookInfo;

use crate::collector::Collector;
use crate::handlers::panic_message;
use crate::types::{ErrorObject, RawErrorEvent};

thread_local! {
    static SUPPRESSED: Cell<bool> = const { Cell::new(false) };
}

/// Restores the previous suppression state, even while unwinding
struct SuppressGuard {
    previous: bool,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        SUPPRESSED.with(|s| s.set(self.previous));
    }
}

/// Run `f` with panic capture disabled on this thread
pub(crate) fn without_capture<R>(f: impl FnOnce() -> R) -> R {
    let _guard = SuppressGuard {
        previous: SUPPRESSED.with(|s| s.replace(true)),
    };
    f()
}

fn is_suppressed() -> bool {
    SUPPRESSED.with(Cell::get)
}

/// Register `collector` as the process panic listener
pub fn install(collector: Collector) {
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        if !is_suppressed() {
            let event = event_from_panic(info);
            without_capture(|| collector.capture(&event));
        }
        previous(info);
    }));

    tracing::debug!("Panic hook installed");
}

/// Build a raw event from panic information.
///
/// The stack is only filled in when backtraces are enabled (`RUST_BACKTRACE`).
pub fn event_from_panic(info: &PanicHookInfo<'_>) -> RawErrorEvent {
    let backtrace = Backtrace::capture();
    let stack = match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    };

    RawErrorEvent {
        message: Some(panic_message(info.payload())),
        filename: info.location().map(|l| l.file().to_string()),
        lineno: info.location().map(|l| l.line()),
        colno: info.location().map(|l| l.column()),
        error: Some(ErrorObject { stack }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_capture_is_scoped() {
        assert!(!is_suppressed());
        without_capture(|| {
            assert!(is_suppressed());
            without_capture(|| assert!(is_suppressed()));
            assert!(is_suppressed());
        });
        assert!(!is_suppressed());
    }

    #[test]
    fn test_suppression_restored_after_unwind() {
        let result = std::panic::catch_unwind(|| without_capture(|| panic!("inside")));
        assert!(result.is_err());
        assert!(!is_suppressed());
    }
}
