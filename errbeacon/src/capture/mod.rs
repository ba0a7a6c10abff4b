//! Capture normalizer
//!
//! Turns raw error events into [`ErrorRecord`]s and merges them into the
//! [`Buffer`]. Nothing in here fails: missing fields degrade to empty values so
//! that a malformed event is still recorded.

mod buffer;
pub mod hook;

pub use buffer::{Buffer, Merge};

use std::panic::Location;

use chrono::Utc;

use crate::types::{ErrorObject, ErrorRecord, RawErrorEvent};

/// Normalize an event, stamping it with the current time
pub fn normalize(event: &RawErrorEvent) -> ErrorRecord {
    normalize_at(event, Utc::now().timestamp_millis())
}

/// Normalize an event with an explicit capture time (milliseconds since epoch)
pub fn normalize_at(event: &RawErrorEvent, timestamp: i64) -> ErrorRecord {
    ErrorRecord {
        message: event.message.clone().unwrap_or_default(),
        filename: event.filename.clone().unwrap_or_default(),
        lineno: event.lineno.unwrap_or(0),
        colno: event.colno.unwrap_or(0),
        stack: event.stack().map(str::to_string),
        timestamp,
        occurrences: 1,
    }
}

/// Build a raw event from a Rust error raised at `location`.
///
/// The error's `source()` chain stands in for the stack trace.
pub fn event_from_error(
    error: &(dyn std::error::Error + 'static),
    location: &Location<'_>,
) -> RawErrorEvent {
    let mut chain = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(format!("caused by: {}", cause));
        source = cause.source();
    }

    RawErrorEvent {
        message: Some(error.to_string()),
        filename: Some(location.file().to_string()),
        lineno: Some(location.line()),
        colno: Some(location.column()),
        error: (!chain.is_empty()).then(|| ErrorObject {
            stack: Some(chain.join("\n")),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "failed to load settings")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_normalize_copies_identity_fields() {
        let event = RawErrorEvent::new("boom", "app.js", 10, 4).with_stack("Error: boom");
        let record = normalize_at(&event, 42);

        assert_eq!(record.message, "boom");
        assert_eq!(record.filename, "app.js");
        assert_eq!(record.lineno, 10);
        assert_eq!(record.colno, 4);
        assert_eq!(record.stack.as_deref(), Some("Error: boom"));
        assert_eq!(record.timestamp, 42);
        assert_eq!(record.occurrences, 1);
    }

    #[test]
    fn test_normalize_degrades_missing_fields() {
        let record = normalize_at(&RawErrorEvent::default(), 7);

        assert_eq!(record.message, "");
        assert_eq!(record.filename, "");
        assert_eq!(record.lineno, 0);
        assert_eq!(record.colno, 0);
        assert_eq!(record.stack, None);
        assert_eq!(record.occurrences, 1);
    }

    #[test]
    fn test_normalize_uses_current_time() {
        let before = Utc::now().timestamp_millis();
        let record = normalize(&RawErrorEvent::default());
        assert!(record.timestamp >= before);
    }

    #[test]
    fn test_event_from_error_uses_location_and_sources() {
        let error = Outer(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "settings.toml missing",
        ));
        let location = Location::caller();
        let event = event_from_error(&error, location);

        assert_eq!(event.message.as_deref(), Some("failed to load settings"));
        assert_eq!(event.filename.as_deref(), Some(file!()));
        assert_eq!(event.lineno, Some(location.line()));
        assert_eq!(event.stack(), Some("caused by: settings.toml missing"));
    }

    #[test]
    fn test_event_from_error_without_sources_has_no_stack() {
        let error = std::io::Error::new(std::io::ErrorKind::Other, "plain");
        let event = event_from_error(&error, Location::caller());
        assert!(event.error.is_none());
    }
}
