//! Core domain types for errbeacon
//!
//! | Term | Definition |
//! |------|------------|
//! | **Raw event** | An error notification as delivered by its source, every field optional |
//! | **Record** | One normalized error with an occurrence counter |
//! | **Identity key** | `message`, `filename` and `lineno` concatenated into one token |
//! | **Buffer** | Insertion-ordered records not yet delivered |
//! | **Flush** | One attempt to deliver the buffer to the remote collector |

use serde::{Deserialize, Serialize};

// ============================================
// Raw events
// ============================================

/// The error object nested in a raw event, if the source exposed one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Stack trace text
    #[serde(default)]
    pub stack: Option<String>,
}

/// An error notification before normalization.
///
/// Sources are free to leave any field out; normalization degrades missing
/// values instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawErrorEvent {
    pub message: Option<String>,
    pub filename: Option<String>,
    pub lineno: Option<u32>,
    pub colno: Option<u32>,
    pub error: Option<ErrorObject>,
}

impl RawErrorEvent {
    /// Create an event with a message and a source location
    pub fn new(message: impl Into<String>, filename: impl Into<String>, lineno: u32, colno: u32) -> Self {
        Self {
            message: Some(message.into()),
            filename: Some(filename.into()),
            lineno: Some(lineno),
            colno: Some(colno),
            error: None,
        }
    }

    /// Attach a stack trace
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.error = Some(ErrorObject {
            stack: Some(stack.into()),
        });
        self
    }

    /// Read an event from loosely-typed JSON.
    ///
    /// Unlike the derived `Deserialize`, this never fails: non-object input
    /// yields an empty event, numbers may arrive as floats or strings, and
    /// values of the wrong type are treated as missing.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let field = |name: &str| value.get(name).filter(|v| !v.is_null());

        Self {
            message: field("message").and_then(lenient_string),
            filename: field("filename").and_then(lenient_string),
            lineno: field("lineno").and_then(lenient_u32),
            colno: field("colno").and_then(lenient_u32),
            error: field("error").map(|error| ErrorObject {
                stack: error.get("stack").and_then(lenient_string),
            }),
        }
    }

    /// Stack trace of the nested error object, if any
    pub fn stack(&self) -> Option<&str> {
        self.error.as_ref().and_then(|e| e.stack.as_deref())
    }
}

fn lenient_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_u32(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0 && *f <= u32::MAX as f64)
                    .map(|f| f as u32)
            }),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================
// Records
// ============================================

/// One captured error.
///
/// Serialized field names form the wire format of the `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub filename: String,
    pub lineno: u32,
    pub colno: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Capture time of the first occurrence, milliseconds since epoch
    pub timestamp: i64,
    /// Times this identity was seen since it was last delivered
    pub occurrences: u32,
}

impl ErrorRecord {
    /// Deduplication token for this record.
    ///
    /// Column and stack are deliberately left out: throws from the same line are
    /// counted as one error.
    pub fn identity_key(&self) -> String {
        format!("{}{}{}", self.message, self.filename, self.lineno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_record() -> ErrorRecord {
        ErrorRecord {
            message: "TypeError: x is undefined".to_string(),
            filename: "app.js".to_string(),
            lineno: 10,
            colno: 5,
            stack: None,
            timestamp: 1_700_000_000_000,
            occurrences: 1,
        }
    }

    #[test]
    fn test_identity_key_ignores_column_and_stack() {
        let a = make_record();
        let mut b = make_record();
        b.colno = 99;
        b.stack = Some("at foo (app.js:10:99)".to_string());

        assert_eq!(a.identity_key(), b.identity_key());
        assert_eq!(a.identity_key(), "TypeError: x is undefinedapp.js10");
    }

    #[test]
    fn test_record_wire_format() {
        let value = serde_json::to_value(make_record()).unwrap();
        assert_eq!(
            value,
            json!({
                "message": "TypeError: x is undefined",
                "filename": "app.js",
                "lineno": 10,
                "colno": 5,
                "timestamp": 1_700_000_000_000i64,
                "occurrences": 1,
            })
        );
    }

    #[test]
    fn test_from_json_full_event() {
        let event = RawErrorEvent::from_json(&json!({
            "message": "boom",
            "filename": "main.js",
            "lineno": 3,
            "colno": 7,
            "error": { "stack": "Error: boom\n    at main.js:3:7" },
        }));

        assert_eq!(event.message.as_deref(), Some("boom"));
        assert_eq!(event.filename.as_deref(), Some("main.js"));
        assert_eq!(event.lineno, Some(3));
        assert_eq!(event.colno, Some(7));
        assert_eq!(event.stack(), Some("Error: boom\n    at main.js:3:7"));
    }

    #[test]
    fn test_from_json_tolerates_malformed_fields() {
        let event = RawErrorEvent::from_json(&json!({
            "message": null,
            "lineno": "12",
            "colno": 4.0,
            "error": null,
        }));

        assert_eq!(event.message, None);
        assert_eq!(event.filename, None);
        assert_eq!(event.lineno, Some(12));
        assert_eq!(event.colno, Some(4));
        assert_eq!(event.stack(), None);

        let event = RawErrorEvent::from_json(&json!({ "lineno": -1, "colno": [] }));
        assert_eq!(event.lineno, None);
        assert_eq!(event.colno, None);

        assert_eq!(RawErrorEvent::from_json(&json!("not an object")), RawErrorEvent::default());
    }

    #[test]
    fn test_error_object_without_stack() {
        let event = RawErrorEvent::from_json(&json!({ "message": "m", "error": {} }));
        assert!(event.error.is_some());
        assert_eq!(event.stack(), None);
    }
}
