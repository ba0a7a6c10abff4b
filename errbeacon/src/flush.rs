//! Flush payloads and statistics
//!
//! The payload sent to the remote collector is a flat JSON object:
//!
//! ```text
//! { ...extra_params, "errors": [ErrorRecord, ...] }
//! ```
//!
//! `errors` always carries the buffer snapshot. A caller-supplied extra
//! parameter named `errors` is dropped rather than allowed to replace it.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::ErrorRecord;

/// Field name reserved for the buffered records
pub const ERRORS_FIELD: &str = "errors";

/// Body of one flush
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    #[serde(flatten)]
    extra_params: Map<String, Value>,
    pub errors: Vec<ErrorRecord>,
}

impl Payload {
    /// Combine the configured extra parameters with a buffer snapshot
    pub fn new(extra_params: &Map<String, Value>, errors: Vec<ErrorRecord>) -> Self {
        let mut extra_params = extra_params.clone();
        if extra_params.remove(ERRORS_FIELD).is_some() {
            tracing::debug!("Ignoring extra param `errors`, it is reserved for buffered records");
        }

        Self {
            extra_params,
            errors,
        }
    }

    /// Extra parameters, without any `errors` key
    pub fn extra_params(&self) -> &Map<String, Value> {
        &self.extra_params
    }

    /// The payload as a JSON object, exactly as transports serialize it
    pub fn to_value(&self) -> Value {
        let mut object = self.extra_params.clone();
        object.insert(
            ERRORS_FIELD.to_string(),
            serde_json::to_value(&self.errors).unwrap_or_else(|_| Value::Array(Vec::new())),
        );
        Value::Object(object)
    }
}

/// Flush statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushStats {
    /// Errors captured (including counted duplicates)
    pub captured: usize,
    /// Sends handed to a transport
    pub attempted: usize,
    /// Sends the remote collector accepted
    pub succeeded: usize,
    /// Sends the transport reported as failed
    pub failed: usize,
    /// Flushes skipped for lack of a transport, or because dispatch failed
    pub skipped: usize,
    /// Records carried by successful sends
    pub records_delivered: usize,
}
