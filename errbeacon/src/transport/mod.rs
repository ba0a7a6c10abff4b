//! Pluggable delivery of flush payloads
//!
//! A [`Transport`] turns a payload into a pending send. Dispatch itself can fail
//! (`Err` from [`Transport::send`]), in which case the buffer is simply kept.
//! Once dispatched, the returned [`SendFuture`] resolves to `Ok(response)` when
//! the remote collector accepted the payload and `Err(response)` otherwise.
//!
//! ## Selection
//!
//! The collector asks its transport at flush time, never at construction, so a
//! [`TransportChain`] whose first candidate becomes ready later will start using
//! it on the next flush. When nothing is ready the flush is skipped with a
//! warning.

mod http;

pub use http::HttpTransport;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::flush::Payload;

/// Pending delivery of a payload
pub type SendFuture = Pin<Box<dyn Future<Output = Result<Response, Response>> + Send + 'static>>;

/// What the remote collector (or the transport) reported for a send
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// HTTP status, when the transport has one
    pub status: Option<u16>,
    /// Response body, or a description of the failure
    pub body: Value,
}

impl Response {
    pub fn new(status: Option<u16>, body: Value) -> Self {
        Self { status, body }
    }

    /// A failure that never reached the remote collector
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: None,
            body: Value::String(message.into()),
        }
    }

    /// Human-readable message: the body's `message` field, or the body itself
    /// when it is a plain string
    pub fn message(&self) -> Option<&str> {
        match &self.body {
            Value::String(s) => Some(s),
            body => body.get("message").and_then(Value::as_str),
        }
    }
}

/// Errors raised while dispatching a send
#[derive(Debug, Error)]
pub enum TransportError {
    /// No transport is ready to send
    #[error("no transport available")]
    Unavailable,

    /// The transport refused to start the send
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// The transport could not be constructed
    #[error("client setup failed: {0}")]
    Client(String),
}

/// Send mechanism used by the flush pipeline
pub trait Transport: Send + Sync {
    /// Start delivering `payload` to `url`.
    ///
    /// Must return quickly; the actual I/O belongs in the returned future.
    fn send(&self, url: &str, payload: Payload) -> Result<SendFuture, TransportError>;

    /// Whether this transport can currently send. Checked at every flush.
    fn is_ready(&self) -> bool {
        true
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, url: &str, payload: Payload) -> Result<SendFuture, TransportError> {
        (**self).send(url, payload)
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Placeholder used when no transport was registered
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransport;

impl Transport for NoTransport {
    fn send(&self, _url: &str, _payload: Payload) -> Result<SendFuture, TransportError> {
        Err(TransportError::Unavailable)
    }

    fn is_ready(&self) -> bool {
        false
    }
}

/// Adapts an async closure into a [`Transport`]
pub struct FnTransport<F> {
    send_fn: F,
}

impl<F, Fut> FnTransport<F>
where
    F: Fn(String, Payload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, Response>> + Send + 'static,
{
    pub fn new(send_fn: F) -> Self {
        Self { send_fn }
    }
}

impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(String, Payload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, Response>> + Send + 'static,
{
    fn send(&self, url: &str, payload: Payload) -> Result<SendFuture, TransportError> {
        Ok(Box::pin((self.send_fn)(url.to_string(), payload)))
    }
}

/// Ordered transport candidates; the first ready one wins
#[derive(Default, Clone)]
pub struct TransportChain {
    candidates: Vec<Arc<dyn Transport>>,
}

impl TransportChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lower-priority candidate
    pub fn with(mut self, transport: impl Transport + 'static) -> Self {
        self.candidates.push(Arc::new(transport));
        self
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    fn resolve(&self) -> Option<&Arc<dyn Transport>> {
        self.candidates.iter().find(|t| t.is_ready())
    }
}

impl Transport for TransportChain {
    fn send(&self, url: &str, payload: Payload) -> Result<SendFuture, TransportError> {
        match self.resolve() {
            Some(transport) => transport.send(url, payload),
            None => Err(TransportError::Unavailable),
        }
    }

    fn is_ready(&self) -> bool {
        self.resolve().is_some()
    }
}
