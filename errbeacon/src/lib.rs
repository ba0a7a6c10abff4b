//! # errbeacon
//!
//! Client-side error telemetry: capture runtime errors, count recurring ones,
//! and flush them to a remote collector.
//!
//! This library provides:
//! - A capture normalizer that turns raw error events into deduplicated records
//! - A flush pipeline with pluggable transports and success/failure handlers
//! - Optional session-scoped persistence of the pending buffer
//! - Configuration and logging infrastructure
//!
//! ## Architecture
//!
//! Errors flow through two stages owned by one long-lived [`Collector`]:
//! - **Capture:** a raw event is normalized into an [`ErrorRecord`] and merged
//!   into the buffer. Records with the same `(message, filename, lineno)` are
//!   counted rather than duplicated.
//! - **Flush:** after every capture the buffer is snapshotted and handed to a
//!   [`Transport`]. A successful send removes what was delivered; a failed one
//!   keeps everything for the next capture to resend.
//!
//! ## Example
//!
//! ```rust,no_run
//! use errbeacon::{Collector, RawErrorEvent};
//!
//! # async fn run() -> errbeacon::Result<()> {
//! let collector = Collector::builder()
//!     .endpoint("https://errors.example.com/report")
//!     .extra_param("app", "checkout")
//!     .http_transport()
//!     .on_save_error(|response| eprintln!("report failed: {:?}", response.message()))
//!     .install()?;
//!
//! collector.capture(&RawErrorEvent::new("TypeError: x is undefined", "app.js", 10, 4));
//! collector.drain().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use capture::{normalize, normalize_at, Buffer, Merge};
pub use collector::{Collector, CollectorBuilder};
pub use config::{CollectorConfig, Config};
pub use error::{Error, Result};
pub use flush::{FlushStats, Payload};
pub use handlers::Handlers;
pub use store::{MemoryStore, SessionStore, SqliteStore};
pub use transport::{
    FnTransport, HttpTransport, NoTransport, Response, SendFuture, Transport, TransportChain,
    TransportError,
};
pub use types::*;

// Public modules
pub mod capture;
pub mod collector;
pub mod config;
pub mod error;
pub mod flush;
pub mod handlers;
pub mod logging;
pub mod store;
pub mod transport;
pub mod types;
