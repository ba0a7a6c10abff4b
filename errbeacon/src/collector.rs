//! The long-lived collector
//!
//! A [`Collector`] owns the buffer and runs the capture-and-flush pipeline:
//!
//! ```text
//! raw event → normalize → merge into buffer → persist → on_error → flush
//!                                                                    │
//!             success: on_save, acknowledge the sent snapshot  ◄─────┤
//!             failure: on_save_error, keep everything          ◄─────┘
//! ```
//!
//! Capturing never blocks on the network and never fails. Each capture triggers
//! one flush, which is spawned onto a tokio runtime and reports back through the
//! registered [`Handlers`].

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::task::{Context, Poll};

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::capture::{self, hook, Buffer};
use crate::config::{CollectorConfig, Config};
use crate::error::{Error, Result};
use crate::flush::{FlushStats, Payload};
use crate::handlers::{panic_message, Handlers};
use crate::store::{self, SessionStore, SqliteStore};
use crate::transport::{HttpTransport, NoTransport, Response, SendFuture, Transport};
use crate::types::{ErrorRecord, RawErrorEvent};

/// Captures, deduplicates and flushes errors.
///
/// Cheap to clone; clones share the same buffer.
#[derive(Clone)]
pub struct Collector {
    shared: Arc<Shared>,
}

struct Shared {
    config: CollectorConfig,
    session_id: String,
    transport: Arc<dyn Transport>,
    store: Option<Arc<dyn SessionStore>>,
    handlers: Handlers,
    state: Mutex<State>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    runtime: Handle,
}

struct State {
    buffer: Buffer,
    stats: FlushStats,
}

/// Runtime for collectors built outside of any tokio runtime. Never dropped.
static FALLBACK_RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn fallback_handle() -> Result<Handle> {
    if let Some(runtime) = FALLBACK_RUNTIME.get() {
        return Ok(runtime.handle().clone());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("errbeacon-flush")
        .enable_all()
        .build()
        .map_err(|e| Error::Config(format!("failed to create runtime: {}", e)))?;

    Ok(FALLBACK_RUNTIME.get_or_init(|| runtime).handle().clone())
}

impl Collector {
    /// Start building a collector with default configuration
    pub fn builder() -> CollectorBuilder {
        CollectorBuilder::new(CollectorConfig::default())
    }

    /// Capture a raw error event.
    ///
    /// The event is normalized and merged into the buffer, `on_error` is called
    /// with the buffered record, and a flush is started.
    pub fn capture(&self, event: &RawErrorEvent) {
        let record = capture::normalize(event);

        // A panic raised while the buffer is locked must not re-enter the hook
        let (merged, is_new) = hook::without_capture(|| {
            let mut state = self.lock_state();
            let merge = state.buffer.merge(record);
            state.stats.captured += 1;
            self.persist(&state.buffer);
            (state.buffer.get(merge.index).cloned(), merge.is_new)
        });

        if let Some(record) = merged {
            tracing::debug!(
                message = %record.message,
                filename = %record.filename,
                lineno = record.lineno,
                occurrences = record.occurrences,
                is_new,
                "Captured error"
            );
            self.shared.handlers.error(&record);
        }

        self.flush();
    }

    /// Capture a Rust error, identified by the caller's location
    #[track_caller]
    pub fn capture_error(&self, error: &(dyn std::error::Error + 'static)) {
        let event = capture::event_from_error(error, Location::caller());
        self.capture(&event);
    }

    /// Capture an event relayed as JSON, e.g. from a browser `error` event
    pub fn capture_json(&self, value: &serde_json::Value) {
        self.capture(&RawErrorEvent::from_json(value));
    }

    /// Send the current buffer if an endpoint and a ready transport exist
    fn flush(&self) {
        let Some(url) = self.shared.config.endpoint.as_deref() else {
            tracing::trace!("No endpoint configured, keeping errors buffered");
            return;
        };

        let transport = &self.shared.transport;
        if !transport.is_ready() {
            tracing::warn!("No transport available, errors stay buffered until the next capture");
            self.lock_state().stats.skipped += 1;
            return;
        }

        let snapshot = self.lock_state().buffer.snapshot();
        if snapshot.is_empty() {
            return;
        }
        let payload = Payload::new(&self.shared.config.extra_params, snapshot.clone());

        let dispatched =
            hook::without_capture(|| catch_unwind(AssertUnwindSafe(|| transport.send(url, payload))));
        let pending = match dispatched {
            Ok(Ok(pending)) => pending,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Transport could not dispatch, errors stay buffered");
                self.lock_state().stats.skipped += 1;
                return;
            }
            Err(panic) => {
                tracing::warn!(
                    reason = %panic_message(panic.as_ref()),
                    "Transport panicked while dispatching, errors stay buffered"
                );
                self.lock_state().stats.skipped += 1;
                return;
            }
        };

        self.lock_state().stats.attempted += 1;
        tracing::debug!(url, records = snapshot.len(), "Flushing errors");

        let collector = self.clone();
        let task = self.shared.runtime.spawn(async move {
            let outcome = Guarded { inner: pending }.await;
            collector.complete(&snapshot, outcome);
        });
        self.track(task);
    }

    /// Apply the outcome of a send started with `snapshot`
    fn complete(&self, snapshot: &[ErrorRecord], outcome: std::result::Result<Response, Response>) {
        match outcome {
            Ok(response) => {
                tracing::debug!(
                    status = ?response.status,
                    records = snapshot.len(),
                    "Errors delivered"
                );
                self.shared.handlers.save(&response);

                hook::without_capture(|| {
                    let mut state = self.lock_state();
                    state.stats.succeeded += 1;
                    state.stats.records_delivered += snapshot.len();
                    if self.shared.config.clear_on_save {
                        state.buffer.acknowledge(snapshot);
                        self.persist(&state.buffer);
                    }
                });
            }
            Err(response) => {
                tracing::warn!(
                    status = ?response.status,
                    message = response.message().unwrap_or("-"),
                    records = snapshot.len(),
                    "Failed to deliver errors, keeping them buffered"
                );
                self.shared.handlers.save_error(&response);
                self.lock_state().stats.failed += 1;
            }
        }
    }

    /// Wait for every flush started so far to settle.
    ///
    /// Does not start a flush. Useful before shutdown and in tests.
    pub async fn drain(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.lock_in_flight());
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "Flush task did not complete");
                }
            }
        }
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut in_flight = self.lock_in_flight();
        in_flight.retain(|t| !t.is_finished());
        in_flight.push(task);
    }

    fn persist(&self, buffer: &Buffer) {
        if let Some(store) = &self.shared.store {
            store::save_buffer(store.as_ref(), buffer);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.shared
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the buffered records, in capture order
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.lock_state().buffer.snapshot()
    }

    /// Number of buffered records
    pub fn pending_count(&self) -> usize {
        self.lock_state().buffer.len()
    }

    /// Check if there are any buffered records
    pub fn has_pending(&self) -> bool {
        !self.lock_state().buffer.is_empty()
    }

    /// Get current flush statistics
    pub fn stats(&self) -> FlushStats {
        self.lock_state().stats.clone()
    }

    /// Session this collector persists under
    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.shared.config
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("session_id", &self.shared.session_id)
            .field("endpoint", &self.shared.config.endpoint)
            .field("pending", &self.pending_count())
            .field("handlers", &self.shared.handlers)
            .finish_non_exhaustive()
    }
}

/// Polls a send without letting a panicking transport escape the flush task.
/// A panic becomes a failed [`Response`].
struct Guarded {
    inner: SendFuture,
}

impl Future for Guarded {
    type Output = std::result::Result<Response, Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.inner;
        let polled =
            hook::without_capture(|| catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx))));
        match polled {
            Ok(poll) => poll,
            Err(panic) => Poll::Ready(Err(Response::failure(format!(
                "transport panicked: {}",
                panic_message(panic.as_ref())
            )))),
        }
    }
}

/// Builder for [`Collector`]
pub struct CollectorBuilder {
    config: CollectorConfig,
    transport: Option<Arc<dyn Transport>>,
    http_transport: bool,
    store: Option<Arc<dyn SessionStore>>,
    handlers: Handlers,
    runtime: Option<Handle>,
}

impl CollectorBuilder {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            transport: None,
            http_transport: false,
            store: None,
            handlers: Handlers::new(),
            runtime: None,
        }
    }

    /// Builder wired from a loaded [`Config`]: the built-in HTTP transport when an
    /// endpoint is set, and a [`SqliteStore`] scoped to `collector.session_id`
    /// when storage is enabled
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut builder = Self::new(config.collector.clone());
        if builder.config.is_ready() {
            builder = builder.http_transport();
        }
        if let (true, Some(session_id)) = (
            config.storage.enabled,
            config.collector.session_id.as_deref(),
        ) {
            let store = SqliteStore::open(&config.storage.resolved_path(), session_id)?;
            builder = builder.store(store);
        }
        Ok(builder)
    }

    /// Remote collector URL; without one nothing is ever sent
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    /// Add a field to every flush payload
    pub fn extra_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.extra_params.insert(key.into(), value.into());
        self
    }

    pub fn clear_on_save(mut self, clear: bool) -> Self {
        self.config.clear_on_save = clear;
        self
    }

    /// Transport used for every flush. Takes precedence over [`Self::http_transport`].
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use the built-in [`HttpTransport`] unless another transport is set
    pub fn http_transport(mut self) -> Self {
        self.http_transport = true;
        self
    }

    /// Mirror the buffer into `store`. The store carries its own session scope.
    pub fn store(mut self, store: impl SessionStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Replace all handlers at once
    pub fn handlers(mut self, handlers: Handlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn on_error(mut self, handler: impl Fn(&ErrorRecord) + Send + Sync + 'static) -> Self {
        self.handlers = self.handlers.on_error(handler);
        self
    }

    pub fn on_save(mut self, handler: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        self.handlers = self.handlers.on_save(handler);
        self
    }

    pub fn on_save_error(mut self, handler: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        self.handlers = self.handlers.on_save_error(handler);
        self
    }

    /// Runtime for flush tasks. Defaults to the current runtime, or a shared
    /// background one when built outside of any runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build the collector without registering any listener
    pub fn build(self) -> Result<Collector> {
        self.config.validate()?;

        let transport: Arc<dyn Transport> = match (self.transport, self.http_transport) {
            (Some(transport), _) => transport,
            (None, true) => Arc::new(HttpTransport::new(&self.config)?),
            (None, false) => Arc::new(NoTransport),
        };

        let session_id = self
            .config
            .session_id
            .clone()
            .unwrap_or_else(new_session_id);

        let buffer = match &self.store {
            Some(store) => store::load_buffer(store.as_ref()),
            None => Buffer::new(),
        };

        let runtime = match self.runtime.or_else(|| Handle::try_current().ok()) {
            Some(handle) => handle,
            None => fallback_handle()?,
        };

        tracing::info!(
            session_id = %session_id,
            endpoint = self.config.endpoint.as_deref().unwrap_or("<none>"),
            restored = buffer.len(),
            "Collector ready"
        );

        Ok(Collector {
            shared: Arc::new(Shared {
                config: self.config,
                session_id,
                transport,
                store: self.store,
                handlers: self.handlers,
                state: Mutex::new(State {
                    buffer,
                    stats: FlushStats::default(),
                }),
                in_flight: Mutex::new(Vec::new()),
                runtime,
            }),
        })
    }

    /// Build the collector and register it as the process panic listener
    pub fn install(self) -> Result<Collector> {
        let collector = self.build()?;
        hook::install(collector.clone());
        Ok(collector)
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
