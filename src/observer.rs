//! Stream observer dispatching transport events to user callbacks.
//!
//! The [`ObserverBuilder`] wires a [`HandlerRegistry`], a shared
//! [`ThrottleGate`] and an [`Invoker`] into a [`DefaultStreamObserver`]. The
//! observer then handles the three push events of a client stream:
//!
//! 1. Resolve the callback for the event kind (missing → fatal)
//! 2. Assemble the arguments the callback declared
//! 3. Wait for the admission permit (interrupted → fatal)
//! 4. Hand the bound call to the invoker, which releases the permit when the
//!    callback finishes
//!
//! Because the permit is only returned after the callback has finished, the
//! next event of the same observer cannot start running before the previous
//! one is done, whatever task the transport delivers it from.
//!
//! # Example
//!
//! ```
//! use grpc_stream_observer::handler::Signature;
//! use grpc_stream_observer::message::StreamMessage;
//! use grpc_stream_observer::observer::{DefaultStreamObserver, StreamObserver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let observer = DefaultStreamObserver::<String>::builder()
//!         .on_message(Signature::Value, |args| async move {
//!             println!("received {:?}", args.value());
//!             Ok(())
//!         })
//!         .on_completed(Signature::Empty, |_args| async { Ok(()) })
//!         .build()?;
//!
//!     observer.on_message(StreamMessage::from_payload("hello".to_string())).await?;
//!     observer.on_completed().await?;
//!     observer.wait_idle().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::connector::ConnectorError;
use crate::error::{ObserverError, Result};
use crate::handler::{
    Arguments, BoxFuture, CallbackKind, HandlerRegistry, HandlerResult, Registered, Signature,
};
use crate::invoker::{Completion, Invoker, Metadata, TokioInvoker};
use crate::message::{Headers, StreamMessage};
use crate::status::Status;
use crate::throttle::{self, ThrottleGate, ThrottlePermit};

/// Default admission timeout: wait forever.
pub const DEFAULT_ACQUIRE_TIMEOUT: Option<Duration> = None;

/// Default delay before a stalled admission wait is logged.
pub const DEFAULT_STALL_WARNING: Option<Duration> = Some(Duration::from_secs(30));

/// Message used when an error event carries no transport status.
const MISSING_STATUS_MESSAGE: &str = "stream terminated without status";

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Observer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Give up waiting for admission after this long. `None` waits forever.
    pub acquire_timeout: Option<Duration>,
    /// Log a warning when an admission wait lasts longer than this.
    pub stall_warning: Option<Duration>,
}

impl ObserverConfig {
    /// Adjust the configuration to the runtime of the calling context.
    ///
    /// On a runtime without a time driver the stall warning is turned off and
    /// an admission timeout fails with `Configuration`. Outside of a runtime
    /// the configuration is returned unchanged.
    pub fn fit_to_runtime(mut self) -> Result<Self> {
        let uses_timers = self.acquire_timeout.is_some() || self.stall_warning.is_some();
        if !uses_timers || Handle::try_current().is_err() || throttle::timers_enabled() {
            return Ok(self);
        }

        if self.acquire_timeout.is_some() {
            let message = "Admission timeout requires a runtime with timers enabled";
            tracing::error!("Error while building the connection. {}", message);
            return Err(ObserverError::Configuration(message.to_string()));
        }

        tracing::debug!("Runtime has no time driver, stall warning disabled");
        self.stall_warning = None;
        Ok(self)
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            stall_warning: DEFAULT_STALL_WARNING,
        }
    }
}

/// Receiver of the push events of one client stream.
pub trait StreamObserver<M>: Send + Sync {
    /// A message frame arrived.
    fn on_message(&self, message: StreamMessage<M>) -> BoxFuture<'_, Result<()>>;

    /// The stream failed; `message` carries the transport status.
    fn on_error(&self, message: StreamMessage<M>) -> BoxFuture<'_, Result<()>>;

    /// The stream completed normally.
    fn on_completed(&self) -> BoxFuture<'_, Result<()>>;
}

/// Builder for a [`DefaultStreamObserver`].
pub struct ObserverBuilder<M> {
    registry: Option<HandlerRegistry<M>>,
    gate: Option<ThrottleGate>,
    invoker: Option<Arc<dyn Invoker>>,
    cancel: Option<CancellationToken>,
    config: ObserverConfig,
}

impl<M: Send + 'static> ObserverBuilder<M> {
    /// Create a new observer builder.
    pub fn new() -> Self {
        Self {
            registry: None,
            gate: None,
            invoker: None,
            cancel: None,
            config: ObserverConfig::default(),
        }
    }

    /// Use a fully built handler registry.
    pub fn handler(mut self, registry: HandlerRegistry<M>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register the message callback.
    pub fn on_message<F, Fut>(mut self, signature: Signature, callback: F) -> Self
    where
        F: Fn(Arguments<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry
            .get_or_insert_with(HandlerRegistry::new)
            .register_message(signature, callback);
        self
    }

    /// Register the error callback.
    pub fn on_error<F, Fut>(mut self, signature: Signature, callback: F) -> Self
    where
        F: Fn(Arguments<ConnectorError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry
            .get_or_insert_with(HandlerRegistry::new)
            .register_error(signature, callback);
        self
    }

    /// Register the completion callback.
    pub fn on_completed<F, Fut>(mut self, signature: Signature, callback: F) -> Self
    where
        F: Fn(Arguments<()>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry
            .get_or_insert_with(HandlerRegistry::new)
            .register_completed(signature, callback);
        self
    }

    /// Share an existing admission gate.
    ///
    /// Observers built with clones of one gate never run callbacks
    /// concurrently with each other.
    pub fn gate(mut self, gate: ThrottleGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Use a custom invoker.
    ///
    /// Default: [`TokioInvoker`] on the runtime calling `build`.
    pub fn invoker(mut self, invoker: Arc<dyn Invoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Cancel admission waits when `token` is cancelled.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ObserverConfig) -> Self {
        self.config = config;
        self
    }

    /// Give up waiting for admission after `timeout`.
    ///
    /// Default: wait forever.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout = Some(timeout);
        self
    }

    /// Warn when an admission wait lasts longer than `after`.
    ///
    /// Default: 30 seconds.
    pub fn stall_warning(mut self, after: Option<Duration>) -> Self {
        self.config.stall_warning = after;
        self
    }

    /// Build the observer.
    ///
    /// Fails with `Configuration` if no handler was supplied, if no invoker
    /// was supplied and the caller is not inside a tokio runtime, or if an
    /// admission timeout is set on a runtime without timers.
    pub fn build(self) -> Result<DefaultStreamObserver<M>> {
        let Some(registry) = self.registry else {
            let message = "Listener service does not exist";
            tracing::error!("Error while building the connection. {}", message);
            return Err(ObserverError::Configuration(message.to_string()));
        };

        let config = self.config.fit_to_runtime()?;

        let invoker = match self.invoker {
            Some(invoker) => invoker,
            None => Arc::new(TokioInvoker::current()?),
        };

        Ok(DefaultStreamObserver {
            registry: Arc::new(registry),
            gate: self.gate.unwrap_or_default(),
            invoker,
            cancel: self.cancel.unwrap_or_default(),
            config,
            stream_id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            sequence: AtomicU64::new(0),
        })
    }
}

impl<M: Send + 'static> Default for ObserverBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream observer delivering events to a [`HandlerRegistry`].
///
/// At most one callback of the observer is in flight at any time.
pub struct DefaultStreamObserver<M> {
    registry: Arc<HandlerRegistry<M>>,
    gate: ThrottleGate,
    invoker: Arc<dyn Invoker>,
    cancel: CancellationToken,
    config: ObserverConfig,
    stream_id: u64,
    sequence: AtomicU64,
}

impl<M: Send + 'static> DefaultStreamObserver<M> {
    /// Create a new observer builder.
    pub fn builder() -> ObserverBuilder<M> {
        ObserverBuilder::new()
    }

    /// Create an observer from its parts.
    ///
    /// `registry` is `None` when the caller has no handler to attach, which
    /// fails with `Configuration`.
    pub fn new(
        invoker: Arc<dyn Invoker>,
        registry: Option<HandlerRegistry<M>>,
        gate: ThrottleGate,
    ) -> Result<Self> {
        let mut builder = ObserverBuilder::new().invoker(invoker).gate(gate);
        builder.registry = registry;
        builder.build()
    }

    /// Deliver a message frame.
    pub async fn dispatch_message(&self, message: StreamMessage<M>) -> Result<()> {
        let registered = self.resolve(CallbackKind::Message, self.registry.message())?;

        let (payload, headers, _) = message.into_parts();
        let args = Arguments::assemble(registered.descriptor().signature(), payload, headers);

        self.schedule(CallbackKind::Message, registered, args).await
    }

    /// Deliver a stream failure.
    ///
    /// The callback receives the transport status translated into a
    /// [`ConnectorError`], never the payload.
    pub async fn dispatch_error(&self, message: StreamMessage<M>) -> Result<()> {
        let registered = self.resolve(CallbackKind::Error, self.registry.error())?;

        let (_, headers, status) = message.into_parts();
        let error = match status {
            Some(status) => ConnectorError::from_status(&status),
            None => ConnectorError::from_status(&Status::unknown(MISSING_STATUS_MESSAGE)),
        };
        let args = Arguments::assemble(registered.descriptor().signature(), Some(error), headers);

        self.schedule(CallbackKind::Error, registered, args).await
    }

    /// Deliver stream completion.
    ///
    /// A completion callback declaring headers gets an empty carrier.
    pub async fn dispatch_completed(&self) -> Result<()> {
        let registered = self.resolve(CallbackKind::Completed, self.registry.completed())?;

        let args = Arguments::assemble(registered.descriptor().signature(), None, Headers::new());

        self.schedule(CallbackKind::Completed, registered, args).await
    }

    /// Transport entry point for a message frame.
    pub async fn deliver_message(&self, payload: Option<M>, headers: Headers) -> Result<()> {
        self.dispatch_message(StreamMessage::new(payload, headers))
            .await
    }

    /// Transport entry point for a stream failure.
    pub async fn deliver_error(&self, status: Status, headers: Headers) -> Result<()> {
        self.dispatch_error(StreamMessage::error(status, headers))
            .await
    }

    /// Transport entry point for stream completion.
    pub async fn deliver_completion(&self) -> Result<()> {
        self.dispatch_completed().await
    }

    fn resolve<'a, T>(
        &self,
        kind: CallbackKind,
        registered: Option<&'a Registered<T>>,
    ) -> Result<&'a Registered<T>> {
        registered.ok_or_else(|| {
            let err = ObserverError::MissingCallback(kind);
            tracing::error!(stream_id = self.stream_id, "{}", err);
            err
        })
    }

    async fn admit(&self) -> Result<ThrottlePermit> {
        self.gate
            .acquire_with(
                &self.cancel,
                self.config.acquire_timeout,
                self.config.stall_warning,
            )
            .await
            .inspect_err(|err| tracing::error!(stream_id = self.stream_id, "{}", err))
    }

    async fn schedule<T: Send + 'static>(
        &self,
        kind: CallbackKind,
        registered: &Registered<T>,
        args: Arguments<T>,
    ) -> Result<()> {
        let permit = self.admit().await?;

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let metadata = Metadata::new(kind, self.stream_id, sequence);
        tracing::debug!(
            "Dispatching {} #{} of stream {}",
            kind,
            sequence,
            self.stream_id
        );

        let callback = registered.callback();
        let call: BoxFuture<'static, HandlerResult> =
            Box::pin(async move { callback.call(args).await });

        self.invoker
            .invoke(metadata, call, Completion::new(metadata, permit));
        Ok(())
    }

    /// Identifier of this observer, unique within the process.
    #[inline]
    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// Number of events admitted so far.
    pub fn dispatched(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Admission gate, possibly shared with other observers.
    pub fn gate(&self) -> &ThrottleGate {
        &self.gate
    }

    /// Callbacks this observer dispatches to.
    pub fn registry(&self) -> &HandlerRegistry<M> {
        &self.registry
    }

    /// Effective configuration.
    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Token aborting admission waits; see [`interrupt`](Self::interrupt).
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Abort pending and future admission waits.
    ///
    /// The token stays cancelled; later events fail with `Interrupted`.
    pub fn interrupt(&self) {
        self.cancel.cancel();
    }

    /// Wait until no callback of this observer is in flight.
    pub async fn wait_idle(&self) -> Result<()> {
        self.gate.wait_idle().await
    }
}

impl<M: Send + 'static> StreamObserver<M> for DefaultStreamObserver<M> {
    fn on_message(&self, message: StreamMessage<M>) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.dispatch_message(message))
    }

    fn on_error(&self, message: StreamMessage<M>) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.dispatch_error(message))
    }

    fn on_completed(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.dispatch_completed())
    }
}
