//! Asynchronous invocation of user callbacks.
//!
//! The observer never runs user code on the transport's task. It binds the
//! callback and its arguments into a future and hands it to an [`Invoker`],
//! together with a [`Completion`] that owns the admission permit.
//!
//! # Architecture
//!
//! ```text
//! transport ─► observer ─► gate.acquire ─► Invoker::invoke ─► spawned task
//!                  ▲                                            │
//!                  └──────────── permit released ◄── Completion ┘
//! ```
//!
//! A [`Completion`] is consumed by exactly one of `notify_success` or
//! `notify_failure`. If the task is dropped before either runs (abort, panic
//! in user code, runtime shutdown) the permit is released on drop instead, so
//! the stream can never stall on a lost notification.

use tokio::runtime::Handle;
use tracing::Instrument;

use crate::connector::ConnectorError;
use crate::error::{ObserverError, Result};
use crate::handler::{BoxFuture, CallbackKind, HandlerResult};
use crate::throttle::ThrottlePermit;

/// Tag attached to every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// Which callback is invoked.
    pub kind: CallbackKind,
    /// Observer the event was delivered to.
    pub stream_id: u64,
    /// Admission order within the observer, starting at 1.
    pub sequence: u64,
}

impl Metadata {
    /// Tag an invocation.
    pub fn new(kind: CallbackKind, stream_id: u64, sequence: u64) -> Self {
        Self {
            kind,
            stream_id,
            sequence,
        }
    }

    /// Well-known name of the invoked callback.
    #[inline]
    pub fn resource_name(&self) -> &'static str {
        self.kind.resource_name()
    }
}

/// Completion notification for one invocation.
///
/// Holds the admission permit until the invocation is reported finished.
#[derive(Debug)]
pub struct Completion {
    metadata: Metadata,
    permit: Option<ThrottlePermit>,
}

impl Completion {
    /// Completion owning `permit` for the invocation tagged `metadata`.
    pub fn new(metadata: Metadata, permit: ThrottlePermit) -> Self {
        Self {
            metadata,
            permit: Some(permit),
        }
    }

    /// Tag of the invocation this completion reports.
    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Report a successful invocation and release the permit.
    pub fn notify_success(mut self) {
        tracing::trace!(
            "{} callback #{} of stream {} finished",
            self.metadata.kind,
            self.metadata.sequence,
            self.metadata.stream_id
        );
        self.release();
    }

    /// Report a failed invocation and release the permit.
    ///
    /// The error is logged, never re-raised.
    pub fn notify_failure(mut self, error: &ConnectorError) {
        tracing::error!(
            "{} callback #{} of stream {} failed: {}",
            self.metadata.kind,
            self.metadata.sequence,
            self.metadata.stream_id,
            error
        );
        self.release();
    }

    /// Report according to the callback's result.
    pub fn notify(self, result: &HandlerResult) {
        match result {
            Ok(()) => self.notify_success(),
            Err(e) => self.notify_failure(e),
        }
    }

    fn release(&mut self) {
        if let Some(permit) = self.permit.take() {
            permit.release();
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.permit.is_some() {
            tracing::warn!(
                "{} callback #{} of stream {} ended without completion, releasing permit",
                self.metadata.kind,
                self.metadata.sequence,
                self.metadata.stream_id
            );
            self.release();
        }
    }
}

/// Runs bound callback invocations asynchronously.
pub trait Invoker: Send + Sync + 'static {
    /// Schedule `call` and report its outcome through `completion`.
    ///
    /// Must return without waiting for `call` to finish. `completion` must be
    /// notified (or dropped) exactly once.
    fn invoke(
        &self,
        metadata: Metadata,
        call: BoxFuture<'static, HandlerResult>,
        completion: Completion,
    );
}

/// [`Invoker`] spawning each invocation as a tokio task.
#[derive(Debug, Clone)]
pub struct TokioInvoker {
    handle: Handle,
}

impl TokioInvoker {
    /// Invoker spawning onto the runtime behind `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Invoker bound to the runtime of the calling context.
    ///
    /// Fails with `Configuration` outside of a tokio runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ObserverError::Configuration(format!("No async runtime available: {e}")))
    }
}

impl Invoker for TokioInvoker {
    fn invoke(
        &self,
        metadata: Metadata,
        call: BoxFuture<'static, HandlerResult>,
        completion: Completion,
    ) {
        let span = tracing::debug_span!(
            "callback",
            kind = metadata.resource_name(),
            stream_id = metadata.stream_id,
            sequence = metadata.sequence
        );

        self.handle.spawn(
            async move {
                let result = call.await;
                completion.notify(&result);
            }
            .instrument(span),
        );
    }
}
