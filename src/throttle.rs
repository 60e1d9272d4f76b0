//! Admission gate bounding in-flight callbacks to one per observer.
//!
//! The [`ThrottleGate`] holds a single permit. The observer acquires it before
//! scheduling a callback and the permit travels with the invocation until the
//! callback has finished, so no two callbacks of the same stream ever overlap.
//! Waiters are admitted first-come first-served, which keeps events in the
//! order the transport delivered them.
//!
//! # Usage
//!
//! ```
//! use grpc_stream_observer::throttle::ThrottleGate;
//!
//! # tokio_test_block_on(async {
//! let gate = ThrottleGate::new();
//! let permit = gate.acquire().await.unwrap();
//! assert_eq!(gate.in_flight(), 1);
//!
//! permit.release();
//! assert!(gate.is_idle());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```
//!
//! # Waiting
//!
//! A plain [`acquire`](ThrottleGate::acquire) waits without limit. Use
//! [`acquire_with`](ThrottleGate::acquire_with) to add a cancellation token,
//! a timeout, or a stall warning.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{ObserverError, Result};

/// Number of permits held by a gate.
pub const GATE_CAPACITY: usize = 1;

/// Capacity-1 admission gate.
///
/// Clones share the same permit.
#[derive(Debug, Clone)]
pub struct ThrottleGate {
    semaphore: Arc<Semaphore>,
}

impl ThrottleGate {
    /// Create a gate with its permit available.
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(GATE_CAPACITY)),
        }
    }

    /// Number of outstanding permits, 0 or 1.
    #[inline]
    pub fn in_flight(&self) -> usize {
        GATE_CAPACITY.saturating_sub(self.semaphore.available_permits())
    }

    /// True if no permit is outstanding.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }

    /// Take the permit without waiting.
    ///
    /// Returns `Err(GateBusy)` if a callback is in flight, `Err(Interrupted)`
    /// if the gate is closed.
    pub fn try_acquire(&self) -> Result<ThrottlePermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(ThrottlePermit::new(permit)),
            Err(tokio::sync::TryAcquireError::NoPermits) => Err(ObserverError::GateBusy),
            Err(tokio::sync::TryAcquireError::Closed) => Err(ObserverError::Interrupted),
        }
    }

    /// Wait for the permit.
    ///
    /// Returns `Err(Interrupted)` if the gate is closed while waiting.
    pub async fn acquire(&self) -> Result<ThrottlePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map(ThrottlePermit::new)
            .map_err(|_| ObserverError::Interrupted)
    }

    /// Wait for the permit, giving up on cancellation or timeout.
    ///
    /// * `cancel` - aborts the wait with `Err(Interrupted)`; an already
    ///   cancelled token fails immediately
    /// * `timeout` - aborts the wait with `Err(AcquireTimeout)`
    /// * `stall_warning` - logs a warning once if the wait lasts longer
    ///
    /// An idle gate admits immediately without touching the timer, so
    /// timers are only needed when the permit is contended and `timeout` or
    /// `stall_warning` is set.
    pub async fn acquire_with(
        &self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
        stall_warning: Option<Duration>,
    ) -> Result<ThrottlePermit> {
        if cancel.is_cancelled() {
            return Err(ObserverError::Interrupted);
        }

        match self.try_acquire() {
            Err(ObserverError::GateBusy) => {}
            res => return res,
        }

        let wait = self.acquire_warning_on_stall(stall_warning);

        match timeout {
            Some(limit) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ObserverError::Interrupted),
                res = tokio::time::timeout(limit, wait) => {
                    res.map_err(|_| ObserverError::AcquireTimeout(limit))?
                }
            },
            None => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ObserverError::Interrupted),
                res = wait => res,
            },
        }
    }

    async fn acquire_warning_on_stall(
        &self,
        stall_warning: Option<Duration>,
    ) -> Result<ThrottlePermit> {
        let Some(after) = stall_warning else {
            return self.acquire().await;
        };

        let acquire = self.acquire();
        tokio::pin!(acquire);

        tokio::select! {
            res = &mut acquire => return res,
            _ = tokio::time::sleep(after) => {
                tracing::warn!(
                    "Admission wait exceeded {:?}, previous callback still in flight",
                    after
                );
            }
        }

        acquire.await
    }

    /// Wait until no callback is in flight.
    pub async fn wait_idle(&self) -> Result<()> {
        self.acquire().await.map(ThrottlePermit::release)
    }

    /// Close the gate, interrupting every pending and future acquire.
    ///
    /// A permit already handed out stays valid until released.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// True once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

/// Whether the runtime of the calling context has a time driver.
///
/// Returns `false` outside of a tokio runtime.
pub fn timers_enabled() -> bool {
    if Handle::try_current().is_err() {
        return false;
    }
    // tokio panics when a timer is created without a time driver
    std::panic::catch_unwind(|| drop(tokio::time::sleep(Duration::ZERO))).is_ok()
}

impl Default for ThrottleGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Permit of a [`ThrottleGate`].
///
/// Released exactly once: by [`release`](Self::release) or on drop.
#[derive(Debug)]
pub struct ThrottlePermit {
    permit: OwnedSemaphorePermit,
}

impl ThrottlePermit {
    fn new(permit: OwnedSemaphorePermit) -> Self {
        Self { permit }
    }

    /// Return the permit to the gate.
    pub fn release(self) {
        drop(self.permit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_creation() {
        let gate = ThrottleGate::new();
        assert_eq!(gate.in_flight(), 0);
        assert!(gate.is_idle());
        assert!(!gate.is_closed());
    }

    #[test]
    fn test_try_acquire_at_capacity() {
        let gate = ThrottleGate::new();

        let permit = gate.try_acquire().unwrap();
        assert_eq!(gate.in_flight(), 1);

        let second = gate.try_acquire();
        assert!(matches!(second, Err(ObserverError::GateBusy)));
        assert_eq!(gate.in_flight(), 1);

        permit.release();
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn test_release_on_drop() {
        let gate = ThrottleGate::new();
        {
            let _permit = gate.try_acquire().unwrap();
            assert_eq!(gate.in_flight(), 1);
        }
        assert!(gate.is_idle());
    }

    #[test]
    fn test_clone_shares_permit() {
        let gate1 = ThrottleGate::new();
        let gate2 = gate1.clone();

        let _permit = gate1.try_acquire().unwrap();
        assert_eq!(gate2.in_flight(), 1);
        assert!(matches!(gate2.try_acquire(), Err(ObserverError::GateBusy)));
    }

    #[tokio::test]
    async fn test_acquire_immediate() {
        let gate = ThrottleGate::new();
        let _permit = gate.acquire().await.unwrap();
        assert_eq!(gate.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let gate = ThrottleGate::new();
        let permit = gate.try_acquire().unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            permit.release();
        });

        let permit = gate.acquire().await;
        assert!(permit.is_ok());
        assert_eq!(gate.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_close_interrupts_waiter() {
        let gate = ThrottleGate::new();
        let _held = gate.try_acquire().unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.close();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ObserverError::Interrupted)));
        assert!(matches!(gate.try_acquire(), Err(ObserverError::Interrupted)));
    }

    #[tokio::test]
    async fn test_acquire_with_cancel() {
        let gate = ThrottleGate::new();
        let _held = gate.try_acquire().unwrap();
        let cancel = CancellationToken::new();

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.acquire_with(&cancel, None, None).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ObserverError::Interrupted)));
        // the held permit is untouched
        assert_eq!(gate.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_acquire_with_already_cancelled() {
        let gate = ThrottleGate::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = gate.acquire_with(&cancel, None, None).await;
        assert!(matches!(result, Err(ObserverError::Interrupted)));
        assert!(gate.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_with_timeout() {
        let gate = ThrottleGate::new();
        let _held = gate.try_acquire().unwrap();

        let result = gate
            .acquire_with(&CancellationToken::new(), Some(Duration::from_millis(50)), None)
            .await;

        assert!(matches!(
            result,
            Err(ObserverError::AcquireTimeout(d)) if d == Duration::from_millis(50)
        ));
    }

    #[tokio::test]
    async fn test_acquire_with_stall_warning_still_admits() {
        let gate = ThrottleGate::new();
        let held = gate.try_acquire().unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            held.release();
        });

        let permit = gate
            .acquire_with(&CancellationToken::new(), None, Some(Duration::from_millis(1)))
            .await;
        assert!(permit.is_ok());
    }

    fn runtime_without_timers() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap()
    }

    #[test]
    fn test_idle_gate_admits_without_timers() {
        let runtime = runtime_without_timers();
        runtime.block_on(async {
            let gate = ThrottleGate::new();
            let cancel = CancellationToken::new();

            let permit = gate
                .acquire_with(
                    &cancel,
                    Some(Duration::from_secs(1)),
                    Some(Duration::from_secs(30)),
                )
                .await;
            assert!(permit.is_ok());
            assert_eq!(gate.in_flight(), 1);
        });
    }

    #[test]
    fn test_timers_enabled() {
        assert!(!timers_enabled());
        assert!(!runtime_without_timers().block_on(async { timers_enabled() }));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        assert!(runtime.block_on(async { timers_enabled() }));
    }

    #[tokio::test]
    async fn test_fast_path_keeps_fifo_order() {
        let gate = ThrottleGate::new();
        let held = gate.try_acquire().unwrap();
        let cancel = CancellationToken::new();

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.acquire_with(&cancel, None, None).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // the released permit goes to the queued waiter, not a late try
        held.release();
        assert!(matches!(gate.try_acquire(), Err(ObserverError::GateBusy)));
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_wait_idle() {
        let gate = ThrottleGate::new();
        let held = gate.try_acquire().unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(held);
        });

        gate.wait_idle().await.unwrap();
        assert!(gate.is_idle());
    }
}
