//! Provider lifecycle state machine.
//!
//! Every pluggable backend (filesystem or sandbox executor) moves through the
//! same states: pending → initializing → ready → starting → running →
//! stopping → stopped → destroying → destroyed, with an absorbing `error`
//! state. Transitions are idempotent and safe under concurrent invocation:
//! each transition keeps an in-flight handle (a shared future) so concurrent
//! callers observe a single underlying side effect and a single outcome.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// States a provider moves through over its lifetime.
///
/// `Error` is terminal for the transition that produced it, not for the
/// instance: a later retry of the same transition starts a fresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderState {
    Pending,
    Initializing,
    Ready,
    Starting,
    Running,
    Stopping,
    Stopped,
    Destroying,
    Destroyed,
    Error,
}

impl std::fmt::Display for ProviderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderState::Pending => "pending",
            ProviderState::Initializing => "initializing",
            ProviderState::Ready => "ready",
            ProviderState::Starting => "starting",
            ProviderState::Running => "running",
            ProviderState::Stopping => "stopping",
            ProviderState::Stopped => "stopped",
            ProviderState::Destroying => "destroying",
            ProviderState::Destroyed => "destroyed",
            ProviderState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Failure of a lifecycle transition.
///
/// Cloneable so a single in-flight failure can be fanned out verbatim to
/// every waiting caller.
#[derive(Debug, Clone, Error)]
#[error("{op} failed: {message}")]
pub struct TransitionError {
    /// Which transition failed ("init", "start", "stop", "destroy").
    pub op: &'static str,
    /// Rendered cause chain of the wrapped operation's error.
    pub message: String,
}

type Flight = Shared<BoxFuture<'static, Result<(), TransitionError>>>;

/// The in-flight handle for one transition.
///
/// Set under the lock before the first await point, cleared after the
/// attempt settles (success or failure) so a retry always starts fresh.
#[derive(Default)]
struct Slot(Mutex<Option<Flight>>);

/// Race-safe lifecycle controller, embedded by each provider instance.
///
/// Business logic never mutates [`ProviderState`] directly; it hands the
/// actual setup/teardown routine to `init`/`start`/`stop`/`destroy` and the
/// controller does the state bookkeeping around it.
pub struct Lifecycle {
    state: Arc<Mutex<ProviderState>>,
    init: Slot,
    start: Slot,
    stop: Slot,
    destroy: Slot,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState::Pending)),
            init: Slot::default(),
            start: Slot::default(),
            stop: Slot::default(),
            destroy: Slot::default(),
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> ProviderState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set(state: &Arc<Mutex<ProviderState>>, next: ProviderState) {
        let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
        debug!(from = %*guard, to = %next, "lifecycle transition");
        *guard = next;
    }

    /// Run `op` as the provider's initialization.
    ///
    /// No-op when already `ready`. If an init is in flight, joins it instead
    /// of running a second one. Permitted again after `destroyed` (reconnect).
    pub async fn init<F, Fut>(&self, op: F) -> Result<(), TransitionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.transition(
            &self.init,
            "init",
            ProviderState::Ready,
            ProviderState::Initializing,
            ProviderState::Ready,
            op,
        )
        .await
    }

    /// Run `op` as the provider's startup. No-op when already `running`.
    pub async fn start<F, Fut>(&self, op: F) -> Result<(), TransitionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.transition(
            &self.start,
            "start",
            ProviderState::Running,
            ProviderState::Starting,
            ProviderState::Running,
            op,
        )
        .await
    }

    /// Run `op` as the provider's shutdown. No-op when already `stopped`.
    pub async fn stop<F, Fut>(&self, op: F) -> Result<(), TransitionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.transition(
            &self.stop,
            "stop",
            ProviderState::Stopped,
            ProviderState::Stopping,
            ProviderState::Stopped,
            op,
        )
        .await
    }

    /// Run `op` as the provider's teardown.
    ///
    /// If an `init` is in flight, waits for it to settle first (ignoring its
    /// outcome) so destruction never races a half-finished setup. No-op when
    /// already `destroyed`.
    pub async fn destroy<F, Fut>(&self, op: F) -> Result<(), TransitionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let pending_init = self
            .init
            .0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(flight) = pending_init {
            let _ = flight.await;
        }

        self.transition(
            &self.destroy,
            "destroy",
            ProviderState::Destroyed,
            ProviderState::Destroying,
            ProviderState::Destroyed,
            op,
        )
        .await
    }

    async fn transition<F, Fut>(
        &self,
        slot: &Slot,
        op_name: &'static str,
        settled: ProviderState,
        during: ProviderState,
        on_success: ProviderState,
        op: F,
    ) -> Result<(), TransitionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let flight = {
            let mut guard = slot.0.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = guard.as_ref() {
                existing.clone()
            } else {
                if self.state() == settled {
                    return Ok(());
                }
                // The handle must be in the slot before any caller can
                // suspend, so concurrent callers join this attempt instead of
                // launching a second one.
                Self::set(&self.state, during);
                let state = Arc::clone(&self.state);
                let fut = op();
                let flight: Flight = async move {
                    match fut.await {
                        Ok(()) => {
                            Self::set(&state, on_success);
                            Ok(())
                        }
                        Err(e) => {
                            Self::set(&state, ProviderState::Error);
                            Err(TransitionError {
                                op: op_name,
                                message: format!("{e:#}"),
                            })
                        }
                    }
                }
                .boxed()
                .shared();
                *guard = Some(flight.clone());
                flight
            }
        };

        let result = flight.clone().await;

        // Clear the slot no matter how the attempt ended, but only if it
        // still holds this attempt (a retry may already be in flight).
        let mut guard = slot.0.lock().unwrap_or_else(|e| e.into_inner());
        if guard.as_ref().is_some_and(|f| Flight::ptr_eq(f, &flight)) {
            *guard = None;
        }
        drop(guard);

        result
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_init_runs_setup_once() {
        let lc = Arc::new(Lifecycle::new());
        let count = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let lc = Arc::clone(&lc);
            let count = Arc::clone(&count);
            handles.push(tokio::spawn(async move {
                lc.init(move || async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(())
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(lc.state(), ProviderState::Ready);
    }

    #[tokio::test]
    async fn init_is_noop_once_ready() {
        let lc = Lifecycle::new();
        let count = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let count = Arc::clone(&count);
            lc.init(move || async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn init_failure_propagates_and_allows_retry() {
        let lc = Lifecycle::new();

        let err = lc
            .init(|| async { anyhow::bail!("setup exploded") })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("setup exploded"));
        assert_eq!(lc.state(), ProviderState::Error);

        // The in-flight handle was cleared, so a retry runs a fresh attempt.
        lc.init(|| async { Ok(()) }).await.unwrap();
        assert_eq!(lc.state(), ProviderState::Ready);
    }

    #[tokio::test]
    async fn concurrent_init_failure_reaches_every_caller() {
        let lc = Arc::new(Lifecycle::new());
        let count = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let lc = Arc::clone(&lc);
            let count = Arc::clone(&count);
            handles.push(tokio::spawn(async move {
                lc.init(move || async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    anyhow::bail!("shared failure")
                })
                .await
            }));
        }

        let mut failures = 0;
        for h in handles {
            if h.await.unwrap().is_err() {
                failures += 1;
            }
        }
        assert_eq!(failures, 3);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn destroy_twice_runs_teardown_at_most_once() {
        let lc = Lifecycle::new();
        let count = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let count = Arc::clone(&count);
            lc.destroy(move || async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(lc.state(), ProviderState::Destroyed);
    }

    #[tokio::test]
    async fn destroy_waits_for_inflight_init() {
        let lc = Arc::new(Lifecycle::new());
        let init_done = Arc::new(AtomicBool::new(false));

        let init_lc = Arc::clone(&lc);
        let init_flag = Arc::clone(&init_done);
        let init_task = tokio::spawn(async move {
            init_lc
                .init(move || async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    init_flag.store(true, Ordering::SeqCst);
                    Ok(())
                })
                .await
        });

        // Give the init attempt time to take the slot.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let observed = Arc::new(AtomicBool::new(false));
        let obs = Arc::clone(&observed);
        let flag = Arc::clone(&init_done);
        lc.destroy(move || async move {
            obs.store(flag.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        init_task.await.unwrap().unwrap();
        assert!(
            observed.load(Ordering::SeqCst),
            "teardown ran before init settled"
        );
    }

    #[tokio::test]
    async fn init_after_destroy_reconnects() {
        let lc = Lifecycle::new();
        lc.init(|| async { Ok(()) }).await.unwrap();
        lc.destroy(|| async { Ok(()) }).await.unwrap();
        assert_eq!(lc.state(), ProviderState::Destroyed);

        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        lc.init(move || async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(lc.state(), ProviderState::Ready);
    }

    #[tokio::test]
    async fn start_and_stop_round_trip() {
        let lc = Lifecycle::new();
        lc.start(|| async { Ok(()) }).await.unwrap();
        assert_eq!(lc.state(), ProviderState::Running);
        lc.stop(|| async { Ok(()) }).await.unwrap();
        assert_eq!(lc.state(), ProviderState::Stopped);
    }
}
