//! Polling data handle.
//!
//! Wraps a zero-argument async fetch and exposes the last successful result,
//! an in-flight flag, the last error message and a manual refresh trigger.
//!
//! - One fetch runs immediately on activation, then one per interval
//!   (an interval of zero disables the timer).
//! - Only one fetch is in flight at a time. A tick or refresh that arrives
//!   while one is outstanding is skipped.
//! - Stopping or dropping the poller cancels the timer, pending delayed
//!   refreshes and any in-flight fetch. Late responses are discarded.
//! - A failed fetch stores its message and keeps the previous data.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type FetchFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, String>> + Send + Sync>;

/// Observable state of a poller.
#[derive(Debug, Clone)]
pub struct PollState<T> {
    /// Last successful result
    pub data: Option<T>,
    /// A fetch is outstanding
    pub loading: bool,
    /// Message of the most recent failure, cleared by the next success
    pub error: Option<String>,
    /// When `data` was last replaced
    pub updated_at: Option<DateTime<Utc>>,
    /// Fetches started since activation
    pub fetches: u64,
}

impl<T> Default for PollState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            updated_at: None,
            fetches: 0,
        }
    }
}

/// What happened to a refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated,
    Failed,
    /// Another fetch was already in flight
    Skipped,
    /// The poller was stopped before or during the fetch
    Cancelled,
}

struct Shared<T> {
    label: &'static str,
    fetch: FetchFn<T>,
    state: watch::Sender<PollState<T>>,
    in_flight: AtomicBool,
    fetches: AtomicU64,
    cancel: CancellationToken,
}

impl<T: Clone + Send + Sync + 'static> Shared<T> {
    async fn run_fetch(&self) -> RefreshOutcome {
        if self.cancel.is_cancelled() {
            return RefreshOutcome::Cancelled;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!(poller = self.label, "Fetch already in flight, skipping");
            return RefreshOutcome::Skipped;
        }

        let fetches = self.fetches.fetch_add(1, Ordering::Relaxed) + 1;
        self.state.send_modify(|s| {
            s.loading = true;
            s.fetches = fetches;
        });

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = (self.fetch)() => Some(result),
        };
        self.in_flight.store(false, Ordering::Release);

        // Response arrived after deactivation
        if self.cancel.is_cancelled() {
            debug!(poller = self.label, "Discarding response after stop");
            self.state.send_modify(|s| s.loading = false);
            return RefreshOutcome::Cancelled;
        }

        match result {
            Some(Ok(data)) => {
                self.state.send_modify(|s| {
                    s.data = Some(data);
                    s.error = None;
                    s.loading = false;
                    s.updated_at = Some(Utc::now());
                });
                RefreshOutcome::Updated
            }
            Some(Err(message)) => {
                warn!(poller = self.label, error = %message, "Fetch failed");
                self.state.send_modify(|s| {
                    s.error = Some(message);
                    s.loading = false;
                });
                RefreshOutcome::Failed
            }
            None => {
                self.state.send_modify(|s| s.loading = false);
                RefreshOutcome::Cancelled
            }
        }
    }

    /// Like `run_fetch`, but waits out a fetch already in flight and then
    /// fetches again instead of skipping.
    async fn run_fetch_when_idle(&self) -> RefreshOutcome {
        let mut rx = self.state.subscribe();
        loop {
            match self.run_fetch().await {
                RefreshOutcome::Skipped => {
                    debug!(poller = self.label, "Fetch in flight, refreshing once it settles");
                    let settled = tokio::select! {
                        _ = self.cancel.cancelled() => false,
                        r = rx.wait_for(|s| !s.loading) => r.is_ok(),
                    };
                    if !settled {
                        return RefreshOutcome::Cancelled;
                    }
                    tokio::task::yield_now().await;
                }
                outcome => return outcome,
            }
        }
    }
}

/// Cloneable refresh trigger for a running poller.
pub struct RefreshHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for RefreshHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> RefreshHandle<T> {
    /// Fetch now, unless a fetch is already in flight.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.shared.run_fetch().await
    }

    /// Schedule a single refresh after `delay`.
    ///
    /// If a fetch is in flight when the delay expires, the refresh runs right
    /// after it instead of being skipped. Cancelled together with the poller.
    pub fn refresh_after(&self, delay: Duration) -> JoinHandle<RefreshOutcome> {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shared.cancel.cancelled() => RefreshOutcome::Cancelled,
                _ = tokio::time::sleep(delay) => shared.run_fetch_when_idle().await,
            }
        })
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> PollState<T> {
        self.shared.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        !self.shared.cancel.is_cancelled()
    }
}

/// Owner of a polling task. Dropping it stops polling.
pub struct Poller<T> {
    handle: RefreshHandle<T>,
    task: Option<JoinHandle<()>>,
}

impl<T: Clone + Send + Sync + 'static> Poller<T> {
    /// Start polling. Must be called inside a tokio runtime.
    pub fn spawn<F, Fut, E>(label: &'static str, fetch: F, interval: Duration) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let fetch: FetchFn<T> = Arc::new(move || {
            let fut = fetch();
            async move { fut.await.map_err(|e| e.to_string()) }.boxed()
        });

        let (state, _) = watch::channel(PollState::default());
        let shared = Arc::new(Shared {
            label,
            fetch,
            state,
            in_flight: AtomicBool::new(false),
            fetches: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        });

        debug!(poller = label, interval_ms = interval.as_millis() as u64, "Starting poller");

        let task_shared = shared.clone();
        let task = tokio::spawn(async move {
            task_shared.run_fetch().await;

            if interval.is_zero() {
                return;
            }

            let Some(start) = Instant::now().checked_add(interval) else {
                warn!(poller = task_shared.label, "Interval out of range, polling disabled");
                return;
            };
            let mut ticker = interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_shared.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        task_shared.run_fetch().await;
                    }
                }
            }

            debug!(poller = task_shared.label, "Poller timer cleared");
        });

        Self {
            handle: RefreshHandle { shared },
            task: Some(task),
        }
    }

    pub fn handle(&self) -> RefreshHandle<T> {
        self.handle.clone()
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<PollState<T>> {
        self.handle.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> PollState<T> {
        self.handle.snapshot()
    }

    /// Deactivate: clear the timer and discard anything still in flight.
    pub async fn stop(&mut self) {
        self.handle.shared.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<T> Drop for Poller<T> {
    fn drop(&mut self) {
        self.handle.shared.cancel.cancel();
    }
}
