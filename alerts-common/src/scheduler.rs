//! Delayed execution with exponential backoff
//!
//! The [`Scheduler`] runs deferred actions on the current tokio runtime and
//! keeps every pending timer in a binding table so that disposing the
//! scheduler cancels them all at once. [`Scheduler::backoff`] drives a retry
//! sequence as a small state machine on top of [`Scheduler::schedule`].
//!
//! # Timer table invariant
//!
//! A token is present in the table only while its timer has neither fired nor
//! been cancelled. A firing timer removes its own entry before running the
//! action; if the entry is already gone the timer was cancelled and the action
//! is skipped. Disposal closes the table and drains it under the same lock, so
//! no action starts once disposal has begun.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;

use crate::disposable::Disposable;
use crate::error::{BoxError, Result, SchedulerError};
use crate::event::panic_message;

/// Base delay used by attempts after the first when a policy has none
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Opaque identifier of a pending timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Retry policy for [`Scheduler::backoff`]
///
/// Attempt 0 waits `base_delay` (zero when unset). Attempt `k >= 1` waits
/// `base * 2^k`, where `base` falls back to [`DEFAULT_BACKOFF_BASE`]. With
/// `max_attempts = Some(n)` and `n > 0`, the sequence fails once the failure
/// count exceeds `n`, so at most `n + 1` attempts run. `None` or `Some(0)`
/// retries forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackoffPolicy {
    /// Delay before the first attempt, and the base of the exponential growth
    pub base_delay: Option<Duration>,
    /// Failure count after which the sequence gives up
    pub max_attempts: Option<u32>,
}

impl BackoffPolicy {
    /// Create a policy with an explicit base delay and attempt limit
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay: Some(base_delay),
            max_attempts: Some(max_attempts),
        }
    }

    /// Create a policy that retries forever
    pub fn unlimited(base_delay: Duration) -> Self {
        Self {
            base_delay: Some(base_delay),
            max_attempts: None,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = Some(base_delay);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay before the attempt that follows `failures` failed attempts
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.base_delay.unwrap_or(Duration::ZERO);
        }

        let base = self.base_delay.unwrap_or(DEFAULT_BACKOFF_BASE);
        base.saturating_mul(2u32.saturating_pow(failures))
    }

    /// Whether `failures` failed attempts exhaust this policy
    pub fn is_exhausted(&self, failures: u32) -> bool {
        match self.max_attempts {
            Some(max) if max > 0 => failures > max,
            _ => false,
        }
    }
}

/// Attempt counter driving one backoff sequence
#[derive(Debug, Clone)]
struct BackoffState {
    policy: BackoffPolicy,
    failures: u32,
}

impl BackoffState {
    fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    fn next_delay(&self) -> Option<Duration> {
        if self.policy.is_exhausted(self.failures) {
            None
        } else {
            Some(self.policy.delay_for(self.failures))
        }
    }

    fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }
}

#[derive(Default)]
struct TimerTable {
    closed: bool,
    pending: HashMap<TimerToken, Disposable>,
}

struct Inner {
    timers: Arc<Mutex<TimerTable>>,
    lifecycle: Disposable,
    next_token: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.lifecycle.dispose();
    }
}

/// Cancellable delayed-execution engine
///
/// Cloning a `Scheduler` shares the same timer table. Pending timers are
/// cancelled by [`Scheduler::dispose`] or when the last handle is dropped.
///
/// # Example
///
/// ```rust,ignore
/// use alerts_common::{BackoffPolicy, Scheduler};
/// use std::time::Duration;
///
/// let scheduler = Scheduler::new();
///
/// let value = scheduler
///     .schedule(|| async { Ok::<_, std::io::Error>(42) }, Duration::from_millis(50), "answer")?
///     .await?;
///
/// let connected = scheduler
///     .backoff(|| async { try_connect().await }, BackoffPolicy::new(Duration::from_millis(100), 5), "connect")?
///     .await?;
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Create a live scheduler with no pending timers
    pub fn new() -> Self {
        let timers = Arc::new(Mutex::new(TimerTable::default()));

        let lifecycle = {
            let timers = Arc::clone(&timers);
            Disposable::from_action(move || {
                let pending = {
                    let mut table = lock(&timers);
                    table.closed = true;
                    mem::take(&mut table.pending)
                };

                tracing::debug!(
                    "Scheduler disposing, cancelling {} pending timers",
                    pending.len()
                );

                for (_, binding) in pending {
                    binding.dispose();
                }
            })
        };

        Self {
            inner: Arc::new(Inner {
                timers,
                lifecycle,
                next_token: AtomicU64::new(0),
            }),
        }
    }

    /// Run `action` once after `delay`
    ///
    /// Fails immediately with [`SchedulerError::Disposed`] once the scheduler
    /// is disposed, without invoking `action`. The returned future resolves
    /// with the action's output, or with [`SchedulerError::Cancelled`] if the
    /// timer is cancelled first. A panic inside the action is reported as
    /// [`SchedulerError::Action`]. Dropping the future does not cancel the
    /// timer.
    pub fn schedule<F, Fut, T, E>(
        &self,
        action: F,
        delay: Duration,
        description: impl Into<String>,
    ) -> Result<Scheduled<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let description = description.into();
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SchedulerError::NoRuntime(e.to_string()))?;

        let token = TimerToken(self.inner.next_token.fetch_add(1, Ordering::Relaxed));
        let (result_tx, result_rx) = oneshot::channel();

        let mut table = lock(&self.inner.timers);
        if table.closed {
            return Err(SchedulerError::Disposed);
        }

        let task = {
            let timers = Arc::clone(&self.inner.timers);
            let description = description.clone();
            runtime.spawn(async move {
                tokio::time::sleep(delay).await;

                if lock(&timers).pending.remove(&token).is_none() {
                    return;
                }

                tracing::trace!("{} fired: {}", token, description);

                let outcome = match AssertUnwindSafe(async move { action().await })
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result.map_err(|e| SchedulerError::Action {
                        description,
                        source: e.into(),
                    }),
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        tracing::error!("{} panicked: {}", token, message);
                        Err(SchedulerError::Action {
                            description,
                            source: format!("action panicked: {message}").into(),
                        })
                    }
                };
                let _ = result_tx.send(outcome);
            })
        };

        let binding = {
            let abort = task.abort_handle();
            let timers: Weak<Mutex<TimerTable>> = Arc::downgrade(&self.inner.timers);
            Disposable::from_action(move || {
                abort.abort();
                if let Some(timers) = timers.upgrade() {
                    lock(&timers).pending.remove(&token);
                }
            })
        };

        table.pending.insert(token, binding);
        drop(table);

        tracing::debug!("Scheduled {} in {:?}: {}", token, delay, description);

        Ok(Scheduled {
            token,
            description,
            result_rx,
        })
    }

    /// Retry `action` with exponentially growing delays
    ///
    /// `Ok(Some(value))` ends the sequence with `value`. `Ok(None)` and
    /// `Err(_)` are treated alike and schedule another attempt, so an action
    /// whose legitimate result is "nothing" keeps being retried. A panicking
    /// attempt counts as a failed one.
    ///
    /// Fails with [`SchedulerError::AttemptsExhausted`] when the policy runs
    /// out, and with [`SchedulerError::Cancelled`] or
    /// [`SchedulerError::Disposed`] if the scheduler is disposed mid-sequence;
    /// the action is never invoked again after disposal.
    pub fn backoff<F, Fut, T, E>(
        &self,
        action: F,
        policy: BackoffPolicy,
        description: impl Into<String>,
    ) -> Result<BoxFuture<'static, Result<T>>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Option<T>, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        if self.is_disposed() {
            return Err(SchedulerError::Disposed);
        }

        let scheduler = Arc::downgrade(&self.inner);
        let action = Arc::new(action);
        let description = description.into();

        Ok(async move {
            let mut state = BackoffState::new(policy);

            loop {
                let Some(delay) = state.next_delay() else {
                    tracing::warn!(
                        "Giving up on {} after {} attempts",
                        description,
                        state.failures
                    );
                    return Err(SchedulerError::AttemptsExhausted {
                        description,
                        attempts: state.failures,
                    });
                };

                let attempt = state.failures + 1;

                let scheduled = {
                    let inner = scheduler.upgrade().ok_or(SchedulerError::Disposed)?;
                    let action = Arc::clone(&action);
                    Scheduler { inner }.schedule(
                        move || (*action)(),
                        delay,
                        format!("{description}, attempt {attempt}"),
                    )?
                };

                match scheduled.await {
                    Ok(Some(value)) => return Ok(value),
                    Ok(None) => {
                        tracing::debug!("{} attempt {} produced no result", description, attempt);
                    }
                    Err(error) if error.is_terminal() => return Err(error),
                    Err(error) => {
                        tracing::debug!("{} attempt {} failed: {}", description, attempt, error);
                    }
                }

                state.record_failure();
            }
        }
        .boxed())
    }

    /// Cancel every pending timer and reject further scheduling
    pub fn dispose(&self) {
        self.inner.lifecycle.dispose();
    }

    /// Whether disposal has begun
    pub fn is_disposed(&self) -> bool {
        lock(&self.inner.timers).closed
    }

    /// Number of timers that have neither fired nor been cancelled
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.timers).pending.len()
    }

    /// The scheduler's own lifecycle handle, for composing with other resources
    pub fn as_disposable(&self) -> Disposable {
        self.inner.lifecycle.clone()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = lock(&self.inner.timers);
        f.debug_struct("Scheduler")
            .field("disposed", &table.closed)
            .field("pending", &table.pending.len())
            .finish()
    }
}

/// Deferred result of [`Scheduler::schedule`]
pub struct Scheduled<T> {
    token: TimerToken,
    description: String,
    result_rx: oneshot::Receiver<Result<T>>,
}

impl<T> Scheduled<T> {
    /// Token of the underlying timer
    pub fn token(&self) -> TimerToken {
        self.token
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl<T> Future for Scheduled<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.result_rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(SchedulerError::Cancelled {
                description: this.description.clone(),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Scheduled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduled")
            .field("token", &self.token)
            .field("description", &self.description)
            .finish()
    }
}

fn lock(timers: &Mutex<TimerTable>) -> MutexGuard<'_, TimerTable> {
    timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
