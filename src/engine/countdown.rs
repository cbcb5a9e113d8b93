//! Cancellable countdown primitive
//!
//! A countdown from `n` emits `n, n-1, ..., 0` through its tick callback,
//! one value per interval, then calls its completion callback once. The
//! first tick is emitted synchronously from [`Countdown::start`]; the rest
//! are driven by a tokio task that stops as soon as the handle is
//! cancelled.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Entry point for starting countdowns.
pub struct Countdown;

impl Countdown {
    /// Starts a countdown from `from`.
    ///
    /// `on_tick(from)` runs before this function returns. With `from == 0`
    /// the completion callback also runs synchronously and no task is
    /// spawned; otherwise a task must be able to spawn on the current tokio
    /// runtime.
    pub fn start<T, C>(from: u32, interval: Duration, mut on_tick: T, on_complete: C) -> CountdownHandle
    where
        T: FnMut(u32) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        on_tick(from);

        if from == 0 {
            on_complete();
            return CountdownHandle { cancel, task: None };
        }

        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut remaining = from;
            while remaining > 0 {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        trace!(remaining, "countdown cancelled");
                        return;
                    }
                    () = tokio::time::sleep(interval) => {
                        remaining -= 1;
                        on_tick(remaining);
                    }
                }
            }
            on_complete();
        });

        CountdownHandle {
            cancel,
            task: Some(task),
        }
    }

    /// Runs `on_complete` once after `delay`, unless cancelled first.
    ///
    /// Built on a one-step countdown; the intermediate ticks are discarded.
    pub fn once<C>(delay: Duration, on_complete: C) -> CountdownHandle
    where
        C: FnOnce() + Send + 'static,
    {
        Self::start(1, delay, |_| {}, on_complete)
    }
}

/// Owner handle for a running countdown.
///
/// Dropping the handle does not stop the countdown; call
/// [`cancel`](Self::cancel) or hand it to a [`CountdownSlot`].
#[derive(Debug)]
pub struct CountdownHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CountdownHandle {
    /// Stops further ticks and suppresses completion. No-op once finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the countdown completed or was cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cancel.is_cancelled() || self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

/// Holds at most one countdown for a single owner.
///
/// Putting a new countdown in the slot cancels the previous one, so an
/// owner never has two tick streams running at once.
#[derive(Debug, Default)]
pub struct CountdownSlot {
    current: Option<CountdownHandle>,
}

impl CountdownSlot {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Stores `handle`, cancelling any countdown already in the slot.
    pub fn replace(&mut self, handle: CountdownHandle) {
        if let Some(previous) = self.current.replace(handle) {
            previous.cancel();
        }
    }

    /// Cancels and forgets the current countdown, if any.
    pub fn cancel(&mut self) {
        if let Some(previous) = self.current.take() {
            previous.cancel();
        }
    }

    /// Returns `true` while the slot holds an unfinished countdown.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for CountdownSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
