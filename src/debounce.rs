//! Trailing debounce with a single owned timer slot.
//!
//! DESIGN
//! ======
//! Each `Debouncer` owns one slot. Scheduling a new action aborts the
//! pending timer, so only the last action before a quiet period runs.
//! Once the delay elapses the action is spawned as its own task: cancelling
//! the debouncer afterwards stops future timers, never a write in flight.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

pub struct Debouncer {
    delay: Duration,
    slot: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay, slot: Mutex::new(None) }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `action` after the quiet period, replacing any pending action.
    /// Returns `true` if a pending action was cancelled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, action: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(action);
        });

        let previous = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .replace(handle);
        previous.is_some_and(abort_if_pending)
    }

    /// Drop the pending action, if any. Returns `true` if one was cancelled.
    pub fn cancel(&self) -> bool {
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        previous.is_some_and(abort_if_pending)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

fn abort_if_pending(handle: JoinHandle<()>) -> bool {
    let pending = !handle.is_finished();
    handle.abort();
    pending
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
