//! Trailing-edge debouncer.
//!
//! A [`ScheduledTask`] holds at most one pending action. Scheduling again
//! replaces it and restarts the timer. Once the timer has fired and the
//! action started, cancelling no longer affects it.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;

type Action = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;
type ActionSlot = Arc<Mutex<Option<Action>>>;

struct Pending {
    action: ActionSlot,
    timer: JoinHandle<()>,
}

pub struct ScheduledTask {
    delay: Duration,
    pending: Mutex<Option<Pending>>,
}

impl ScheduledTask {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: Mutex::new(None) }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `action` after the delay, replacing any pending action
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: Action = Box::new(move || action().boxed());
        let slot: ActionSlot = Arc::new(Mutex::new(Some(action)));

        let delay = self.delay;
        let timer_slot = slot.clone();
        let timer = tokio::spawn(async move {
            sleep(delay).await;
            let due = timer_slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(action) = due {
                action().await;
            }
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Pending { action: slot, timer });
        if let Some(previous) = previous {
            disarm(previous);
        }
    }

    /// Drop the pending action if it has not started. Returns true when
    /// something was cancelled.
    pub fn cancel(&self) -> bool {
        self.take_pending().is_some()
    }

    /// Run the pending action now instead of waiting. Returns true when
    /// there was one.
    pub async fn flush(&self) -> bool {
        match self.take_pending() {
            Some(action) => {
                action().await;
                true
            }
            None => false,
        }
    }

    /// True while an action waits for its timer
    pub fn is_pending(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending
            .as_ref()
            .map(|p| p.action.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .unwrap_or(false)
    }

    fn take_pending(&self) -> Option<Action> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner).take()?;
        disarm(pending)
    }
}

/// Take the action back from a pending timer; the timer is aborted only if
/// it had not started the action yet
fn disarm(pending: Pending) -> Option<Action> {
    let action = pending.action.lock().unwrap_or_else(PoisonError::into_inner).take();
    if action.is_some() {
        pending.timer.abort();
    }
    action
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
