//! Fixed-interval polling fallback.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Runs `tick` every `period` until dropped or stopped. The first tick
/// fires one full period after start; the board was just loaded.
pub struct Poller {
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                debug!(?period, "poll tick");
                if !tick().await {
                    break;
                }
            }
        });
        Self { period, task: Mutex::new(Some(task)) }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
