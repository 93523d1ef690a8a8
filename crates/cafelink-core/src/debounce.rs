//! Trailing-edge debouncer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

type Action = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs an action once a burst of triggers has been quiet for `delay`.
///
/// Each trigger restarts the timer; only the last one in a burst fires. The
/// action runs on its own task, so a trigger arriving while it runs starts a
/// new timer rather than cancelling it. Dropping the debouncer cancels any
/// pending timer.
pub struct Debouncer {
    delay: Duration,
    action: Action,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Creates an idle debouncer that runs `action` after `delay` of quiet.
    pub fn new<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            delay,
            action: Arc::new(move || action().boxed()),
            pending: Mutex::new(None),
        }
    }

    /// Restarts the quiet period.
    pub fn trigger(&self) {
        let mut pending = self.pending.lock();
        if let Some(timer) = pending.take() {
            timer.abort();
        }

        let delay = self.delay;
        let action = Arc::clone(&self.action);
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(action());
        }));
    }

    /// Drops a pending timer without firing.
    pub fn cancel(&self) {
        if let Some(timer) = self.pending.lock().take() {
            timer.abort();
        }
    }

    /// The quiet period a burst must observe before firing.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
