//! Cancellation token shared by the Event Bus (C1) and the ReAct Driver
//! (C7). Grounded on `sa_gateway::runtime::cancel::CancelToken`
//! (`Arc<AtomicBool>`), extended with a `tokio::sync::Notify` so `emit`
//! can `select!` on cancellation instead of polling it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once cancellation has been requested. Safe to call before
    /// or after `cancel()` — already-cancelled tokens resolve immediately.
    ///
    /// Registers as a `Notify` waiter *before* checking the flag (tokio's
    /// documented pattern for this exact race): `cancel()` uses
    /// `notify_waiters()`, which only wakes tasks already registered, so
    /// checking the flag first and registering second can miss a `cancel()`
    /// that lands in between and hang forever.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_cancelled() {
            return;
        }

        notified.await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
