//! Cooperative cancellation token shared by the three permanent tasks
//! (Environment, Enclosure, Scheduler) and by actions' abort plumbing.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::Notify;

/// A cheap-to-clone cancellation token, observed via [`CancelToken::cancelled`]
/// inside a `tokio::select!` alongside a loop's periodic sleep.
#[derive(Clone, Default)]
pub struct CancelToken {
    notify: Arc<Notify>,
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Construct a fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; wakes any pending [`cancelled`](Self::cancelled) waiters.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// True if [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}
