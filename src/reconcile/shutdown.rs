//! Cancellation at wait boundaries.

use std::time::Duration;
use tokio::sync::watch;

/// Signals the reconciler to stop at the next `RETRY_WAIT` or poll interval.
///
/// Work in flight (a fetch, a swap) is never interrupted.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: Option<watch::Receiver<bool>>,
}

impl Shutdown {
    /// A signal that never fires.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            rx: None,
        }
    }

    /// Creates a trigger and its paired signal.
    #[must_use]
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self::from_receiver(rx))
    }

    pub const fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self {
            rx: Some(rx),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Sleeps for `duration`; returns `true` if cancelled first.
    pub async fn wait(&mut self, duration: Duration) -> bool {
        let Some(rx) = self.rx.as_mut() else {
            tokio::time::sleep(duration).await;
            return false;
        };
        if *rx.borrow() {
            return true;
        }

        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        let cancelled = tokio::select! {
            () = &mut sleep => return false,
            changed = rx.wait_for(|stop| *stop) => changed.is_ok(),
        };
        // A dropped trigger can never fire; finish the wait
        if !cancelled {
            sleep.await;
        }
        cancelled
    }
}
