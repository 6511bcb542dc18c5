//! Cancellation signal shared between a caller and in-flight operations

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Fires a [`CancelSignal`]
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

/// Observes cancellation. Cheap to clone; every clone sees the same signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected canceller/signal pair
pub fn cancel_pair() -> (Canceller, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (Canceller { tx }, CancelSignal { rx })
}

impl Canceller {
    pub fn cancel(&self) {
        // send only fails when every signal is gone, nobody is left to notify
        let _ = self.tx.send(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation fires. Never resolves if the canceller is
    /// dropped without firing.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Drive `fut` to completion unless `cancel` fires first
pub(crate) async fn race<F: Future>(fut: F, cancel: Option<&CancelSignal>) -> Option<F::Output> {
    match cancel {
        None => Some(fut.await),
        Some(signal) => {
            tokio::select! {
                biased;
                _ = signal.cancelled() => None,
                out = fut => Some(out),
            }
        }
    }
}

/// Sleep for `duration`; `false` when interrupted by cancellation.
/// A zero duration still yields to the scheduler.
pub(crate) async fn sleep(duration: Duration, cancel: Option<&CancelSignal>) -> bool {
    if duration.is_zero() {
        tokio::task::yield_now().await;
        return !cancel.is_some_and(CancelSignal::is_cancelled);
    }
    race(tokio::time::sleep(duration), cancel).await.is_some()
}
