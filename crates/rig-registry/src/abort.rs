//! Cooperative abort signalling.
//!
//! An abort request sets a flag; it never pre-empts a running operation.
//! The executor checks the signal between phases, and components observe
//! it at checkpoints inside long-running operations.

use tokio::sync::watch;

/// Sender half: held by whoever may request an abort.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

/// Receiver half: checked at defined checkpoints.
#[derive(Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/signal pair.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx })
}

impl AbortHandle {
    /// Request an abort. Idempotent.
    pub fn abort(&self) {
        // send_replace: the flag must flip even while no checkpoint is
        // currently subscribed.
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl AbortSignal {
    /// Synchronous checkpoint.
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Suspend until an abort is requested.
    ///
    /// Intended for `select!`-style checkpoints inside long operations.
    pub async fn aborted(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // Handle dropped without aborting: stay pending forever
                // rather than report a phantom abort.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn starts_unaborted() {
        let (_handle, signal) = abort_pair();
        assert!(!signal.is_aborted());
    }

    #[tokio::test]
    async fn abort_is_observed() {
        let (handle, signal) = abort_pair();
        handle.abort();
        handle.abort();
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn aborted_wakes_waiter() {
        let (handle, mut signal) = abort_pair();
        let waiter = tokio::spawn(async move {
            signal.aborted().await;
        });
        handle.abort();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
