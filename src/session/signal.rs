//! One-shot latch built on `tokio::sync::watch`.
//!
//! Fires at most once, can be awaited by any number of tasks, and stays
//! fired. Used for connection close and for broker/client shutdown.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone, Debug)]
pub(crate) struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Signal {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the latch. Returns `true` if this call fired it.
    pub(crate) fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub(crate) fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the latch has fired (immediately if it already has).
    pub(crate) async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            let fired = *rx.borrow_and_update();
            if fired {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fire_once() {
        let signal = Signal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn test_fired_wakes_waiters() {
        let signal = Signal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.fired().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        signal.fire();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_fired_returns_immediately_after_fire() {
        let signal = Signal::new();
        signal.fire();
        tokio::time::timeout(Duration::from_millis(100), signal.fired())
            .await
            .unwrap();
    }
}
