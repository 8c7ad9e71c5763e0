//! Cooperative cancellation for long-running work.
//!
//! A [`Shutdown`] is owned by whoever controls the process lifetime (usually `main`). Every task that sleeps or
//! waits on the network holds a [`ShutdownSignal`] and races its suspension points against
//! [`ShutdownSignal::triggered`]. Dropping the `Shutdown` without triggering it never fires the signal.
use std::time::Duration;

use log::*;
use tokio::sync::watch;

pub struct Shutdown {
    sender: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal { receiver: self.sender.subscribe() }
    }

    pub fn trigger(&self) {
        debug!("🛑️ Shutdown triggered");
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }
}

#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that can never fire. Useful for one-shot tools and tests.
    pub fn never() -> Self {
        let (_, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once shutdown has been triggered. If the owning [`Shutdown`] is dropped first, this never resolves.
    pub async fn triggered(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleeps for `duration` unless shutdown is triggered first. Returns `true` if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.triggered() => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn sleep_completes_without_trigger() {
        let shutdown = Shutdown::new();
        let signal = shutdown.signal();
        assert!(signal.sleep(Duration::from_millis(5)).await);
        assert!(!signal.is_triggered());
    }

    #[tokio::test]
    async fn trigger_interrupts_sleep() {
        let shutdown = Shutdown::new();
        let signal = shutdown.signal();
        let sleeper = tokio::spawn(async move { signal.sleep(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.trigger();
        let completed = tokio::time::timeout(Duration::from_secs(5), sleeper).await.unwrap().unwrap();
        assert!(!completed);
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn already_triggered_signal_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let signal = shutdown.signal();
        assert!(!signal.sleep(Duration::from_secs(60)).await);
        signal.triggered().await;
    }

    #[tokio::test]
    async fn never_signal_does_not_fire() {
        let signal = ShutdownSignal::never();
        assert!(signal.sleep(Duration::from_millis(5)).await);
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.triggered()).await;
        assert!(waited.is_err());
    }
}
