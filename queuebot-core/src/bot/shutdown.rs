//! src/bot/shutdown.rs

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Process-wide stop signal. Cloning shares the same signal.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown_tx: Arc::new(tx),
            shutdown_rx: rx,
        }
    }

    pub fn trigger(&self) {
        if !self.is_triggered() {
            info!("Shutdown requested.");
        }
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Resolves once `trigger` has been called.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        while !*rx.borrow_and_update() {
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

    #[tokio::test]
    async fn clones_share_the_signal() {
        let handle = ShutdownHandle::new();
        let other = handle.clone();
        assert!(!other.is_triggered());

        let waiter = tokio::spawn({
            let h = handle.clone();
            async move { h.wait().await }
        });
        other.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait() should resolve")
            .unwrap();
        assert!(handle.is_triggered());
    }

    #[test]
    fn wait_returns_immediately_once_triggered() {
        let handle = ShutdownHandle::new();
        handle.trigger();
        tokio_test::block_on(handle.wait());
        assert!(handle.is_triggered());
    }
}
