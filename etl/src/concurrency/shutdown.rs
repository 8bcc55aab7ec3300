//! Broadcast shutdown signal built on a [`watch`] channel.
//!
//! Every receiver observes the same signal. Workers check it between jobs, so a job in
//! flight always runs to completion.

use tokio::sync::watch;

/// Sending half of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Signals shutdown to all receivers. Later subscribers observe it immediately.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiving half of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Whether shutdown was signalled or every sender was dropped.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Completes once shutdown was signalled or every sender was dropped.
    pub async fn wait(&mut self) {
        let _ = self.0.wait_for(|shutdown| *shutdown).await;
    }
}

pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);

    (ShutdownTx(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn all_receivers_observe_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        let late_rx = tx.subscribe();

        assert!(!rx.is_shutdown());
        tx.shutdown();
        rx.wait().await;

        assert!(rx.is_shutdown());
        assert!(late_rx.is_shutdown());
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();

        drop(tx);
        rx.wait().await;

        assert!(rx.is_shutdown());
    }
}
