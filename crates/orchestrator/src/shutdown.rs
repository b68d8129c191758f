/*
 * Cooperative Shutdown
 *
 * SIGINT/SIGTERM request a shutdown. The orchestrator checks the signal
 * between phases and between dates; in-flight downloads, merges and uploads
 * are never interrupted.
 */

use std::sync::Arc;
use tokio::sync::watch;

/// Shared shutdown flag backed by a watch channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Requests shutdown. Idempotent.
    pub fn trigger(&self) {
        if !*self.tx.borrow() {
            tracing::info!("Shutdown requested, stopping after the current phase");
        }
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until shutdown is requested.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // An error means every sender is gone; nothing can trigger anymore
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Triggers this signal on SIGINT or SIGTERM. Runs until a signal arrives.
    pub async fn listen_for_signals(self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::warn!("Failed to install signal handlers: {}", e);
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to install Ctrl+C handler: {}", e);
                return;
            }
            tracing::info!("Received Ctrl+C");
        }

        self.trigger();
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
