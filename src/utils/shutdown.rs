use eyre::{Result, WrapErr};
use tokio::{signal, sync::watch};

/// Shutdown coordinator shared between the signal listener and the server.
pub struct GracefulShutdown {
    tx: watch::Sender<bool>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Check if shutdown has been initiated
    pub fn is_shutdown_initiated(&self) -> bool {
        *self.tx.borrow()
    }

    /// Manually trigger shutdown. Repeated calls are ignored.
    pub fn trigger_shutdown(&self) {
        let first = self.tx.send_if_modified(|initiated| !std::mem::replace(initiated, true));
        if first {
            tracing::info!("Shutdown initiated");
        }
    }

    /// Resolve once shutdown has been initiated.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = rx.wait_for(|initiated| *initiated).await;
    }

    /// Wait for SIGINT (Ctrl+C) or SIGTERM, then initiate shutdown.
    pub async fn listen_for_signals(&self) -> Result<()> {
        tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("Failed to listen for Ctrl+C")?;
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            result = wait_for_sigterm() => {
                result?;
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = self.wait() => return Ok(()),
        }
        self.trigger_shutdown();
        Ok(())
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("Failed to register SIGTERM handler")?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix systems, we only have Ctrl+C
    std::future::pending::<()>().await;
    Ok(())
}
