use super::{GigecamOrchestrator, ShutdownReason};
use crate::error::{GigecamError, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info, warn};

impl GigecamOrchestrator {
    /// Run until an interrupt arrives or the session ends on its own, then
    /// drain the acquisition task before returning the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Gigecam node is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| GigecamError::system("Shutdown sender already taken"))?;

        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| GigecamError::system("Shutdown receiver already taken"))?;

        let mut acquisition = self
            .acquisition
            .take()
            .ok_or_else(|| GigecamError::system("Acquisition task not started"))?;

        // Spawn signal handlers
        self.setup_signal_handlers(shutdown_sender).await;

        // Wait for an interrupt or for the session to finish by itself
        let finished_early = tokio::select! {
            reason = &mut shutdown_receiver => {
                match reason {
                    Ok(reason) => info!("Shutdown initiated: {:?}", reason),
                    Err(_) => warn!("Shutdown channel closed unexpectedly"),
                }
                None
            }
            joined = &mut acquisition => {
                info!("Shutdown initiated: {:?}", ShutdownReason::SessionEnded);
                Some(joined)
            }
        };

        // Cancellation is idempotent; issuing it after a self-ended session
        // is a no-op. The acquisition task is joined before this returns, so
        // no open device handle survives process exit.
        self.cancellation_token.cancel();
        let session_result = match finished_early {
            Some(joined) => joined,
            None => acquisition.await,
        };

        let exit_code = match session_result {
            Ok(Ok(report)) => {
                info!(
                    "Session complete: {} frames published at {:.1} fps",
                    report.frames_published, report.resulting_frame_rate
                );
                0
            }
            // A session-fatal error ends the session, not the process
            Ok(Err(err)) => {
                error!("Acquisition session ended with error: {}", err);
                0
            }
            Err(join_error) => {
                error!("Acquisition task aborted abnormally: {}", join_error);
                1
            }
        };

        info!("Gigecam node shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown. The sender is taken by
    /// whichever handler fires first; repeated interrupts are no-ops.
    async fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // Handle SIGTERM (service stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                if let Some(()) = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler")
                    .recv()
                    .await
                {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
