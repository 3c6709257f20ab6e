//! Graceful shutdown on Unix signals.
//!
//! [`SigDown`] listens for SIGTERM and SIGINT and cancels a shared
//! [`CancellationToken`], so the HTTP server can stop accepting requests and
//! let in-flight submissions finish.
//!
//! # Example
//!
//! ```ignore
//! use velocity_relay::util::SigDown;
//!
//! let sig_down = SigDown::try_new()?;
//! let token = sig_down.cancellation_token();
//! axum::serve(listener, app)
//!     .with_graceful_shutdown(async move { token.cancelled().await })
//!     .await?;
//! ```

use tokio::signal::unix::SignalKind;
use tokio::signal::unix::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cancels a token on the first SIGTERM or SIGINT.
pub struct SigDown {
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl SigDown {
    /// Registers the signal handlers and spawns the listening task.
    ///
    /// Returns an error if signal registration fails.
    pub fn try_new() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let token = CancellationToken::new();
        let trigger = token.clone();
        let task_tracker = TaskTracker::new();
        task_tracker.spawn(async move {
            let signal = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            #[cfg(feature = "telemetry")]
            tracing::info!(signal, "Shutdown requested");
            #[cfg(not(feature = "telemetry"))]
            let _ = signal;
            trigger.cancel();
        });
        task_tracker.close();
        Ok(Self {
            task_tracker,
            cancellation_token: token,
        })
    }

    /// A clone of the token, for handing to subsystems.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Waits for a shutdown signal and for the listening task to finish.
    pub async fn recv(&self) {
        self.cancellation_token.cancelled().await;
        self.task_tracker.wait().await;
    }
}
