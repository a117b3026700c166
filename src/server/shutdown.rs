//! Graceful shutdown handling for the probe listener
//!
//! Two independent triggers lead to the same drain:
//! - SIGINT, SIGTERM or SIGQUIT from the environment
//! - an explicit request to `/closeListener`
//!
//! Draining stops accepting connections and lets in-flight requests finish.

use tokio::sync::watch;
use tracing::info;

/// Why the listener is draining
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Termination signal from the operating environment
    Signal(&'static str),
    /// `/closeListener` was called
    Requested,
}

/// Receiving side of the shutdown channel
///
/// Cloned and handed to anything that must stop when shutdown begins.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownSignal {
    /// Wait for shutdown signal
    ///
    /// Returns the reason of the first trigger.
    pub async fn wait(&mut self) -> ShutdownReason {
        loop {
            if let Some(reason) = *self.receiver.borrow_and_update() {
                return reason;
            }
            if self.receiver.changed().await.is_err() {
                // Sender dropped, treat as shutdown
                return ShutdownReason::Requested;
            }
        }
    }

    /// Reason shutdown was triggered, if it has been (non-blocking)
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.receiver.borrow()
    }

    /// Check if shutdown was signaled (non-blocking)
    pub fn is_shutdown(&self) -> bool {
        self.reason().is_some()
    }
}

/// Controller for triggering shutdown
pub struct ShutdownController {
    sender: watch::Sender<Option<ShutdownReason>>,
}

impl ShutdownController {
    /// Trigger shutdown
    ///
    /// Only the first call takes effect; later reasons are ignored.
    pub fn shutdown(&self, reason: ShutdownReason) {
        let triggered = self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if triggered {
            info!(reason = ?reason, "Shutdown signal sent");
        }
    }

    /// Create another receiver for this channel
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Create a new shutdown signal pair
///
/// Returns (controller, signal) where:
/// - controller: Used to trigger shutdown
/// - signal: Cloned and passed to components that need to listen
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(None);
    (ShutdownController { sender }, ShutdownSignal { receiver })
}

/// Wait for SIGINT, SIGTERM or SIGQUIT
///
/// This function blocks until a termination signal is received.
/// Returns the signal name that was received.
///
/// # Panics
/// Panics if signal handlers cannot be registered (OS resource exhaustion).
#[cfg(unix)]
pub async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::error;

    let register = |kind: SignalKind, name: &str| match signal(kind) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, signal = name, "Failed to register signal handler");
            panic!("Cannot register {} handler: {}", name, e);
        }
    };

    let mut sigterm = register(SignalKind::terminate(), "SIGTERM");
    let mut sigint = register(SignalKind::interrupt(), "SIGINT");
    let mut sigquit = register(SignalKind::quit(), "SIGQUIT");

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
            "SIGTERM"
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
            "SIGINT"
        }
        _ = sigquit.recv() => {
            info!("Received SIGQUIT");
            "SIGQUIT"
        }
    }
}

/// Wait for Ctrl+C signal (Windows)
///
/// # Panics
/// Panics if Ctrl+C handler cannot be registered.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> &'static str {
    use tracing::error;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to wait for Ctrl+C");
        panic!("Cannot wait for Ctrl+C: {}", e);
    }
    info!("Received Ctrl+C");
    "CTRL_C"
}
