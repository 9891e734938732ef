// src/sys/signals.rs

use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::warn;

/// Session-wide interruption flag. Raising it never cancels an in-flight
/// remote call; the orchestrator and poller observe it between steps.
#[derive(Clone)]
pub struct InterruptSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl InterruptSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Returns true only for the call that actually raised the flag.
    pub fn raise(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_raised(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the flag is raised (immediately if it already is).
    pub async fn raised(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

impl Default for InterruptSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes SIGINT and SIGTERM into `interrupt` for the rest of the process.
/// Once installed, the default terminate-on-signal behaviour is replaced, so a
/// second Ctrl-C during rollback is logged and ignored instead of killing us.
pub fn install_listener(interrupt: InterruptSignal) -> Result<(), String> {
    let mut terminate = signal(SignalKind::terminate())
        .map_err(|e| format!("Failed to register SIGTERM handler: {}", e))?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if res.is_err() {
                        break;
                    }
                }
                received = terminate.recv() => {
                    if received.is_none() {
                        break;
                    }
                }
            }

            if interrupt.raise() {
                warn!("⚠️ Interrupt received. Finishing the current step, then rolling back.");
            } else {
                warn!("⚠️ Rollback already scheduled; additional interrupt ignored.");
            }
        }
    });

    Ok(())
}
