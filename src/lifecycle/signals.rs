//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGINT/SIGTERM and trigger graceful shutdown
//! - Listen for SIGHUP and request a reload
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers a reload, not shutdown; the application decides whether
//!   reloading is allowed

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::watcher::ReloadRequest;
use crate::lifecycle::Shutdown;

/// Spawn the signal listeners. The task ends after the first shutdown signal.
pub fn spawn_signal_handlers(
    shutdown: Shutdown,
    reload_tx: mpsc::UnboundedSender<ReloadRequest>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let (mut term, mut hup) = match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
                (Ok(term), Ok(hup)) => (term, hup),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
                    wait_for_ctrl_c().await;
                    shutdown.trigger();
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!(signal = "SIGINT", "Shutdown requested");
                        break;
                    }
                    _ = term.recv() => {
                        tracing::info!(signal = "SIGTERM", "Shutdown requested");
                        break;
                    }
                    _ = hup.recv() => {
                        tracing::info!(signal = "SIGHUP", "Reload requested");
                        let _ = reload_tx.send(ReloadRequest { paths: Vec::new() });
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = reload_tx;
            wait_for_ctrl_c().await;
        }

        shutdown.trigger();
    })
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
