//! OS signal handling.
//!
//! SIGINT (Ctrl+C) and, on Unix, SIGTERM both trigger graceful shutdown.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

/// Resolve on the first shutdown signal.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Trigger `shutdown` when a signal arrives.
pub fn spawn_signal_handler(shutdown: Arc<Shutdown>) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Signal received, shutting down");
        shutdown.trigger();
    })
}
