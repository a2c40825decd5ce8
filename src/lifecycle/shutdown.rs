//! Shutdown coordination for the gateway.
//!
//! One trigger reaches every subscriber:
//! - the HTTP server stops accepting and drains in-flight requests
//! - each bridged WebSocket session sends 1001 (going away) to both legs
//!   and reports its close event

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that the server and every relayed
/// WebSocket session subscribe to.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal. Returns how many subscribers were
    /// still listening.
    pub fn trigger(&self) -> usize {
        let listening = self.tx.send(()).unwrap_or(0);
        tracing::debug!(listening, "Shutdown triggered");
        listening
    }

    /// Number of tasks (server plus open WebSocket sessions) still waiting
    /// on the signal.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
