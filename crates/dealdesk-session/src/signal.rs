//! Cross-session login/logout signaling.
//!
//! The browser original piggybacks on a storage side channel: a slot is
//! written and immediately cleared so peers observe the change event, not
//! a resting value. The contract here is the same — a bus delivers
//! ephemeral events; nothing can be read back later.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Login,
    Logout,
}

/// Ephemeral broadcast message propagating auth changes between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSignal {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    /// Emission timestamp, unix milliseconds.
    pub at: i64,
    /// Instance id of the emitting manager. A storage event is never
    /// delivered to the tab that wrote it; subscribers skip their own
    /// origin to get the same semantics.
    pub origin: u64,
}

/// Broadcast-and-subscribe seam for cross-session signals.
///
/// Any primitive that delivers change events satisfies the contract.
pub trait SignalBus: Send + Sync {
    fn publish(&self, signal: SessionSignal);
    fn subscribe(&self) -> broadcast::Receiver<SessionSignal>;
}

/// Process-local bus over a tokio broadcast channel.
#[derive(Debug)]
pub struct LocalSignalBus {
    tx: broadcast::Sender<SessionSignal>,
}

impl LocalSignalBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for LocalSignalBus {
    fn default() -> Self {
        Self::new(16)
    }
}

impl SignalBus for LocalSignalBus {
    fn publish(&self, signal: SessionSignal) {
        // A send with no live subscribers is not a failure.
        let _ = self.tx.send(signal);
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionSignal> {
        self.tx.subscribe()
    }
}
