//! Shared relay process state: the store plus the live outbound registry.
//!
//! The store (`doomcode-relay-store`) holds data; this module holds the
//! means to reach a live connection task. Each connection task owns an
//! unbounded channel for frames destined for its socket; pushing a peer
//! notification, a forwarded envelope, or a liveness probe is a matter of
//! looking up the connection id here and sending into that channel.

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use doomcode_relay_store::RelayStore;
use tokio::sync::{mpsc, oneshot};

/// A handle to a connection's outbound channel.
pub type OutboundSender = mpsc::UnboundedSender<Message>;

/// Process-wide relay state, cloned into every connection task.
#[derive(Clone)]
pub struct AppState {
    pub store: RelayStore,
    outbound: Arc<DashMap<String, OutboundSender>>,
    /// One outstanding liveness probe per connection at a time (§4.4): a
    /// `Pong` observed on that connection's own read loop resolves it.
    probes: Arc<DashMap<String, oneshot::Sender<()>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            store: RelayStore::new(),
            outbound: Arc::new(DashMap::new()),
            probes: Arc::new(DashMap::new()),
        }
    }

    pub fn register(&self, connection_id: String, sender: OutboundSender) {
        self.outbound.insert(connection_id, sender);
    }

    pub fn unregister(&self, connection_id: &str) {
        self.outbound.remove(connection_id);
        self.probes.remove(connection_id);
    }

    /// Best-effort send to a connection's socket. Returns `false` if the
    /// connection is unknown or its channel is already closed — both mean
    /// the caller should treat the peer as gone rather than error out.
    pub fn send_to(&self, connection_id: &str, message: Message) -> bool {
        match self.outbound.get(connection_id) {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Register a pending liveness probe for `connection_id`, replacing any
    /// prior one (§5: a single roundtrip, never stacked).
    pub fn register_probe(&self, connection_id: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.probes.insert(connection_id.to_string(), tx);
        rx
    }

    /// Resolve a pending probe for `connection_id`, if one is outstanding.
    /// Called from that connection's own read loop on receipt of `Pong`.
    pub fn resolve_probe(&self, connection_id: &str) {
        if let Some((_, tx)) = self.probes.remove(connection_id) {
            let _ = tx.send(());
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
