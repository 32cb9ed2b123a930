use serde::{Deserialize, Serialize};

/// Identity of a connected peer.
///
/// Wrapper around a UUID string. The identity is chosen by the peer itself at
/// process startup and presented in the connection hello, so it is stable
/// across reconnects of the same agent process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PeerId(pub String);

impl PeerId {
    /// Generates a new random UUID v4-based PeerId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

/// First frame on every connection, sent by the connecting side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub id: PeerId,
}

/// Connection-state and data events delivered to the endpoint owner.
///
/// `Disconnected` reports transport-level loss only; liveness decisions are
/// made by the owner from heartbeats, not from socket state.
#[derive(Debug)]
pub enum PeerEvent {
    Connected(PeerId),
    Message(PeerId, String),
    Disconnected(PeerId),
}
