//! Wire Protocol Definitions
//!
//! JSON payloads exchanged with workers and clients, field names exactly as
//! on the wire. Heartbeats are a distinguished zero-payload control message
//! tagged `"<3"`, shared by both peer roles.

use serde::{Deserialize, Serialize};

/// The heartbeat type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeartbeatTag {
    #[serde(rename = "<3")]
    Heartbeat,
}

/// `{"type":"<3"}`: keeps a peer's broker-side record from expiring
/// between real messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(rename = "type")]
    pub tag: HeartbeatTag,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            tag: HeartbeatTag::Heartbeat,
        }
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a worker can say to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// `{"type":"WorkerRequest","status":"Ready"}`, the readiness announcement.
    WorkerRequest { status: ReadyStatus },
    /// `{"type":"<3"}`
    #[serde(rename = "<3")]
    Heartbeat,
    /// A finished sub-task. Echoes board and depth so the broker can tell
    /// which request generation the result belongs to.
    WorkerResult {
        #[serde(rename = "move")]
        best_move: Option<String>,
        score: i32,
        board: String,
        depth: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyStatus {
    Ready,
}

/// Broker → worker: one sub-task.
///
/// `listOfMoves` stays a list on the wire even though dispatch always sends
/// exactly one candidate per task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    #[serde(rename = "listOfMoves")]
    pub list_of_moves: Vec<String>,
    pub board: String,
    pub depth: u32,
}

/// Everything a client can say to the broker.
///
/// A request has no type tag on the wire, so the heartbeat (which does)
/// must be tried first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Heartbeat(Heartbeat),
    Request(MoveRequest),
}

/// `{"board":<fen>,"depth":<int>}`: one full-board evaluation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    pub board: String,
    pub depth: u32,
}

/// Broker → client: the aggregated answer.
///
/// `move` is `null` when the submitted board had no legal moves at all
/// (checkmate or stalemate); the score is then the losing sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveReply {
    #[serde(rename = "move")]
    pub best_move: Option<String>,
    pub score: i32,
}
