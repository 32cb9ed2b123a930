use crate::transport::types::PeerId;

use std::time::Instant;

/// One unit of work: evaluate a single candidate move of a client's board.
///
/// Immutable once created; if its worker dies before answering, the same
/// task goes back on the queue verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubTask {
    pub client: PeerId,
    pub board: String,
    pub candidate: String,
    pub depth: u32,
}

/// Broker-side view of one worker.
///
/// Never removed from the registry: a worker declared dead keeps its record
/// so a late reconnect or straggling result can resurrect it.
#[derive(Debug)]
pub struct WorkerRecord {
    /// Ready for dispatch. Never true while a task is assigned.
    pub available: bool,
    /// Heartbeat liveness. Flipped off by the sweep, back on by any sign of
    /// life from the worker.
    pub alive: bool,
    /// The in-flight task, if any.
    pub assigned: Option<SubTask>,
    pub expires_at: Instant,
}

/// Broker-side view of one client and its current request.
///
/// Re-initialized wholesale on every new board request from the same
/// identity; between completion and the next request the session is inert.
#[derive(Debug)]
pub struct ClientSession {
    pub alive: bool,
    pub expires_at: Instant,
    /// Board and depth of the current request; results echoing anything
    /// else belong to a superseded generation.
    pub board: String,
    pub depth: u32,
    pub best_move: Option<String>,
    pub best_score: i32,
    /// Sub-tasks issued for the current request.
    pub expected_results: usize,
    /// Results accounted so far. Always `<= expected_results`.
    pub received_results: usize,
}
