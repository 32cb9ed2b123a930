//! Worker registry and client session table.
//!
//! Explicit identity → record mappings with defined insert/update/expiry
//! operations. Both are owned exclusively by the broker loop, so plain
//! `HashMap`s suffice; nothing here is shared across tasks.

use super::types::{ClientSession, SubTask, WorkerRecord};
use crate::transport::types::PeerId;

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Known workers, dead ones included.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<PeerId, WorkerRecord>,
    liveness_timeout: Duration,
}

impl WorkerRegistry {
    pub fn new(liveness_timeout: Duration) -> Self {
        Self {
            workers: HashMap::new(),
            liveness_timeout,
        }
    }

    /// Handles a readiness announcement.
    ///
    /// If the worker reconnected while a task of its was still unreturned,
    /// that task is handed back for requeueing so the work is not lost.
    pub fn mark_ready(&mut self, id: &PeerId, now: Instant) -> Option<SubTask> {
        let expires_at = now + self.liveness_timeout;

        match self.workers.get_mut(id) {
            Some(record) => {
                let orphaned = record.assigned.take();
                record.available = true;
                record.alive = true;
                record.expires_at = expires_at;
                orphaned
            }
            None => {
                self.workers.insert(
                    id.clone(),
                    WorkerRecord {
                        available: true,
                        alive: true,
                        assigned: None,
                        expires_at,
                    },
                );
                None
            }
        }
    }

    /// Refreshes expiry only; availability is untouched.
    pub fn refresh(&mut self, id: &PeerId, now: Instant) {
        if let Some(record) = self.workers.get_mut(id) {
            record.expires_at = now + self.liveness_timeout;
        }
    }

    pub fn get(&self, id: &PeerId) -> Option<&WorkerRecord> {
        self.workers.get(id)
    }

    pub fn is_alive(&self, id: &PeerId) -> bool {
        self.workers.get(id).map(|r| r.alive).unwrap_or(false)
    }

    /// Resurrects a worker that reported back after being declared dead.
    /// Its stale result was discarded; it starts over with no task.
    pub fn resurrect(&mut self, id: &PeerId, now: Instant) {
        if let Some(record) = self.workers.get_mut(id) {
            record.alive = true;
            record.available = true;
            record.assigned = None;
            record.expires_at = now + self.liveness_timeout;
        }
    }

    /// Clears the assignment after a counted result; the worker is ready
    /// for the next task.
    pub fn complete(&mut self, id: &PeerId, now: Instant) -> Option<SubTask> {
        let record = self.workers.get_mut(id)?;
        let finished = record.assigned.take();
        record.available = true;
        record.expires_at = now + self.liveness_timeout;
        finished
    }

    /// Picks any available, live worker and marks it busy with the task.
    ///
    /// Selection is iteration order; no fairness is promised beyond "some
    /// available live worker gets it".
    pub fn assign_any(&mut self, task: SubTask) -> Option<PeerId> {
        let id = self
            .workers
            .iter()
            .find(|(_, record)| record.available && record.alive)
            .map(|(id, _)| id.clone())?;

        // Per the registry invariant: assigned task implies unavailable.
        let record = self.workers.get_mut(&id)?;
        record.available = false;
        record.assigned = Some(task);
        Some(id)
    }

    pub fn has_available(&self) -> bool {
        self.workers.values().any(|r| r.available && r.alive)
    }

    /// Declares every expired worker dead and collects their in-flight
    /// tasks for requeueing.
    pub fn expire(&mut self, now: Instant) -> Vec<(PeerId, Option<SubTask>)> {
        let mut expired = Vec::new();

        for (id, record) in self.workers.iter_mut() {
            if record.alive && now >= record.expires_at {
                record.alive = false;
                record.available = false;
                expired.push((id.clone(), record.assigned.take()));
            }
        }

        expired
    }

    pub fn alive_count(&self) -> usize {
        self.workers.values().filter(|r| r.alive).count()
    }
}

/// In-flight client requests keyed by client identity.
#[derive(Debug, Default)]
pub struct ClientTable {
    sessions: HashMap<PeerId, ClientSession>,
    liveness_timeout: Duration,
}

impl ClientTable {
    pub fn new(liveness_timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            liveness_timeout,
        }
    }

    /// (Re)initializes the session for a fresh board request.
    ///
    /// Any prior request from the same identity is superseded: counts
    /// reset, reduction state cleared, liveness refreshed.
    pub fn begin_request(
        &mut self,
        id: &PeerId,
        board: String,
        depth: u32,
        expected_results: usize,
        now: Instant,
    ) {
        self.sessions.insert(
            id.clone(),
            ClientSession {
                alive: true,
                expires_at: now + self.liveness_timeout,
                board,
                depth,
                best_move: None,
                best_score: i32::MIN,
                expected_results,
                received_results: 0,
            },
        );
    }

    pub fn refresh(&mut self, id: &PeerId, now: Instant) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.expires_at = now + self.liveness_timeout;
        }
    }

    pub fn get(&self, id: &PeerId) -> Option<&ClientSession> {
        self.sessions.get(id)
    }

    pub fn is_alive(&self, id: &PeerId) -> bool {
        self.sessions.get(id).map(|s| s.alive).unwrap_or(false)
    }

    /// Folds one result into the session's reduction.
    ///
    /// Ties go to the last-seen result. Returns the aggregated reply when
    /// this was the final outstanding result, exactly once per request.
    pub fn record_result(
        &mut self,
        id: &PeerId,
        best_move: Option<String>,
        score: i32,
    ) -> Option<(Option<String>, i32)> {
        let session = self.sessions.get_mut(id)?;

        if session.received_results >= session.expected_results {
            // Session already completed; nothing outstanding to count.
            return None;
        }

        session.received_results += 1;
        if score >= session.best_score {
            session.best_score = score;
            session.best_move = best_move;
        }

        if session.received_results == session.expected_results {
            Some((session.best_move.clone(), session.best_score))
        } else {
            None
        }
    }

    /// Whether a result echoing this board and depth belongs to the
    /// session's current request generation.
    pub fn matches_generation(&self, id: &PeerId, board: &str, depth: u32) -> bool {
        self.sessions
            .get(id)
            .map(|s| s.board == board && s.depth == depth)
            .unwrap_or(false)
    }

    /// Marks every expired client inactive. No requeueing follows: there is
    /// no one left to deliver their answers to.
    pub fn expire(&mut self, now: Instant) -> Vec<PeerId> {
        let mut expired = Vec::new();

        for (id, session) in self.sessions.iter_mut() {
            if session.alive && now >= session.expires_at {
                session.alive = false;
                expired.push(id.clone());
            }
        }

        expired
    }
}
