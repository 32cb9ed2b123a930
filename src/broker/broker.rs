//! The broker event loop and its state machine.
//!
//! All registry, session, and queue mutation happens on one task: the async
//! loop multiplexes the two inbound transport channels with a sweep timer
//! and calls the synchronous handlers below between waits, so no handler
//! ever runs concurrently with another. Outbound messages accumulate in an
//! outbox the loop flushes after every wake, which also keeps the handlers
//! directly drivable from tests.

use super::protocol::{ClientMessage, MoveReply, TaskAssignment, WorkerMessage};
use super::queue::TaskQueue;
use super::registry::{ClientTable, WorkerRegistry};
use super::types::SubTask;
use crate::engine::{board, MATE_SCORE};
use crate::transport::listener::Endpoint;
use crate::transport::types::{PeerEvent, PeerId};

use anyhow::Result;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// A peer missing heartbeats for this long is declared dead by the sweep.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(15);
const SWEEP_INTERVAL: Duration = Duration::from_secs(2);

/// A message the loop owes a peer after the current wake.
#[derive(Debug, PartialEq)]
pub enum Outbound {
    ToWorker(PeerId, TaskAssignment),
    ToClient(PeerId, MoveReply),
}

/// The broker state machine. Single mutator by construction.
pub struct Broker {
    workers: WorkerRegistry,
    clients: ClientTable,
    queue: TaskQueue,
    outbox: Vec<Outbound>,
}

impl Broker {
    pub fn new(liveness_timeout: Duration) -> Self {
        Self {
            workers: WorkerRegistry::new(liveness_timeout),
            clients: ClientTable::new(liveness_timeout),
            queue: TaskQueue::new(),
            outbox: Vec::new(),
        }
    }

    pub fn handle_worker_message(&mut self, id: &PeerId, msg: WorkerMessage, now: Instant) {
        match msg {
            WorkerMessage::WorkerRequest { .. } => {
                if let Some(orphaned) = self.workers.mark_ready(id, now) {
                    tracing::info!(
                        "Worker {:?} reconnected with task in flight, requeueing {}",
                        id,
                        orphaned.candidate
                    );
                    self.queue.requeue(orphaned);
                } else {
                    tracing::debug!("Worker {:?} ready", id);
                }
            }
            WorkerMessage::Heartbeat => {
                self.workers.refresh(id, now);
            }
            WorkerMessage::WorkerResult {
                best_move,
                score,
                board,
                depth,
            } => {
                self.handle_worker_result(id, best_move, score, &board, depth, now);
            }
        }
    }

    fn handle_worker_result(
        &mut self,
        id: &PeerId,
        best_move: Option<String>,
        score: i32,
        board: &str,
        depth: u32,
        now: Instant,
    ) {
        // A result from a worker the sweep already gave up on: its task was
        // requeued (and possibly finished elsewhere), so the result must
        // not be counted. The worker itself is clearly alive again.
        if !self.workers.is_alive(id) {
            tracing::warn!("Discarding late result from dead worker {:?}", id);
            self.workers.resurrect(id, now);
            return;
        }

        let finished = match self.workers.complete(id, now) {
            Some(task) => task,
            None => {
                tracing::warn!("Unsolicited result from worker {:?}, ignoring", id);
                return;
            }
        };

        if !self.clients.is_alive(&finished.client) {
            tracing::debug!(
                "Dropping result for expired client {:?}",
                finished.client
            );
            return;
        }

        // The result echoes its board and depth; anything that no longer
        // matches the session's current request is from a superseded
        // generation and must not pollute the new reduction.
        if !self.clients.matches_generation(&finished.client, board, depth) {
            tracing::debug!(
                "Dropping stale-generation result from worker {:?}",
                id
            );
            return;
        }

        if let Some((reply_move, reply_score)) =
            self.clients.record_result(&finished.client, best_move, score)
        {
            tracing::info!(
                "Request complete for client {:?}: {:?} ({})",
                finished.client,
                reply_move,
                reply_score
            );
            self.outbox.push(Outbound::ToClient(
                finished.client,
                MoveReply {
                    best_move: reply_move,
                    score: reply_score,
                },
            ));
        }
    }

    pub fn handle_client_message(&mut self, id: &PeerId, msg: ClientMessage, now: Instant) {
        match msg {
            ClientMessage::Heartbeat(_) => {
                self.clients.refresh(id, now);
            }
            ClientMessage::Request(request) => {
                self.handle_client_request(id, request.board, request.depth, now);
            }
        }
    }

    fn handle_client_request(&mut self, id: &PeerId, board_fen: String, depth: u32, now: Instant) {
        let legal_moves = match board::parse_fen(&board_fen) {
            Ok(pos) => board::legal_moves_uci(&pos),
            Err(e) => {
                // Still answer, with a score no real line could produce, so
                // the client is never left hanging on a bad board.
                tracing::warn!("Unusable board from client {:?}: {}", id, e);
                self.clients.begin_request(id, board_fen, depth, 0, now);
                self.outbox.push(Outbound::ToClient(
                    id.clone(),
                    MoveReply {
                        best_move: None,
                        score: -MATE_SCORE,
                    },
                ));
                return;
            }
        };

        tracing::info!(
            "Request from client {:?}: depth {}, {} legal move(s)",
            id,
            depth,
            legal_moves.len()
        );

        self.clients
            .begin_request(id, board_fen.clone(), depth, legal_moves.len(), now);

        if legal_moves.is_empty() {
            // Checkmate or stalemate on arrival: zero sub-tasks would never
            // complete, so short-circuit with the sentinel reply.
            self.outbox.push(Outbound::ToClient(
                id.clone(),
                MoveReply {
                    best_move: None,
                    score: -MATE_SCORE,
                },
            ));
            return;
        }

        for candidate in legal_moves {
            self.queue.push(SubTask {
                client: id.clone(),
                board: board_fen.clone(),
                candidate,
                depth,
            });
        }
    }

    /// Matches queued tasks to available workers until either runs out.
    ///
    /// Tasks whose owner is gone or whose request was superseded are
    /// dropped here without burning a worker on them.
    pub fn dispatch(&mut self) {
        while !self.queue.is_empty() && self.workers.has_available() {
            let task = match self.queue.pop() {
                Some(task) => task,
                None => break,
            };

            if !self.clients.is_alive(&task.client) {
                tracing::debug!("Dropping task for expired client {:?}", task.client);
                continue;
            }
            if !self
                .clients
                .matches_generation(&task.client, &task.board, task.depth)
            {
                tracing::debug!("Dropping superseded task for client {:?}", task.client);
                continue;
            }

            let assignment = TaskAssignment {
                list_of_moves: vec![task.candidate.clone()],
                board: task.board.clone(),
                depth: task.depth,
            };

            match self.workers.assign_any(task) {
                Some(worker) => {
                    tracing::debug!(
                        "Dispatched {} to worker {:?}",
                        assignment.list_of_moves[0],
                        worker
                    );
                    self.outbox.push(Outbound::ToWorker(worker, assignment));
                }
                None => break,
            }
        }
    }

    /// Declares expired peers dead. Dead workers surrender their in-flight
    /// task back to the queue; dead clients merely stop receiving.
    pub fn sweep(&mut self, now: Instant) {
        for (id, task) in self.workers.expire(now) {
            match task {
                Some(task) => {
                    tracing::warn!(
                        "Worker {:?} expired with {} in flight, requeueing",
                        id,
                        task.candidate
                    );
                    self.queue.requeue(task);
                }
                None => {
                    tracing::warn!("Worker {:?} expired", id);
                }
            }
        }

        for id in self.clients.expire(now) {
            tracing::warn!("Client {:?} expired", id);
        }
    }

    /// Takes everything the handlers queued for sending.
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    pub fn queued_tasks(&self) -> usize {
        self.queue.len()
    }

    pub fn alive_workers(&self) -> usize {
        self.workers.alive_count()
    }

    #[cfg(test)]
    pub(crate) fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    #[cfg(test)]
    pub(crate) fn clients(&self) -> &ClientTable {
        &self.clients
    }
}

/// Runs the broker against its two transport endpoints until shutdown.
pub async fn run(
    mut broker: Broker,
    worker_endpoint: Endpoint,
    mut worker_events: mpsc::Receiver<PeerEvent>,
    client_endpoint: Endpoint,
    mut client_events: mpsc::Receiver<PeerEvent>,
) -> Result<()> {
    let mut sweep_timer = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            event = worker_events.recv() => {
                match event {
                    Some(PeerEvent::Connected(id)) => {
                        tracing::debug!("Worker connection up: {:?}", id);
                    }
                    Some(PeerEvent::Disconnected(id)) => {
                        // Liveness is decided by heartbeats, not sockets; a
                        // worker may reconnect before it expires.
                        tracing::debug!("Worker connection down: {:?}", id);
                    }
                    Some(PeerEvent::Message(id, line)) => {
                        match serde_json::from_str::<WorkerMessage>(&line) {
                            Ok(msg) => broker.handle_worker_message(&id, msg, Instant::now()),
                            Err(e) => {
                                tracing::warn!("Malformed worker frame from {:?}: {}", id, e);
                                worker_endpoint.kick(&id);
                            }
                        }
                    }
                    None => return Ok(()),
                }
            }
            event = client_events.recv() => {
                match event {
                    Some(PeerEvent::Connected(id)) => {
                        tracing::debug!("Client connection up: {:?}", id);
                    }
                    Some(PeerEvent::Disconnected(id)) => {
                        tracing::debug!("Client connection down: {:?}", id);
                    }
                    Some(PeerEvent::Message(id, line)) => {
                        match serde_json::from_str::<ClientMessage>(&line) {
                            Ok(msg) => broker.handle_client_message(&id, msg, Instant::now()),
                            Err(e) => {
                                tracing::warn!("Malformed client frame from {:?}: {}", id, e);
                                client_endpoint.kick(&id);
                            }
                        }
                    }
                    None => return Ok(()),
                }
            }
            _ = sweep_timer.tick() => {
                broker.sweep(Instant::now());
            }
        }

        broker.dispatch();

        for outbound in broker.drain_outbox() {
            match outbound {
                Outbound::ToWorker(id, assignment) => {
                    if let Err(e) = worker_endpoint.send_json(&id, &assignment) {
                        // The task is assigned to this worker; if it never
                        // answers, the sweep requeues it.
                        tracing::warn!("Failed to send task to worker {:?}: {}", id, e);
                    }
                }
                Outbound::ToClient(id, reply) => {
                    if let Err(e) = client_endpoint.send_json(&id, &reply) {
                        tracing::warn!("Failed to send reply to client {:?}: {}", id, e);
                    }
                }
            }
        }
    }
}
