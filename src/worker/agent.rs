use crate::broker::protocol::{Heartbeat, ReadyStatus, TaskAssignment, WorkerMessage};
use crate::directory::{lookup, worker_service_type};
use crate::engine::evaluator::Evaluate;
use crate::engine::{board, search, MATE_SCORE};
use crate::transport::connector::Connection;
use crate::transport::types::PeerId;

use anyhow::Result;
use std::time::Duration;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Tunables a worker process is started with.
pub struct WorkerConfig {
    /// Catalog `host:port`.
    pub catalog: String,
    /// Cluster name, the prefix of the directory type tags.
    pub name: String,
    pub heartbeat_interval: Duration,
}

/// One worker: a single-threaded loop around one owned evaluator.
///
/// The identity is fixed at construction, so however many times the agent
/// reconnects, the broker sees the same worker.
pub struct WorkerAgent {
    config: WorkerConfig,
    identity: PeerId,
    evaluator: Box<dyn Evaluate>,
}

/// Turns one assignment into the result frame to send back.
///
/// Never fails: an unusable board (or a dead evaluator, handled inside the
/// search) still produces a result, scored so it cannot win the reduction.
pub async fn evaluate_assignment(
    evaluator: &mut dyn Evaluate,
    assignment: &TaskAssignment,
) -> WorkerMessage {
    let (best_move, score) = match board::parse_fen(&assignment.board) {
        Ok(pos) => {
            search::best_move(evaluator, &pos, &assignment.list_of_moves, assignment.depth).await
        }
        Err(e) => {
            tracing::warn!("Unusable board in assignment: {}", e);
            (None, -MATE_SCORE)
        }
    };

    WorkerMessage::WorkerResult {
        best_move,
        score,
        board: assignment.board.clone(),
        depth: assignment.depth,
    }
}

impl WorkerAgent {
    pub fn new(config: WorkerConfig, evaluator: Box<dyn Evaluate>) -> Self {
        Self {
            config,
            identity: PeerId::new(),
            evaluator,
        }
    }

    /// Discovery/connect/serve forever.
    pub async fn run(mut self) -> Result<()> {
        let service = worker_service_type(&self.config.name);
        tracing::info!("Worker {:?} starting, looking for {}", self.identity, service);

        loop {
            let addr = lookup::locate(&self.config.catalog, &service).await;

            match Connection::open(&addr, &self.identity).await {
                Ok(conn) => {
                    if let Err(e) = self.serve(conn).await {
                        tracing::warn!("Broker session ended: {}", e);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to connect to {}: {}", addr, e);
                }
            }

            let jitter = rand::random::<u64>() % 500;
            tokio::time::sleep(RECONNECT_DELAY + Duration::from_millis(jitter)).await;
        }
    }

    /// Drives one established broker connection until it breaks.
    pub async fn serve(&mut self, mut conn: Connection) -> Result<()> {
        conn.send(&WorkerMessage::WorkerRequest {
            status: ReadyStatus::Ready,
        })
        .await?;

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    conn.send(&Heartbeat::new()).await?;
                }
                frame = conn.recv() => {
                    let line = frame.ok_or_else(|| anyhow::anyhow!("Connection to broker lost"))?;

                    // The only thing the broker pushes at a worker is an
                    // assignment; anything else poisons the connection.
                    let assignment: TaskAssignment = serde_json::from_str(&line)
                        .map_err(|e| anyhow::anyhow!("Malformed assignment: {}", e))?;

                    tracing::info!(
                        "Evaluating {:?} at depth {}",
                        assignment.list_of_moves,
                        assignment.depth
                    );

                    // Heartbeats must keep flowing while the evaluation runs,
                    // or a long task gets the worker declared dead mid-compute
                    // and its own result discarded.
                    let eval = evaluate_assignment(self.evaluator.as_mut(), &assignment);
                    tokio::pin!(eval);
                    let result = loop {
                        tokio::select! {
                            _ = heartbeat.tick() => {
                                conn.send(&Heartbeat::new()).await?;
                            }
                            result = &mut eval => break result,
                        }
                    };
                    conn.send(&result).await?;
                    conn.send(&WorkerMessage::WorkerRequest {
                        status: ReadyStatus::Ready,
                    })
                    .await?;
                }
            }
        }
    }
}
