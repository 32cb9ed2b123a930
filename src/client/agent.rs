use crate::broker::protocol::{Heartbeat, MoveReply, MoveRequest};
use crate::directory::{client_service_type, lookup};
use crate::transport::connector::Connection;
use crate::transport::types::PeerId;

use anyhow::Result;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Tunables a client process is started with.
pub struct ClientConfig {
    /// Catalog `host:port`.
    pub catalog: String,
    /// Cluster name, the prefix of the directory type tags.
    pub name: String,
    pub heartbeat_interval: Duration,
}

/// A connection between requests: a background task keeps heartbeating on
/// it until the agent asks for it back.
struct IdleConnection {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Connection>,
}

/// One client: a stable identity over however many broker connections it
/// takes to get each answer.
///
/// Resubmitting after a reconnect is safe: the broker discards any in-flight
/// work for the old submission the moment the new one arrives.
pub struct ClientAgent {
    config: ClientConfig,
    identity: PeerId,
    idle: Option<IdleConnection>,
}

/// Heartbeats until the broker's one reply frame arrives.
///
/// Any transport loss or unparsable frame is an error; the caller drops the
/// connection and starts over.
pub async fn await_reply(conn: &mut Connection, heartbeat_interval: Duration) -> Result<MoveReply> {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                conn.send(&Heartbeat::new()).await?;
            }
            frame = conn.recv() => {
                let line = frame.ok_or_else(|| anyhow::anyhow!("Connection to broker lost"))?;
                return serde_json::from_str(&line)
                    .map_err(|e| anyhow::anyhow!("Malformed reply: {}", e));
            }
        }
    }
}

/// Heartbeats on an idle connection until asked to hand it back.
///
/// A failed send ends the task early; the agent discovers the loss on its
/// next use of the connection and reconnects.
async fn keep_alive(
    mut conn: Connection,
    heartbeat_interval: Duration,
    mut stop: oneshot::Receiver<()>,
) -> Connection {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);

    loop {
        tokio::select! {
            _ = &mut stop => return conn,
            _ = heartbeat.tick() => {
                if conn.send(&Heartbeat::new()).await.is_err() {
                    return conn;
                }
            }
        }
    }
}

impl ClientAgent {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            identity: PeerId::new(),
            idle: None,
        }
    }

    /// Submits one board and blocks until the aggregated best move comes
    /// back. Connect failures and transport losses alike go back through
    /// discovery; nothing here is fatal to the owning process.
    pub async fn request_best_move(&mut self, board: &str, depth: u32) -> Result<MoveReply> {
        let request = MoveRequest {
            board: board.to_string(),
            depth,
        };

        loop {
            let mut conn = match self.reclaim().await {
                Some(conn) => conn,
                None => match self.connect().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        // The catalog record can outlive the broker it points
                        // at; go back through discovery rather than giving up.
                        tracing::warn!("Failed to connect to broker: {}", e);
                        let jitter = rand::random::<u64>() % 500;
                        tokio::time::sleep(RECONNECT_DELAY + Duration::from_millis(jitter)).await;
                        continue;
                    }
                },
            };

            let outcome = async {
                conn.send(&request).await?;
                await_reply(&mut conn, self.config.heartbeat_interval).await
            }
            .await;

            match outcome {
                Ok(reply) => {
                    self.park(conn);
                    return Ok(reply);
                }
                Err(e) => {
                    tracing::warn!("Request failed, reconnecting: {}", e);
                    let jitter = rand::random::<u64>() % 500;
                    tokio::time::sleep(RECONNECT_DELAY + Duration::from_millis(jitter)).await;
                }
            }
        }
    }

    /// Hands the connection to a keepalive task so the broker-side session
    /// stays alive between requests.
    fn park(&mut self, conn: Connection) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(keep_alive(conn, self.config.heartbeat_interval, stop_rx));
        self.idle = Some(IdleConnection {
            stop: stop_tx,
            task,
        });
    }

    /// Takes the connection back from the keepalive task, if one is parked.
    async fn reclaim(&mut self) -> Option<Connection> {
        let idle = self.idle.take()?;
        let _ = idle.stop.send(());
        idle.task.await.ok()
    }

    async fn connect(&self) -> Result<Connection> {
        let service = client_service_type(&self.config.name);
        let addr = lookup::locate(&self.config.catalog, &service).await;
        Connection::open(&addr, &self.identity).await
    }
}
