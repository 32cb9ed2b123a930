use super::types::{Hello, PeerEvent, PeerId};

use anyhow::Result;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const WRITE_CHANNEL_CAPACITY: usize = 64;

/// Per-connection bookkeeping held by the endpoint.
struct ConnectionHandle {
    outbound: mpsc::Sender<String>,
    closed: Arc<Notify>,
}

/// One listening side of the transport.
///
/// Accepts any number of peers on a single port and multiplexes everything
/// they say onto one event channel, tagged with the identity each peer
/// presented in its hello frame. The broker runs two of these, one for
/// workers and one for clients.
pub struct Endpoint {
    connections: Arc<DashMap<PeerId, ConnectionHandle>>,
    local_addr: SocketAddr,
}

impl Endpoint {
    /// Binds the listener and starts the accept loop.
    ///
    /// Returns the endpoint handle plus the receiving end of the event
    /// stream. The accept loop and per-connection tasks run until the
    /// endpoint owner drops the receiver and the handle.
    pub async fn bind(addr: SocketAddr) -> Result<(Self, mpsc::Receiver<PeerEvent>)> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let connections: Arc<DashMap<PeerId, ConnectionHandle>> = Arc::new(DashMap::new());
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let accept_connections = connections.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        tracing::debug!("Accepted connection from {}", remote);
                        let connections = accept_connections.clone();
                        let events = events_tx.clone();
                        tokio::spawn(async move {
                            serve_connection(stream, remote, connections, events).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept failed: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        });

        Ok((
            Self {
                connections,
                local_addr,
            },
            events_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends one frame to a connected peer without ever blocking the caller.
    ///
    /// Returns an error if the peer has no live connection. A peer whose
    /// write queue is full has stopped reading; it gets kicked on the spot,
    /// since waiting on it would stall every other peer the caller serves.
    /// Either way the error reads as transport loss and the liveness sweep
    /// sorts the peer out.
    pub fn send(&self, peer: &PeerId, line: String) -> Result<()> {
        let outbound = match self.connections.get(peer) {
            Some(handle) => handle.outbound.clone(),
            None => return Err(anyhow::anyhow!("Peer {:?} is not connected", peer)),
        };

        match outbound.try_send(line) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.kick(peer);
                Err(anyhow::anyhow!(
                    "Peer {:?} stopped reading, dropping its connection",
                    peer
                ))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(anyhow::anyhow!("Connection to {:?} is closing", peer))
            }
        }
    }

    /// Serializes and sends one message to a connected peer.
    pub fn send_json<T: serde::Serialize>(&self, peer: &PeerId, msg: &T) -> Result<()> {
        self.send(peer, serde_json::to_string(msg)?)
    }

    /// Force-closes a peer's connection.
    ///
    /// Used when the peer sent an unparsable frame: the connection is
    /// considered poisoned and the peer is expected to reconnect.
    pub fn kick(&self, peer: &PeerId) {
        if let Some((_, handle)) = self.connections.remove(peer) {
            tracing::warn!("Kicking peer {:?}", peer);
            handle.closed.notify_one();
        }
    }

    /// Number of currently connected peers.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// Runs one accepted connection to completion.
///
/// Reads the hello frame, registers the peer, then pumps inbound frames into
/// the event channel until EOF, a read error, or a kick.
async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    connections: Arc<DashMap<PeerId, ConnectionHandle>>,
    events: mpsc::Sender<PeerEvent>,
) {
    let (read_half, write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    // The hello must be the first frame; anything else is a protocol error
    // and the connection is dropped before it gets a peer record.
    let peer = match lines.next_line().await {
        Ok(Some(line)) => match serde_json::from_str::<Hello>(&line) {
            Ok(hello) => hello.id,
            Err(e) => {
                tracing::warn!("Bad hello from {}: {}", remote, e);
                return;
            }
        },
        Ok(None) => {
            tracing::debug!("{} closed before hello", remote);
            return;
        }
        Err(e) => {
            tracing::debug!("Read error from {} before hello: {}", remote, e);
            return;
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::channel(WRITE_CHANNEL_CAPACITY);
    let closed = Arc::new(Notify::new());

    // A reconnecting peer replaces its previous connection.
    if let Some(stale) = connections.insert(
        peer.clone(),
        ConnectionHandle {
            outbound: outbound_tx,
            closed: closed.clone(),
        },
    ) {
        tracing::info!("Peer {:?} reconnected, closing stale connection", peer);
        stale.closed.notify_one();
    }

    let writer = tokio::spawn(write_loop(write_half, outbound_rx));

    if events.send(PeerEvent::Connected(peer.clone())).await.is_err() {
        connections.remove(&peer);
        writer.abort();
        return;
    }

    loop {
        tokio::select! {
            _ = closed.notified() => {
                tracing::debug!("Connection for {:?} closed by endpoint", peer);
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if events.send(PeerEvent::Message(peer.clone(), line)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("Peer {:?} disconnected (EOF)", peer);
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("Read error from {:?}: {}", peer, e);
                        break;
                    }
                }
            }
        }
    }

    // Only deregister if a reconnect has not already replaced this handle.
    if let Some(entry) = connections.get(&peer) {
        if Arc::ptr_eq(&entry.closed, &closed) {
            drop(entry);
            connections.remove(&peer);
        }
    }

    writer.abort();
    let _ = events.send(PeerEvent::Disconnected(peer)).await;
}

/// Drains the outbound channel onto the socket, one frame per line.
async fn write_loop(mut write_half: OwnedWriteHalf, mut outbound: mpsc::Receiver<String>) {
    while let Some(line) = outbound.recv().await {
        if let Err(e) = write_half.write_all(line.as_bytes()).await {
            tracing::debug!("Write failed: {}", e);
            break;
        }
        if let Err(e) = write_half.write_all(b"\n").await {
            tracing::debug!("Write failed: {}", e);
            break;
        }
    }
}
