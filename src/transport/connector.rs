use super::types::{Hello, PeerId};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Agent-side connection to the broker.
///
/// Sends the identity hello as its first frame, then exchanges
/// newline-delimited JSON. A `None` from [`Connection::recv`] is the
/// connection-lost event; the owning agent tears down and re-runs discovery.
pub struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    remote: String,
}

impl Connection {
    /// Connects and performs the hello handshake.
    pub async fn open(addr: &str, identity: &PeerId) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();

        let mut conn = Self {
            lines: BufReader::new(read_half).lines(),
            writer: write_half,
            remote: addr.to_string(),
        };

        conn.send(&Hello {
            id: identity.clone(),
        })
        .await?;

        tracing::info!("Connected to {} as {:?}", addr, identity);
        Ok(conn)
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Serializes and sends one frame.
    pub async fn send<T: serde::Serialize>(&mut self, msg: &T) -> Result<()> {
        let line = serde_json::to_string(msg)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        Ok(())
    }

    /// Receives the next frame. `None` means the connection is gone.
    pub async fn recv(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(Some(line)) => Some(line),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("Read error from {}: {}", self.remote, e);
                None
            }
        }
    }
}
