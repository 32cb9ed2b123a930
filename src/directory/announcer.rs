use super::types::ServiceAdvert;

use anyhow::Result;
use std::time::Duration;
use tokio::net::UdpSocket;

const ADVERT_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically advertises the broker's service records to the catalog.
///
/// One UDP datagram per record per interval. Send failures are logged and
/// retried on the next tick; the catalog treats a quiet service as stale on
/// its own schedule, so there is nothing else to do locally.
pub struct Announcer {
    socket: UdpSocket,
    catalog: String,
    adverts: Vec<ServiceAdvert>,
}

impl Announcer {
    pub async fn new(catalog: String, adverts: Vec<ServiceAdvert>) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self {
            socket,
            catalog,
            adverts,
        })
    }

    pub async fn run(self) {
        tracing::info!(
            "Advertising {} record(s) to catalog {}",
            self.adverts.len(),
            self.catalog
        );

        let mut interval = tokio::time::interval(ADVERT_INTERVAL);

        loop {
            interval.tick().await;

            for advert in &self.adverts {
                let payload = match serde_json::to_vec(advert) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::error!("Failed to serialize advert: {}", e);
                        continue;
                    }
                };

                match self.socket.send_to(&payload, self.catalog.as_str()).await {
                    Ok(_) => {
                        tracing::debug!(
                            "Advertised {} on port {}",
                            advert.service_type,
                            advert.port
                        );
                    }
                    Err(e) => {
                        tracing::warn!("Failed to advertise to {}: {}", self.catalog, e);
                    }
                }
            }
        }
    }
}
