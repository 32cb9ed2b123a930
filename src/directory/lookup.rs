use super::types::ServiceRecord;

use anyhow::Result;
use std::time::Duration;

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_BASE_DELAY_MS: u64 = 500;
const RETRY_MAX_DELAY_MS: u64 = 8_000;

/// Picks the freshest record matching the wanted type tag.
///
/// Multiple adverts for the same service accumulate in the catalog (old
/// broker instances, restarts on new ports), so the most recently
/// heard-from one wins.
pub fn select_record(records: &[ServiceRecord], service_type: &str) -> Option<(String, u16)> {
    records
        .iter()
        .filter(|r| r.service_type.as_deref() == Some(service_type))
        .filter(|r| r.name.is_some() && r.port.is_some())
        .max_by(|a, b| {
            let a = a.lastheardfrom.unwrap_or(0.0);
            let b = b.lastheardfrom.unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|r| (r.name.clone().unwrap_or_default(), r.port.unwrap_or_default()))
}

/// One catalog query. Returns the chosen `host:port`, or `None` if no
/// matching record is listed yet.
pub async fn query_once(
    http_client: &reqwest::Client,
    catalog: &str,
    service_type: &str,
) -> Result<Option<String>> {
    let url = format!("http://{}/query.json", catalog);

    let response = http_client
        .get(&url)
        .timeout(QUERY_TIMEOUT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(anyhow::anyhow!("Catalog query failed: {}", response.status()));
    }

    let records: Vec<ServiceRecord> = response.json().await?;

    Ok(select_record(&records, service_type).map(|(host, port)| format!("{}:{}", host, port)))
}

/// Queries the catalog until a matching record shows up.
///
/// Agents call this on startup and after every transport loss; backing off
/// with jitter keeps a herd of restarted agents from hammering the catalog.
pub async fn locate(catalog: &str, service_type: &str) -> String {
    let http_client = reqwest::Client::new();
    let mut delay_ms = RETRY_BASE_DELAY_MS;

    loop {
        match query_once(&http_client, catalog, service_type).await {
            Ok(Some(addr)) => {
                tracing::info!("Located {} at {}", service_type, addr);
                return addr;
            }
            Ok(None) => {
                tracing::debug!("No {} record listed yet", service_type);
            }
            Err(e) => {
                tracing::warn!("Catalog query failed: {}", e);
            }
        }

        let jitter = rand::random::<u64>() % 250;
        tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
        delay_ms = (delay_ms * 2).min(RETRY_MAX_DELAY_MS);
    }
}
