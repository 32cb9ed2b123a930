use serde::{Deserialize, Serialize};

/// Record advertised to the catalog.
///
/// The catalog fills in the sender's hostname and a `lastheardfrom`
/// timestamp on its side, so the advert itself only carries what the
/// service knows: its type tag, port, and owner.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceAdvert {
    #[serde(rename = "type")]
    pub service_type: String,
    pub port: u16,
    pub owner: String,
    pub project: String,
}

/// Record as returned by the catalog's `query.json`.
///
/// The listing mixes records from unrelated services with arbitrary extra
/// fields, so everything beyond the type tag is optional and lookup filters
/// defensively.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRecord {
    #[serde(rename = "type", default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub lastheardfrom: Option<f64>,
}
