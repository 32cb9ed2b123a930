//! Peer Directory
//!
//! Discovery via an external catalog service. The broker advertises one
//! record per role (`<name>chessWorker`, `<name>chessClient`) as JSON UDP
//! datagrams; agents query the catalog's HTTP `query.json` listing and pick
//! the freshest record with a matching type tag. The `<name>` prefix lets
//! independent broker instances share one catalog without collision.

pub mod types;
pub mod announcer;
pub mod lookup;


/// Directory type tag for the broker's worker-facing port.
pub fn worker_service_type(name: &str) -> String {
    format!("{}chessWorker", name)
}

/// Directory type tag for the broker's client-facing port.
pub fn client_service_type(name: &str) -> String {
    format!("{}chessClient", name)
}
