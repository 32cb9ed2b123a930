//! Distributed Chess Analysis Cluster Library
//!
//! This library crate defines the core modules that make up the distributed
//! system. It serves as the foundation for the binary executable
//! (`main.rs`), which runs one of the three process roles.
//!
//! ## Architecture Modules
//! The system is composed of six loosely coupled subsystems:
//!
//! - **`transport`**: Newline-delimited JSON over TCP with identity-carrying
//!   connections. The broker side multiplexes any number of peers onto one
//!   event channel; the agent side is a plain reconnectable client socket.
//! - **`directory`**: Discovery via an external catalog service. The broker
//!   advertises its two ports as UDP datagrams; agents poll the catalog's
//!   HTTP listing to find it.
//! - **`broker`**: The coordination core. Decomposes each client request
//!   into one sub-task per legal move, dispatches to ready workers, reduces
//!   partial results to a single best move, and recovers work from peers
//!   that die silently.
//! - **`engine`**: Chess rules and position scoring. Wraps `shakmaty` for
//!   move generation and drives either a material counter or an external
//!   UCI engine subprocess for leaf evaluation.
//! - **`worker`**: The worker process loop: announce readiness, evaluate
//!   one sub-task at a time, return results.
//! - **`client`**: The requesting side: submit a board, heartbeat while the
//!   cluster works, collect the one aggregated answer.

pub mod broker;
pub mod client;
pub mod directory;
pub mod engine;
pub mod transport;
pub mod worker;
