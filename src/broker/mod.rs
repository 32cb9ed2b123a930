//! Broker Module
//!
//! The single authority matching client demand to worker supply. One task
//! per legal move fans out to whichever workers are ready; partial results
//! reduce to one best move per client request, delivered exactly once;
//! heartbeat expiry recovers silently-dead peers without losing or
//! double-counting work.
//!
//! ## Architecture
//! The event loop is single-threaded by construction: one tokio task owns
//! every registry, session, and queue and multiplexes over the two inbound
//! transport channels plus a sweep timer. Handlers are synchronous methods
//! on [`broker::Broker`], which is what the tests drive directly.
//!
//! ## Submodules
//! - **`types`**: Worker records, client sessions, sub-tasks.
//! - **`protocol`**: Wire-format DTOs for both peer roles.
//! - **`queue`**: Pending sub-tasks awaiting an available worker.
//! - **`registry`**: Worker registry and client session table.
//! - **`broker`**: The state machine plus the async loop around it.

pub mod types;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod broker;

#[cfg(test)]
mod tests;
