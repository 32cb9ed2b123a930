//! Transport Channel
//!
//! Identity-tagged, message-framed TCP connections. Frames are single JSON
//! documents separated by newlines. The first frame on every connection is a
//! hello carrying the peer's self-chosen identity, which the peer keeps for
//! its whole process lifetime; a reconnecting agent therefore lands on the
//! same broker-side record instead of appearing as a brand new peer.
//!
//! ## Submodules
//! - **`types`**: Peer identity and the event stream delivered to the owner.
//! - **`listener`**: Broker-side endpoint accepting many peers on one port.
//! - **`connector`**: Agent-side single connection with send/recv.

pub mod types;
pub mod listener;
pub mod connector;
