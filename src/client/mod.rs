//! Client Agent Module
//!
//! The requesting side of the cluster: submit one full board, heartbeat
//! while the broker fans the work out, and collect the single aggregated
//! answer. Reconnection and resubmission are handled here so callers see
//! one blocking ask-and-answer call.

pub mod agent;
