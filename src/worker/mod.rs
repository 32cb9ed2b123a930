//! Worker Agent Module
//!
//! The broker-facing side of a worker process: announce readiness, accept
//! one sub-task at a time, evaluate it with the owned engine, return the
//! result, repeat. Heartbeats ride the same multiplexed wait as task
//! traffic, and any transport loss sends the agent back through discovery.

pub mod agent;
