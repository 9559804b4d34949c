//! A single Raft node serving a replicated key-value store over newline-delimited JSON on
//! stdin/stdout, suitable for embedding in a multi-node test harness.
//!
//! The consensus algorithm itself lives in the `raft` crate; this crate supplies the ambient
//! stack around it: the wire format, the transport that frames it, the key-value state machine
//! committed entries are applied to, configuration, and the orchestrator that wires all of it
//! together and drives the maintenance/election loops.

pub mod config;
pub mod error;
pub mod kv;
pub mod raft_node;
pub mod transport;
pub mod wire;
