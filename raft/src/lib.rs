//! Raft consensus core for a single replicated key-value node.
//!
//! This crate implements the Raft state machine — leader election, log replication, commit
//! advancement — without knowing anything about JSON, stdio, or the key-value store it serves.
//! [`node::Node`] is the crate's public surface: construct one with a [`log::Log`] implementation
//! and a [`clock::Clock`], feed it the inbound RPCs a transport layer decodes, and drive its
//! election/maintenance loops on a timer. Everything it produces — outbound RPC bodies, newly
//! committed log entries — is returned as plain data for the caller to act on.
//!
//! This implementation omits optional Raft extensions found in some implementations:
//! pre-voting, cluster membership changes, log compaction/snapshots, and durable persistence of
//! term/vote/log are all out of scope (see the crate's design notes for why).

#![warn(missing_docs)]

pub mod clock;
pub mod core;
pub mod log;
pub mod message;
pub mod node;
