//! Core Raft value types: term and log-index newtypes, the typed client operation carried by
//! each log entry, and the internal RPC payloads exchanged between peers.
//!
//! These types are deliberately plain (`Serialize`/`Deserialize`, no wire framing) — the binary
//! crate's `wire` module owns the JSON envelope and converts to/from these values at the
//! boundary, per the "dynamic dispatch -> tagged variants, parsed at the boundary" design note.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// The identity of a peer (Raft node or client) in the cluster, as carried on the wire.
pub type PeerId = String;

/// A monotonically-increasing Raft leadership term.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term(
    /// The non-negative integer identifying this term.
    pub u64,
);

impl Term {
    /// The term of the sentinel log entry.
    pub const ZERO: Term = Term(0);
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl AddAssign<u64> for Term {
    fn add_assign(&mut self, rhs: u64) {
        self.0 = self.0.checked_add(rhs).expect("term overflow");
    }
}

/// A 1-based index into a [`Log`](crate::log::Log). Index `0` means "before the log".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogIndex(
    /// The non-negative integer identifying this index.
    pub u64,
);

impl LogIndex {
    /// The index "before the log", used as `prev_log_index` when there is no previous entry.
    pub const ZERO: LogIndex = LogIndex(0);

    /// Subtracts `dec` from this index, returning `None` on underflow.
    pub fn checked_sub(self, dec: u64) -> Option<Self> {
        self.0.checked_sub(dec).map(LogIndex)
    }
}

impl fmt::Display for LogIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "idx{}", self.0)
    }
}

impl PartialOrd for LogIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Add<u64> for LogIndex {
    type Output = Self;
    fn add(self, inc: u64) -> Self {
        LogIndex(self.0.checked_add(inc).expect("log index overflow"))
    }
}

impl Sub<u64> for LogIndex {
    type Output = Self;
    fn sub(self, dec: u64) -> Self {
        LogIndex(self.0.saturating_sub(dec))
    }
}

/// A client-originated operation against the key-value state machine, embedded in a committed
/// [`LogEntry`]. Carries enough of the originating request (`client`, `msg_id`) that the state
/// machine can address its response once the entry commits, without the log needing to know
/// anything about the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientOp {
    /// The peer id of the client that issued the request.
    pub client: PeerId,
    /// The client's request `msg_id`, echoed back as `in_reply_to` on the eventual response.
    pub msg_id: u64,
    /// The operation itself.
    pub kind: ClientOpKind,
}

/// The kind of operation requested against the key-value state machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientOpKind {
    /// Look up `key`.
    Read { key: String },
    /// Set `key` to `value` unconditionally.
    Write { key: String, value: String },
    /// Set `key` to `to` only if its current value is `from`.
    Cas { key: String, from: String, to: String },
}

/// An entry in the Raft log: the term it was appended in, and the client operation it carries
/// (`None` only for the index-1 sentinel entry).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term in which this entry was appended by its leader.
    pub term: Term,
    /// The client operation carried by this entry (`None` only for the index-1 sentinel).
    pub op: Option<ClientOp>,
}

impl LogEntry {
    /// The sentinel entry seeded at index 1 of every log.
    pub fn sentinel() -> Self {
        LogEntry {
            term: Term::ZERO,
            op: None,
        }
    }
}

//
// RPC payloads
//

/// A `request_vote` request, as understood internally (term travels alongside on the wire).
#[derive(Clone, Debug, PartialEq)]
pub struct VoteRequest {
    /// The id of the node requesting a vote.
    pub candidate_id: PeerId,
    /// The index of the candidate's last log entry.
    pub last_log_index: LogIndex,
    /// The term of the candidate's last log entry.
    pub last_log_term: Term,
}

/// A `request_vote` response.
#[derive(Clone, Debug, PartialEq)]
pub struct VoteResponse {
    /// Whether the vote was granted.
    pub vote_granted: bool,
}

/// An `append_entries` request.
#[derive(Clone, Debug, PartialEq)]
pub struct AppendRequest {
    /// The id of the sending leader.
    pub leader_id: PeerId,
    /// The index of the log entry immediately preceding `entries`.
    pub prev_log_index: LogIndex,
    /// The term of the log entry immediately preceding `entries`.
    pub prev_log_term: Term,
    /// The entries to append, in order. Empty for a heartbeat.
    pub entries: Vec<LogEntry>,
    /// The leader's commit index, used by the follower to advance its own.
    pub leader_commit: LogIndex,
}

/// An `append_entries` response.
#[derive(Clone, Debug, PartialEq)]
pub struct AppendResponse {
    /// Whether the append was accepted.
    pub success: bool,
}
