//! The line-delimited JSON wire format.
//!
//! A frame is one `Envelope` per line of stdin/stdout. `Envelope::body` decodes into the closed,
//! tagged [`Payload`] enum — once a frame crosses this boundary the rest of the node operates on
//! typed Rust values and never touches JSON again.

use serde::{Deserialize, Serialize};

use raft::message::{AppendResponse, LogEntry, PeerId, Term, VoteResponse};

/// The outer frame every line of the transport carries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub src: PeerId,
    pub dest: PeerId,
    pub body: Payload,
}

/// The typed, tagged body of an [`Envelope`]. `msg_id` is set by the sender of a request;
/// `in_reply_to` is set by the sender of a response and echoes the request's `msg_id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Payload {
    #[serde(rename = "raft_init")]
    RaftInit {
        msg_id: Option<u64>,
        node_id: PeerId,
        node_ids: Vec<PeerId>,
    },
    #[serde(rename = "raft_init_ok")]
    RaftInitOk { in_reply_to: u64 },

    #[serde(rename = "request_vote")]
    RequestVote {
        msg_id: Option<u64>,
        term: Term,
        candidate_id: PeerId,
        last_log_index: raft::message::LogIndex,
        last_log_term: Term,
    },
    #[serde(rename = "request_vote_res")]
    RequestVoteRes {
        in_reply_to: u64,
        term: Term,
        vote_granted: bool,
    },

    #[serde(rename = "append_entries")]
    AppendEntries {
        msg_id: Option<u64>,
        term: Term,
        leader_id: PeerId,
        prev_log_index: raft::message::LogIndex,
        prev_log_term: Term,
        entries: Vec<LogEntry>,
        leader_commit: raft::message::LogIndex,
    },
    #[serde(rename = "append_entries_res")]
    AppendEntriesRes {
        in_reply_to: u64,
        term: Term,
        success: bool,
    },

    #[serde(rename = "read")]
    Read { msg_id: Option<u64>, key: String },
    #[serde(rename = "read_ok")]
    ReadOk { in_reply_to: u64, value: String },

    #[serde(rename = "write")]
    Write {
        msg_id: Option<u64>,
        key: String,
        value: String,
    },
    #[serde(rename = "write_ok")]
    WriteOk { in_reply_to: u64 },

    #[serde(rename = "cas")]
    Cas {
        msg_id: Option<u64>,
        key: String,
        from: String,
        to: String,
    },
    #[serde(rename = "cas_ok")]
    CasOk { in_reply_to: u64 },

    #[serde(rename = "error")]
    Error {
        in_reply_to: u64,
        code: u32,
        text: String,
    },
}

impl Payload {
    /// The `msg_id` carried by a request-shaped payload, if any.
    pub fn msg_id(&self) -> Option<u64> {
        match self {
            Payload::RaftInit { msg_id, .. }
            | Payload::RequestVote { msg_id, .. }
            | Payload::AppendEntries { msg_id, .. }
            | Payload::Read { msg_id, .. }
            | Payload::Write { msg_id, .. }
            | Payload::Cas { msg_id, .. } => *msg_id,
            _ => None,
        }
    }

    /// The `in_reply_to` carried by a response-shaped payload, if any.
    pub fn in_reply_to(&self) -> Option<u64> {
        match self {
            Payload::RaftInitOk { in_reply_to }
            | Payload::RequestVoteRes { in_reply_to, .. }
            | Payload::AppendEntriesRes { in_reply_to, .. }
            | Payload::ReadOk { in_reply_to, .. }
            | Payload::WriteOk { in_reply_to }
            | Payload::CasOk { in_reply_to }
            | Payload::Error { in_reply_to, .. } => Some(*in_reply_to),
            _ => None,
        }
    }

    /// The `body.type` string this payload serializes as, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Payload::RaftInit { .. } => "raft_init",
            Payload::RaftInitOk { .. } => "raft_init_ok",
            Payload::RequestVote { .. } => "request_vote",
            Payload::RequestVoteRes { .. } => "request_vote_res",
            Payload::AppendEntries { .. } => "append_entries",
            Payload::AppendEntriesRes { .. } => "append_entries_res",
            Payload::Read { .. } => "read",
            Payload::ReadOk { .. } => "read_ok",
            Payload::Write { .. } => "write",
            Payload::WriteOk { .. } => "write_ok",
            Payload::Cas { .. } => "cas",
            Payload::CasOk { .. } => "cas_ok",
            Payload::Error { .. } => "error",
        }
    }
}

pub fn vote_response_payload(term: Term, res: VoteResponse, in_reply_to: u64) -> Payload {
    Payload::RequestVoteRes { in_reply_to, term, vote_granted: res.vote_granted }
}

pub fn append_response_payload(term: Term, res: AppendResponse, in_reply_to: u64) -> Payload {
    Payload::AppendEntriesRes { in_reply_to, term, success: res.success }
}
