//! Wires a [`raft::node::Node`] and a [`Kv`] state machine to the [`Transport`], and drives the
//! maintenance and election loops.
//!
//! Mirrors the teacher's `Arc<Mutex<Raft>>` plus background-thread pattern: one mutex guards the
//! node and the state machine together (they only ever change in the same critical section, when
//! a committed entry is applied), and the maintenance/election loops are plain `std::thread`s
//! sleeping on a fixed cadence, as in `cluster::Cluster::init`.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{error, warn};

use raft::clock::SystemClock;
use raft::log::memory::InMemoryLog;
use raft::message::{AppendRequest, ClientOp, ClientOpKind, LogIndex, PeerId, Term, VoteRequest, VoteResponse};
use raft::node::Node;

use crate::config::Config;
use crate::error::TransportError;
use crate::kv::{self, Kv};
use crate::transport::Transport;
use crate::wire::{self, Envelope, Payload};

struct Inner {
    node: Node<InMemoryLog, SystemClock>,
    kv: Kv,
}

/// The running node: Raft core, key-value state machine, and the transport that carries both.
pub struct RaftNode {
    inner: Mutex<Inner>,
    transport: Arc<Transport>,
    config: Config,
}

impl RaftNode {
    pub fn new(transport: Arc<Transport>, config: Config) -> Arc<Self> {
        let node = Node::new(InMemoryLog::new(), SystemClock, config.node_config());
        Arc::new(Self {
            inner: Mutex::new(Inner { node, kv: Kv::new() }),
            transport,
            config,
        })
    }

    /// Registers an inbound handler for every message type this node accepts.
    pub fn register_handlers(self: &Arc<Self>) -> Result<(), TransportError> {
        let this = Arc::clone(self);
        self.transport.on("raft_init", move |t, e| this.handle_raft_init(t, e))?;
        let this = Arc::clone(self);
        self.transport.on("request_vote", move |t, e| this.handle_request_vote(t, e))?;
        let this = Arc::clone(self);
        self.transport.on("append_entries", move |t, e| this.handle_append_entries(t, e))?;
        let this = Arc::clone(self);
        self.transport.on("read", move |t, e| this.handle_read(t, e))?;
        let this = Arc::clone(self);
        self.transport.on("write", move |t, e| this.handle_write(t, e))?;
        let this = Arc::clone(self);
        self.transport.on("cas", move |t, e| this.handle_cas(t, e))?;
        Ok(())
    }

    //
    // Inbound handlers
    //

    fn handle_raft_init(&self, transport: &Transport, envelope: Envelope) {
        let (msg_id, node_id, node_ids) = match &envelope.body {
            Payload::RaftInit { msg_id, node_id, node_ids } => (*msg_id, node_id.clone(), node_ids.clone()),
            _ => return,
        };
        transport.set_node_id(node_id.clone());
        let result = self.inner.lock().unwrap().node.init(node_id.clone(), node_ids.into_iter().collect());
        match result {
            Ok(()) => {
                if let Some(msg_id) = msg_id {
                    if let Err(e) = transport.reply(&envelope, Payload::RaftInitOk { in_reply_to: msg_id }) {
                        error!("failed to reply to raft_init: {}", e);
                    }
                }
            }
            Err(e) => error!("{}: {}", node_id, crate::error::ProtocolError::from(e)),
        }
    }

    fn handle_request_vote(&self, transport: &Transport, envelope: Envelope) {
        let (msg_id, term, candidate_id, last_log_index, last_log_term) = match &envelope.body {
            Payload::RequestVote { msg_id, term, candidate_id, last_log_index, last_log_term } => {
                (*msg_id, *term, candidate_id.clone(), *last_log_index, *last_log_term)
            }
            _ => return,
        };
        let Some(msg_id) = msg_id else { return };
        let from = envelope.src.clone();
        let (res, current_term) = {
            let mut guard = self.inner.lock().unwrap();
            let res = guard.node.handle_vote_request(
                term,
                VoteRequest { candidate_id, last_log_index, last_log_term },
                from,
            );
            (res, guard.node.current_term())
        };
        if let Err(e) = transport.reply(&envelope, wire::vote_response_payload(current_term, res, msg_id)) {
            error!("failed to reply to request_vote: {}", e);
        }
    }

    fn handle_append_entries(&self, transport: &Transport, envelope: Envelope) {
        let (msg_id, term, leader_id, prev_log_index, prev_log_term, entries, leader_commit) = match &envelope.body {
            Payload::AppendEntries {
                msg_id,
                term,
                leader_id,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            } => (*msg_id, *term, leader_id.clone(), *prev_log_index, *prev_log_term, entries.clone(), *leader_commit),
            _ => return,
        };
        let Some(msg_id) = msg_id else { return };
        let from = envelope.src.clone();
        let (res, current_term) = {
            let mut guard = self.inner.lock().unwrap();
            let res = guard.node.handle_append_request(
                term,
                AppendRequest { leader_id, prev_log_index, prev_log_term, entries, leader_commit },
                from,
            );
            (res, guard.node.current_term())
        };
        if let Err(e) = transport.reply(&envelope, wire::append_response_payload(current_term, res, msg_id)) {
            error!("failed to reply to append_entries: {}", e);
        }
    }

    fn handle_read(&self, transport: &Transport, envelope: Envelope) {
        let (msg_id, key) = match &envelope.body {
            Payload::Read { msg_id, key } => (*msg_id, key.clone()),
            _ => return,
        };
        let Some(msg_id) = msg_id else { return };
        self.handle_client_op(transport, &envelope, msg_id, ClientOpKind::Read { key });
    }

    fn handle_write(&self, transport: &Transport, envelope: Envelope) {
        let (msg_id, key, value) = match &envelope.body {
            Payload::Write { msg_id, key, value } => (*msg_id, key.clone(), value.clone()),
            _ => return,
        };
        let Some(msg_id) = msg_id else { return };
        self.handle_client_op(transport, &envelope, msg_id, ClientOpKind::Write { key, value });
    }

    fn handle_cas(&self, transport: &Transport, envelope: Envelope) {
        let (msg_id, key, from, to) = match &envelope.body {
            Payload::Cas { msg_id, key, from, to } => (*msg_id, key.clone(), from.clone(), to.clone()),
            _ => return,
        };
        let Some(msg_id) = msg_id else { return };
        self.handle_client_op(transport, &envelope, msg_id, ClientOpKind::Cas { key, from, to });
    }

    /// Appends `kind` to the log if this node is leader; the client's response is sent later, once
    /// the entry commits and is applied (see `maintenance_tick`). A non-leader is told so at once.
    fn handle_client_op(&self, transport: &Transport, envelope: &Envelope, msg_id: u64, kind: ClientOpKind) {
        let op = ClientOp { client: envelope.src.clone(), msg_id, kind };
        let accepted = self.inner.lock().unwrap().node.client_request(op).is_ok();
        if !accepted {
            let body = Payload::Error { in_reply_to: msg_id, code: 11, text: "not a leader".to_string() };
            if let Err(e) = transport.reply(envelope, body) {
                error!("failed to reply with not-a-leader error: {}", e);
            }
        }
    }

    //
    // Maintenance loop (§4.10)
    //

    pub fn run_maintenance_loop(self: Arc<Self>) {
        loop {
            thread::sleep(self.config.maintenance_tick);
            self.maintenance_tick();
        }
    }

    fn maintenance_tick(&self) {
        let (term, outgoing, committed) = {
            let mut guard = self.inner.lock().unwrap();
            let term = guard.node.current_term();
            let mut outgoing = guard.node.replicate_log(false);
            if guard.node.heartbeat_due() {
                outgoing.extend(guard.node.replicate_log(true));
            }
            guard.node.leader_advance_commit_index();
            let newly_committed = guard.node.take_newly_committed();
            let is_leader = guard.node.is_leader();
            let mut responses = Vec::new();
            for (_, entry) in newly_committed {
                if let Some(op) = entry.op {
                    let response = guard.kv.apply(op.kind);
                    if is_leader {
                        responses.push((op.client, op.msg_id, response));
                    }
                }
            }
            (term, outgoing, responses)
        };

        for (peer, ni, req) in outgoing {
            self.send_append_entries(term, peer, ni, req);
        }
        for (client, msg_id, response) in committed {
            let body = client_response_payload(response, msg_id);
            if let Err(e) = self.transport.send(&client, body) {
                warn!("failed to send client response to {}: {}", client, e);
            }
        }
    }

    fn send_append_entries(self: &Arc<Self>, term: Term, peer: PeerId, ni: LogIndex, req: AppendRequest) {
        let entries_sent = req.entries.len() as u64;
        let this = Arc::clone(self);
        let peer_for_handler = peer.clone();
        let send_result = self.transport.rpc(
            &peer,
            move |msg_id| Payload::AppendEntries {
                msg_id: Some(msg_id),
                term,
                leader_id: req.leader_id,
                prev_log_index: req.prev_log_index,
                prev_log_term: req.prev_log_term,
                entries: req.entries,
                leader_commit: req.leader_commit,
            },
            move |_, payload| this.handle_append_entries_res(&peer_for_handler, ni, entries_sent, payload),
        );
        if let Err(e) = send_result {
            warn!("failed to send append_entries to {}: {}", peer, e);
        }
    }

    fn handle_append_entries_res(&self, peer: &PeerId, ni: LogIndex, entries_sent: u64, payload: Payload) {
        if let Payload::AppendEntriesRes { term, success, .. } = payload {
            let mut guard = self.inner.lock().unwrap();
            guard.node.maybe_step_down(term);
            // A response from a stale round (this peer's term no longer matches our current
            // term, e.g. after a step-down-and-re-election) must not perturb this episode's
            // next_index/match_index bookkeeping, mirroring handle_vote_response's staleness
            // check in raft::core.
            if term != guard.node.current_term() {
                return;
            }
            if success {
                guard.node.on_append_success(peer, ni, entries_sent);
            } else {
                guard.node.on_append_failure(peer);
            }
        }
    }

    //
    // Election loop (§4.4, §4.10)
    //

    /// Polls for an elapsed election deadline. The node exposes only a boolean
    /// (`election_timed_out`), not the deadline itself, so this loop wakes far more often than the
    /// deadline actually fires; the poll interval is a fixed fraction of a maintenance tick.
    pub fn run_election_loop(self: Arc<Self>) {
        let poll_interval = (self.config.maintenance_tick / 10).max(Duration::from_millis(5));
        loop {
            thread::sleep(poll_interval);
            self.election_tick();
        }
    }

    fn election_tick(self: &Arc<Self>) {
        let (term, peers, req) = {
            let mut guard = self.inner.lock().unwrap();
            if !guard.node.election_timed_out() {
                return;
            }
            match guard.node.on_election_timeout() {
                Some(req) => {
                    let term = guard.node.current_term();
                    let peers: Vec<PeerId> = guard.node.peers().cloned().collect();
                    (term, peers, req)
                }
                None => return,
            }
        };
        for peer in peers {
            self.send_vote_request(term, peer, req.clone());
        }
    }

    fn send_vote_request(self: &Arc<Self>, term: Term, peer: PeerId, req: VoteRequest) {
        let this = Arc::clone(self);
        let peer_for_handler = peer.clone();
        let send_result = self.transport.rpc(
            &peer,
            move |msg_id| Payload::RequestVote {
                msg_id: Some(msg_id),
                term,
                candidate_id: req.candidate_id,
                last_log_index: req.last_log_index,
                last_log_term: req.last_log_term,
            },
            move |_, payload| this.handle_request_vote_res(&peer_for_handler, payload),
        );
        if let Err(e) = send_result {
            warn!("failed to send request_vote to {}: {}", peer, e);
        }
    }

    fn handle_request_vote_res(&self, peer: &PeerId, payload: Payload) {
        if let Payload::RequestVoteRes { term, vote_granted, .. } = payload {
            let mut guard = self.inner.lock().unwrap();
            guard.node.handle_vote_response(term, VoteResponse { vote_granted }, peer.clone());
        }
    }
}

fn client_response_payload(response: kv::Response, in_reply_to: u64) -> Payload {
    match response {
        kv::Response::ReadOk { value } => Payload::ReadOk { in_reply_to, value },
        kv::Response::WriteOk => Payload::WriteOk { in_reply_to },
        kv::Response::CasOk => Payload::CasOk { in_reply_to },
        kv::Response::Error { code, text } => Payload::Error { in_reply_to, code, text },
    }
}
