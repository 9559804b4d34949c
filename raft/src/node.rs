//! The public, stable API of this crate: [`Node`] and its [`Config`].
//!
//! `Node` is a thin wrapper over [`crate::core::State`] — the low-level type doing the actual
//! work — that exists so callers outside this crate depend on a small, named surface rather than
//! reaching into `core` directly.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::clock::Clock;
use crate::core::{self, AlreadyInitialized, NotLeaderError, Role, State};
use crate::log::Log;
use crate::message::*;

/// Timing constants a [`Node`] needs. `heartbeat_interval` is always derived from
/// `election_timeout`, per the spec's 1:2 ratio between heartbeat and minimum election timeout.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// The base election timeout. A node's actual deadline is drawn uniformly from
    /// `[election_timeout, 2 * election_timeout)` to avoid split votes.
    pub election_timeout: Duration,
}

impl Config {
    /// The fixed interval at which a leader re-sends `append_entries` to an up-to-date follower.
    pub fn heartbeat_interval(&self) -> Duration {
        self.election_timeout / 2
    }
}

impl Default for Config {
    fn default() -> Self {
        Self { election_timeout: Duration::from_secs(2) }
    }
}

/// A single Raft node: role state, log, and replication bookkeeping, generic over its log storage
/// and time source so tests can supply an in-memory log and a manually-advanced clock.
pub struct Node<L, C> {
    state: State<L, C>,
}

impl<L, C> Node<L, C>
where
    L: Log,
    C: Clock,
{
    /// Builds a node in the `Nascent` role. It does nothing useful until [`init`](Self::init)
    /// runs.
    pub fn new(log: L, clock: C, config: Config) -> Self {
        Self { state: State::new(log, clock, config) }
    }

    /// Records this node's id and the full cluster membership, and transitions it to `Follower`.
    /// Fails if called more than once.
    pub fn init(&mut self, node_id: PeerId, node_ids: BTreeSet<PeerId>) -> Result<(), AlreadyInitialized> {
        self.state.init(node_id, node_ids)
    }

    /// Returns this node's id.
    pub fn node_id(&self) -> &PeerId {
        self.state.node_id()
    }

    /// Returns the current Raft term.
    pub fn current_term(&self) -> Term {
        self.state.current_term()
    }

    /// Returns the highest log index known to be committed.
    pub fn commit_index(&self) -> LogIndex {
        self.state.commit_index()
    }

    /// Returns the highest log index applied to the state machine so far.
    pub fn last_applied(&self) -> LogIndex {
        self.state.last_applied()
    }

    /// Returns a reference to the node's log.
    pub fn log(&self) -> &L {
        self.state.log()
    }

    /// Returns whether this node believes itself to be the leader of the current term.
    pub fn is_leader(&self) -> bool {
        self.state.is_leader()
    }

    /// Returns this node's current role.
    pub fn role(&self) -> Role {
        self.state.role()
    }

    /// Returns the peer this node currently believes leads the cluster, if known.
    pub fn leader_hint(&self) -> Option<&PeerId> {
        self.state.leader_hint()
    }

    /// Returns the ids of all other members of the cluster.
    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.state.peers()
    }

    /// Returns whether the election deadline has passed.
    pub fn election_timed_out(&self) -> bool {
        self.state.election_timed_out()
    }

    /// Returns whether this node is leader and its heartbeat deadline has passed.
    pub fn heartbeat_due(&self) -> bool {
        self.state.heartbeat_due()
    }

    /// Called when the election deadline has elapsed. Starts a new election if Follower or
    /// Candidate, returning the `request_vote` to broadcast; otherwise just resets the deadline.
    pub fn on_election_timeout(&mut self) -> Option<VoteRequest> {
        self.state.on_election_timeout()
    }

    /// Handles an inbound `request_vote`, returning the response to send back.
    pub fn handle_vote_request(&mut self, term: Term, req: VoteRequest, from: PeerId) -> VoteResponse {
        self.state.handle_vote_request(term, req, from)
    }

    /// Handles an inbound `request_vote_res` from a peer this node solicited a vote from.
    pub fn handle_vote_response(&mut self, term: Term, res: VoteResponse, from: PeerId) {
        self.state.handle_vote_response(term, res, from)
    }

    /// Builds the `append_entries` requests a leader should send this round. Returns nothing if
    /// not leader. Each tuple is `(peer, next_index_at_send_time, request)`; the caller must
    /// thread `next_index_at_send_time` back through [`on_append_success`](Self::on_append_success)
    /// / [`on_append_failure`](Self::on_append_failure).
    pub fn replicate_log(&mut self, force: bool) -> Vec<(PeerId, LogIndex, AppendRequest)> {
        self.state.replicate_log(force)
    }

    /// Handles an inbound `append_entries`, returning the response to send back.
    pub fn handle_append_request(&mut self, term: Term, req: AppendRequest, from: PeerId) -> AppendResponse {
        self.state.handle_append_request(term, req, from)
    }

    /// Records a successful `append_entries` reply from `peer`, advancing its `next_index`/
    /// `match_index` bookkeeping.
    pub fn on_append_success(&mut self, peer: &PeerId, ni: LogIndex, entries_sent: u64) {
        self.state.on_append_success(peer, ni, entries_sent)
    }

    /// Records a rejected `append_entries` reply from `peer`, backing off its `next_index`.
    pub fn on_append_failure(&mut self, peer: &PeerId) {
        self.state.on_append_failure(peer)
    }

    /// Steps down to Follower if `remote_term` is newer than the current term. Returns whether a
    /// step-down occurred.
    pub fn maybe_step_down(&mut self, remote_term: Term) -> bool {
        self.state.maybe_step_down(remote_term)
    }

    /// Leader-only: advances `commit_index` to the highest index replicated on a majority of the
    /// cluster in the current term.
    pub fn leader_advance_commit_index(&mut self) {
        self.state.leader_advance_commit_index()
    }

    /// Advances `last_applied` up to `commit_index`, returning each newly-committed entry for the
    /// caller to apply to its state machine.
    pub fn take_newly_committed(&mut self) -> Vec<(LogIndex, LogEntry)> {
        self.state.take_newly_committed()
    }

    /// Appends a client operation to the log if this node is leader. Fails otherwise.
    pub fn client_request(&mut self, op: ClientOp) -> Result<(), NotLeaderError> {
        self.state.client_request(op)
    }
}

/// `floor(n/2) + 1`: the minimum number of votes (or replicas) needed to act for a cluster of `n`.
pub use core::majority;
