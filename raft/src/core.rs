//! Unstable, low-level API for the complete state of a Raft node.
//!
//! [`State`] is deliberately free of any transport or KV concerns: it consumes RPC payloads and
//! produces RPC payloads to send, and exposes the handful of timer/commit/apply operations the
//! orchestrator drives. Everything about *how* those payloads reach a peer, or what happens to a
//! committed [`ClientOp`](crate::message::ClientOp), lives one layer up.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Instant;

use log::{debug, error, info, warn};

use crate::clock::Clock;
use crate::log::Log;
use crate::message::*;
use crate::node::Config;

use self::LeadershipState::*;

/// A node's replication bookkeeping for a single peer, valid only while the node is [`Leader`].
#[derive(Debug)]
struct ReplicationState {
    next_index: LogIndex,
    match_index: LogIndex,
}

enum LeadershipState {
    /// Pre-init: the node has not yet received its `raft_init` frame.
    Nascent,
    Follower(FollowerState),
    Candidate(CandidateState),
    Leader(LeaderState),
}

struct FollowerState {
    leader: Option<PeerId>,
}

struct CandidateState {
    votes_granted: BTreeSet<PeerId>,
}

struct LeaderState {
    followers: BTreeMap<PeerId, ReplicationState>,
}

/// The role a node currently occupies, for introspection and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Pre-init: the node has not yet received its `raft_init` frame.
    Nascent,
    /// Recognizes some other peer (or no one yet) as leader.
    Follower,
    /// Soliciting votes for a new term.
    Candidate,
    /// Recognized by a majority as leader of the current term.
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Nascent => "nascent",
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Leader => "leader",
        };
        f.write_str(name)
    }
}

/// Returned by [`State::init`] if `raft_init` arrives more than once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlreadyInitialized;

impl fmt::Display for AlreadyInitialized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("node received raft_init more than once")
    }
}

/// Returned by [`State::client_request`] when the node is not the leader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotLeaderError;

impl fmt::Display for NotLeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("this node is not a leader")
    }
}

/// The complete state of a single Raft node.
pub struct State<L, C> {
    node_id: PeerId,
    node_ids: BTreeSet<PeerId>,
    clock: C,
    config: Config,

    current_term: Term,
    voted_for: Option<PeerId>,
    leadership: LeadershipState,

    log: L,
    commit_index: LogIndex,
    last_applied: LogIndex,

    election_deadline: Instant,
    heartbeat_deadline: Instant,
}

#[allow(missing_docs)]
impl<L, C> State<L, C>
where
    L: Log,
    C: Clock,
{
    /// Builds a node in the [`Nascent`](Role::Nascent) role. No RPCs can be handled meaningfully
    /// until [`init`](Self::init) runs.
    pub fn new(log: L, clock: C, config: Config) -> Self {
        let now = clock.now();
        Self {
            node_id: PeerId::new(),
            node_ids: BTreeSet::new(),
            clock,
            config,
            current_term: Term::ZERO,
            voted_for: None,
            leadership: Nascent,
            log,
            commit_index: LogIndex::ZERO,
            last_applied: LogIndex(1),
            election_deadline: now,
            heartbeat_deadline: now,
        }
    }

    /// Handles the `raft_init` bootstrap frame: records cluster identity and transitions to
    /// [`Follower`](Role::Follower). Fails if called more than once.
    pub fn init(
        &mut self,
        node_id: PeerId,
        node_ids: BTreeSet<PeerId>,
    ) -> Result<(), AlreadyInitialized> {
        if !matches!(self.leadership, Nascent) {
            return Err(AlreadyInitialized);
        }
        self.node_id = node_id;
        self.node_ids = node_ids;
        self.leadership = Follower(FollowerState { leader: None });
        self.reset_election_deadline();
        info!(
            "{} initialized with cluster {:?}",
            self.node_id, self.node_ids
        );
        Ok(())
    }

    pub fn node_id(&self) -> &PeerId {
        &self.node_id
    }

    pub fn current_term(&self) -> Term {
        self.current_term
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn is_leader(&self) -> bool {
        matches!(self.leadership, Leader(_))
    }

    pub fn role(&self) -> Role {
        match &self.leadership {
            Nascent => Role::Nascent,
            Follower(_) => Role::Follower,
            Candidate(_) => Role::Candidate,
            Leader(_) => Role::Leader,
        }
    }

    /// The peer this node currently believes leads the cluster, if known.
    pub fn leader_hint(&self) -> Option<&PeerId> {
        match &self.leadership {
            Nascent => None,
            Follower(f) => f.leader.as_ref(),
            Candidate(_) => None,
            Leader(_) => Some(&self.node_id),
        }
    }

    /// All other members of the cluster (`node_ids` minus this node).
    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.node_ids.iter().filter(move |id| **id != self.node_id)
    }

    pub fn election_timed_out(&self) -> bool {
        self.clock.now() >= self.election_deadline
    }

    pub fn heartbeat_due(&self) -> bool {
        self.is_leader() && self.clock.now() >= self.heartbeat_deadline
    }

    fn reset_election_deadline(&mut self) {
        let now = self.clock.now();
        let timeout = self.clock.election_timeout(self.config.election_timeout);
        self.election_deadline = now + timeout;
    }

    fn reset_heartbeat_deadline(&mut self) {
        self.heartbeat_deadline = self.clock.now() + self.config.heartbeat_interval();
    }

    //
    // Election (§4.4)
    //

    /// Called by the election loop when `election_deadline` has passed. Starts a new election if
    /// Follower or Candidate; merely resets the deadline if Leader or Nascent (a leader paces its
    /// own heartbeats, and a not-yet-initialized node has no peers to elect among).
    pub fn on_election_timeout(&mut self) -> Option<VoteRequest> {
        match self.leadership {
            Follower(_) | Candidate(_) => {
                info!("{} election timeout at {}", self.node_id, self.current_term);
                Some(self.become_candidate())
            }
            Leader(_) | Nascent => {
                self.reset_election_deadline();
                None
            }
        }
    }

    fn become_candidate(&mut self) -> VoteRequest {
        self.current_term += 1;
        self.voted_for = Some(self.node_id.clone());
        self.reset_election_deadline();

        let mut votes_granted = BTreeSet::new();
        votes_granted.insert(self.node_id.clone());
        self.leadership = Candidate(CandidateState { votes_granted });
        info!("{} became candidate at {}", self.node_id, self.current_term);

        // A single-node cluster wins its own election immediately.
        self.try_become_leader();

        VoteRequest {
            candidate_id: self.node_id.clone(),
            last_log_index: LogIndex(self.log.size()),
            last_log_term: self.log.last_term(),
        }
    }

    fn try_become_leader(&mut self) {
        let won = match &self.leadership {
            Candidate(candidate) => candidate.votes_granted.len() >= majority(self.node_ids.len()),
            _ => false,
        };
        if !won {
            return;
        }
        let next_index = LogIndex(self.log.size()) + 1;
        let followers = self
            .peers()
            .cloned()
            .map(|peer| {
                (
                    peer,
                    ReplicationState {
                        next_index,
                        match_index: LogIndex::ZERO,
                    },
                )
            })
            .collect();
        self.leadership = Leader(LeaderState { followers });
        self.reset_heartbeat_deadline();
        info!("{} became leader at {}", self.node_id, self.current_term);
    }

    pub fn handle_vote_request(&mut self, term: Term, req: VoteRequest, from: PeerId) -> VoteResponse {
        self.maybe_step_down(term);

        let last_log_index = LogIndex(self.log.size());
        let last_log_term = self.log.last_term();
        let log_ok = req.last_log_term > last_log_term
            || (req.last_log_term == last_log_term && req.last_log_index >= last_log_index);
        let voted_ok = match &self.voted_for {
            None => true,
            Some(voted) => *voted == from,
        };
        let grant = term >= self.current_term && voted_ok && log_ok;

        if grant {
            self.voted_for = Some(from.clone());
            self.reset_election_deadline();
            info!("{} granted vote to {} at {}", self.node_id, from, self.current_term);
        } else {
            debug!(
                "{} rejected vote to {} at {} (log_ok={}, voted_for={:?})",
                self.node_id, from, self.current_term, log_ok, self.voted_for
            );
        }

        VoteResponse { vote_granted: grant }
    }

    pub fn handle_vote_response(&mut self, term: Term, res: VoteResponse, from: PeerId) {
        if term < self.current_term {
            debug!(
                "{} ignoring stale vote response from {} at {}",
                self.node_id, from, term
            );
            return;
        }
        self.maybe_step_down(term);
        if let Candidate(candidate) = &mut self.leadership {
            if res.vote_granted {
                candidate.votes_granted.insert(from.clone());
                info!("{} received vote from {} at {}", self.node_id, from, self.current_term);
            } else {
                debug!("{} vote rejected by {} at {}", self.node_id, from, self.current_term);
            }
        }
        self.try_become_leader();
    }

    //
    // Replication (§4.5)
    //

    /// Builds the `append_entries` requests a leader should send this round. Returns the empty
    /// vector if not leader. Each tuple is `(peer, next_index_at_send_time, request)` — the
    /// caller must thread `next_index_at_send_time` back through [`on_append_success`] /
    /// [`on_append_failure`] since `append_entries_res` itself carries only `{term, success}`.
    pub fn replicate_log(&mut self, force: bool) -> Vec<(PeerId, LogIndex, AppendRequest)> {
        let mut to_send = Vec::new();
        if let Leader(leader) = &self.leadership {
            for (peer, replication) in &leader.followers {
                let ni = replication.next_index;
                if !force && ni.0 > self.log.size() {
                    continue;
                }
                let prev_log_index = ni - 1;
                let prev_log_term = self
                    .log
                    .get(prev_log_index)
                    .map(|e| e.term)
                    .unwrap_or(Term::ZERO);
                let entries = self.log.from(ni);
                to_send.push((
                    peer.clone(),
                    ni,
                    AppendRequest {
                        leader_id: self.node_id.clone(),
                        prev_log_index,
                        prev_log_term,
                        entries,
                        leader_commit: self.commit_index,
                    },
                ));
            }
        }
        if !to_send.is_empty() {
            self.reset_heartbeat_deadline();
        }
        to_send
    }

    pub fn handle_append_request(
        &mut self,
        term: Term,
        req: AppendRequest,
        from: PeerId,
    ) -> AppendResponse {
        self.maybe_step_down(term);

        if term < self.current_term {
            warn!(
                "{} rejecting append from {}: stale term {} < {}",
                self.node_id, from, term, self.current_term
            );
            return AppendResponse { success: false };
        }

        // A current-or-newer-term leader is heard from: the election deadline resets only here,
        // never on the stale-term branch above, so a deposed leader's heartbeats cannot suppress
        // an election.
        self.reset_election_deadline();

        match &mut self.leadership {
            Leader(_) => {
                error!(
                    "{} received append_entries as leader at {} from {}",
                    self.node_id, self.current_term, from
                );
                self.leadership = Follower(FollowerState { leader: Some(from.clone()) });
            }
            Candidate(_) => {
                info!("{} became follower of {} at {}", self.node_id, from, self.current_term);
                self.leadership = Follower(FollowerState { leader: Some(from.clone()) });
            }
            Follower(follower) => follower.leader = Some(from.clone()),
            Nascent => {}
        }

        let prev_ok = req.prev_log_index == LogIndex::ZERO
            || self.log.get(req.prev_log_index).map(|e| e.term) == Some(req.prev_log_term);
        if !prev_ok {
            warn!(
                "{} rejecting append from {}: log mismatch at {}",
                self.node_id, from, req.prev_log_index
            );
            return AppendResponse { success: false };
        }

        self.log.truncate_to(req.prev_log_index.0);
        self.log.append_many(req.entries);

        if req.leader_commit > self.commit_index {
            let new_commit = req.leader_commit.0.min(self.log.size());
            self.commit_index = LogIndex(new_commit);
            debug!("{} commit index advanced to {}", self.node_id, self.commit_index);
        }

        AppendResponse { success: true }
    }

    pub fn on_append_success(&mut self, peer: &PeerId, ni: LogIndex, entries_sent: u64) {
        if let Leader(leader) = &mut self.leadership {
            if let Some(replication) = leader.followers.get_mut(peer) {
                replication.next_index = replication.next_index.max(ni + entries_sent);
                replication.match_index = replication.match_index.max((ni - 1) + entries_sent);
            }
        }
    }

    pub fn on_append_failure(&mut self, peer: &PeerId) {
        if let Leader(leader) = &mut self.leadership {
            if let Some(replication) = leader.followers.get_mut(peer) {
                replication.next_index = (replication.next_index - 1).max(LogIndex(1));
            }
        }
    }

    /// Any RPC carrying a term newer than ours demotes us to follower.
    pub fn maybe_step_down(&mut self, remote_term: Term) -> bool {
        if remote_term > self.current_term {
            info!(
                "{} stepping down: saw term {} > current {}",
                self.node_id, remote_term, self.current_term
            );
            self.current_term = remote_term;
            self.voted_for = None;
            self.leadership = Follower(FollowerState { leader: None });
            true
        } else {
            false
        }
    }

    //
    // Commit advancement and application (§4.6, §4.7)
    //

    pub fn leader_advance_commit_index(&mut self) {
        let (mut match_indices, current_term) = match &self.leadership {
            Leader(leader) => (
                leader
                    .followers
                    .values()
                    .map(|r| r.match_index)
                    .collect::<Vec<_>>(),
                self.current_term,
            ),
            _ => return,
        };
        match_indices.push(LogIndex(self.log.size()));
        match_indices.sort();
        let n = match_indices[match_indices.len() - majority(match_indices.len())];
        if n > self.commit_index && self.log.get(n).map(|e| e.term) == Some(current_term) {
            debug!("{} commit index advanced to {}", self.node_id, n);
            self.commit_index = n;
        }
    }

    /// Applies newly committed entries to `last_applied`, returning each `(index, entry)`
    /// advanced over so the caller can apply the op to the KV state machine and, if this node is
    /// leader, reply to the originating client.
    pub fn take_newly_committed(&mut self) -> Vec<(LogIndex, LogEntry)> {
        let mut applied = Vec::new();
        while self.last_applied < self.commit_index {
            self.last_applied = self.last_applied + 1;
            if let Some(entry) = self.log.get(self.last_applied) {
                applied.push((self.last_applied, entry));
            }
        }
        applied
    }

    //
    // Client requests (§4.8)
    //

    pub fn client_request(&mut self, op: ClientOp) -> Result<(), NotLeaderError> {
        if !self.is_leader() {
            return Err(NotLeaderError);
        }
        self.log.append_one(LogEntry {
            term: self.current_term,
            op: Some(op),
        });
        Ok(())
    }
}

/// `floor(n/2) + 1`: the minimum number of votes (or replicas) needed to act for a cluster of `n`.
pub fn majority(n: usize) -> usize {
    n / 2 + 1
}

#[cfg(test)]
mod test {
    use std::cell::Cell;
    use std::time::Duration;

    use super::*;
    use crate::log::memory::InMemoryLog;

    #[derive(Clone)]
    struct FakeClock {
        now: Cell<Instant>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self { now: Cell::new(Instant::now()) }
        }

        fn advance(&self, by: Duration) {
            self.now.set(self.now.get() + by);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.now.get()
        }

        fn jitter_ms(&mut self, _bound: u64) -> u64 {
            0
        }
    }

    fn node_ids(n: usize) -> BTreeSet<PeerId> {
        (0..n).map(|i| format!("n{}", i)).collect()
    }

    fn new_state(id: &str, n: usize) -> State<InMemoryLog, FakeClock> {
        let config = Config { election_timeout: Duration::from_millis(100) };
        let mut state = State::new(InMemoryLog::new(), FakeClock::new(), config);
        state.init(id.to_string(), node_ids(n)).unwrap();
        state
    }

    #[test]
    fn single_node_cluster_elects_itself_immediately() {
        let mut state = new_state("n0", 1);
        let _ = state.on_election_timeout();
        assert!(state.is_leader());
    }

    #[test]
    fn majority_of_three_is_two() {
        assert_eq!(majority(3), 2);
        assert_eq!(majority(1), 1);
        assert_eq!(majority(4), 3);
    }

    #[test]
    fn candidate_becomes_leader_on_quorum() {
        let mut state = new_state("n0", 3);
        let _req = state.on_election_timeout().expect("should start an election");
        assert_eq!(state.role(), Role::Candidate);
        state.handle_vote_response(state.current_term(), VoteResponse { vote_granted: true }, "n1".into());
        // one external vote plus the implicit self-vote makes a majority of 3
        assert!(state.is_leader());
    }

    #[test]
    fn higher_term_append_entries_demotes_candidate() {
        let mut state = new_state("n0", 3);
        let _ = state.on_election_timeout();
        assert_eq!(state.role(), Role::Candidate);
        let res = state.handle_append_request(
            Term(99),
            AppendRequest {
                leader_id: "n1".into(),
                prev_log_index: LogIndex::ZERO,
                prev_log_term: Term::ZERO,
                entries: vec![],
                leader_commit: LogIndex::ZERO,
            },
            "n1".into(),
        );
        assert!(res.success);
        assert_eq!(state.role(), Role::Follower);
        assert_eq!(state.current_term(), Term(99));
    }

    #[test]
    fn stale_term_append_entries_is_rejected_without_resetting_deadline() {
        let mut state = new_state("n0", 3);
        let before = state.election_deadline;
        state.current_term = Term(5);
        let res = state.handle_append_request(
            Term(1),
            AppendRequest {
                leader_id: "n1".into(),
                prev_log_index: LogIndex::ZERO,
                prev_log_term: Term::ZERO,
                entries: vec![],
                leader_commit: LogIndex::ZERO,
            },
            "n1".into(),
        );
        assert!(!res.success);
        assert_eq!(state.election_deadline, before);
    }

    #[test]
    fn commit_advances_on_majority_match() {
        let mut state = new_state("n0", 3);
        let _ = state.on_election_timeout();
        state.handle_vote_response(state.current_term(), VoteResponse { vote_granted: true }, "n1".into());
        assert!(state.is_leader());

        state
            .client_request(ClientOp {
                client: "c1".into(),
                msg_id: 1,
                kind: ClientOpKind::Write { key: "x".into(), value: "1".into() },
            })
            .unwrap();

        let sent = state.replicate_log(false);
        assert_eq!(sent.len(), 2);
        for (peer, ni, req) in &sent {
            state.on_append_success(peer, *ni, req.entries.len() as u64);
        }
        state.leader_advance_commit_index();
        assert_eq!(state.commit_index(), LogIndex(2));

        let applied = state.take_newly_committed();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].0, LogIndex(2));
    }

    #[test]
    fn next_index_floors_at_one_on_repeated_rejection() {
        let mut state = new_state("n0", 2);
        let _ = state.on_election_timeout();
        state.handle_vote_response(state.current_term(), VoteResponse { vote_granted: true }, "n1".into());
        assert!(state.is_leader());
        for _ in 0..5 {
            state.on_append_failure(&"n1".to_string());
        }
        let sent = state.replicate_log(true);
        let (_, ni, _) = sent.into_iter().find(|(p, _, _)| p == "n1").unwrap();
        assert_eq!(ni, LogIndex(1));
    }
}
