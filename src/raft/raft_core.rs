use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::AddLearnerRequest;
use super::AppendEntriesRequest;
use super::AppendEntriesResponse;
use super::ChangeMembershipRequest;
use super::ElectionHandler;
use super::Entry;
use super::EntryPayload;
use super::HardState;
use super::InstallSnapshotRequest;
use super::InstallSnapshotResponse;
use super::LogId;
use super::Membership;
use super::PeerEvent;
use super::PeerProgress;
use super::RaftEvent;
use super::RaftRequest;
use super::RaftResponse;
use super::RaftRole;
use super::RaftStatus;
use super::ReplicationHandler;
use super::SnapshotMeta;
use super::StateMachine;
use super::VoteRequest;
use super::VoteResponse;
use crate::ConsensusError;
use crate::Error;
use crate::MembershipError;
use crate::NetworkError;
use crate::RaftConfig;
use crate::RaftLog;
use crate::Result;
use crate::StateStorage;
use crate::Transport;
use crate::RAFT_COMMIT_INDEX;
use crate::RAFT_LEADER_CHANGES;

enum Responder {
    Write(oneshot::Sender<Result<Vec<u8>>>),
    Membership(oneshot::Sender<Result<()>>),
}

impl Responder {
    fn fail(
        self,
        e: Error,
    ) {
        match self {
            Responder::Write(tx) => {
                let _ = tx.send(Err(e));
            }
            Responder::Membership(tx) => {
                let _ = tx.send(Err(e));
            }
        }
    }
}

struct Pending {
    term: u64,
    responder: Responder,
}

#[derive(Default)]
struct LeaderState {
    progress: BTreeMap<u64, PeerProgress>,
    /// Index of the noop appended on election; reads wait for it to commit
    term_start_index: u64,
    pending_reads: Vec<(Vec<u8>, oneshot::Sender<Result<Vec<u8>>>)>,
}

enum RoleState {
    Follower,
    Learner,
    Candidate { votes: BTreeSet<u64> },
    Leader(LeaderState),
}

impl RoleState {
    fn role(&self) -> RaftRole {
        match self {
            RoleState::Follower => RaftRole::Follower,
            RoleState::Learner => RaftRole::Learner,
            RoleState::Candidate { .. } => RaftRole::Candidate,
            RoleState::Leader(_) => RaftRole::Leader,
        }
    }
}

/// Collaborators of the Raft core
pub struct RaftParts<SM: StateMachine> {
    pub raft_log: Arc<dyn RaftLog>,
    pub state_storage: Arc<dyn StateStorage>,
    pub transport: Arc<dyn Transport>,
    pub state_machine: SM,
    /// Used when nothing was persisted yet
    pub initial_membership: Membership,
}

/// Single-task Raft core: owns every piece of consensus state and applies
/// committed entries in log order.
pub struct Raft<SM: StateMachine> {
    node_id: u64,
    config: RaftConfig,
    rpc_timeout: Duration,

    raft_log: Arc<dyn RaftLog>,
    state_storage: Arc<dyn StateStorage>,
    transport: Arc<dyn Transport>,
    state_machine: SM,

    election_handler: ElectionHandler,
    replication_handler: ReplicationHandler,

    hard_state: HardState,
    role: RoleState,
    leader_id: Option<u64>,
    /// Effective configuration: the latest one in the log
    membership: Membership,
    /// Configuration as of `last_applied`
    committed_membership: Membership,
    snapshot_last_included: LogId,

    commit_index: u64,
    last_applied: u64,
    pending: BTreeMap<u64, Pending>,

    election_deadline: Instant,
    heartbeat_deadline: Instant,

    event_rx: mpsc::Receiver<RaftEvent>,
    peer_tx: mpsc::UnboundedSender<PeerEvent>,
    peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    status_tx: watch::Sender<RaftStatus>,
    shutdown_signal: watch::Receiver<()>,
}

impl<SM: StateMachine> Raft<SM> {
    pub(crate) fn new(
        node_id: u64,
        config: RaftConfig,
        rpc_timeout: Duration,
        parts: RaftParts<SM>,
        event_rx: mpsc::Receiver<RaftEvent>,
        status_tx: watch::Sender<RaftStatus>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        let RaftParts {
            raft_log,
            state_storage,
            transport,
            mut state_machine,
            initial_membership,
        } = parts;

        let hard_state = state_storage.load_hard_state()?.unwrap_or_default();

        let mut snapshot_last_included = LogId::default();
        let mut committed_membership = initial_membership.clone();
        if let Some((meta, data)) = state_storage.load_snapshot()? {
            info!("[Raft:{}] restore state machine from snapshot {}", node_id, meta.last_included);
            state_machine.restore(&data)?;
            snapshot_last_included = meta.last_included;
            committed_membership = meta.membership;
        }
        let membership = match state_storage.load_membership()? {
            Some(membership) => membership,
            None => {
                state_storage.save_membership(&committed_membership)?;
                committed_membership.clone()
            }
        };

        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let now = Instant::now();
        let max_entries = config.replication.append_entries_max_entries_per_replication as usize;
        let mut raft = Raft {
            node_id,
            config,
            rpc_timeout,
            raft_log,
            state_storage,
            transport,
            state_machine,
            election_handler: ElectionHandler::new(node_id),
            replication_handler: ReplicationHandler::new(node_id, max_entries),
            hard_state,
            role: RoleState::Follower,
            leader_id: None,
            membership,
            committed_membership,
            snapshot_last_included,
            commit_index: snapshot_last_included.index,
            last_applied: snapshot_last_included.index,
            pending: BTreeMap::new(),
            election_deadline: now,
            heartbeat_deadline: now,
            event_rx,
            peer_tx,
            peer_rx,
            status_tx,
            shutdown_signal,
        };
        raft.role = raft.passive_role();
        raft.reset_election_timer();
        raft.publish_status();
        Ok(raft)
    }

    pub async fn run(&mut self) -> Result<()> {
        info!(
            "[Raft:{}] started as {} at term {}",
            self.node_id,
            self.role.role(),
            self.hard_state.current_term
        );
        loop {
            let tick = sleep_until(self.next_deadline());
            tokio::select! {
                // Use biased to ensure branch order
                biased;
                // P0: shutdown received;
                _ = self.shutdown_signal.changed() => {
                    warn!("[Raft:{}] shutdown signal received.", self.node_id);
                    self.shutdown();
                    return Ok(());
                }
                // P1: answers of our own RPCs
                Some(event) = self.peer_rx.recv() => {
                    self.handle_peer_event(event)?;
                }
                // P2: requests from peers and clients
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_raft_event(event)?,
                        None => {
                            info!("[Raft:{}] every handle dropped, stopping", self.node_id);
                            self.shutdown();
                            return Ok(());
                        }
                    }
                }
                // P3: heartbeat or election timeout
                _ = tick => {
                    trace!("receive tick");
                    self.tick()?;
                }
            }

            self.apply_committed()?;
            self.maybe_snapshot()?;
            self.publish_status();
        }
    }

    // ---------------------------------------------------------------------
    // Timers

    fn next_deadline(&self) -> Instant {
        match self.role {
            RoleState::Leader(_) => self.heartbeat_deadline,
            // Learners never campaign; wake up only for events
            RoleState::Learner => Instant::now() + Duration::from_secs(3600),
            _ => self.election_deadline,
        }
    }

    fn reset_election_timer(&mut self) {
        let min = self.config.election.election_timeout_min;
        let max = self.config.election.election_timeout_max.max(min + 1);
        let timeout = rand::thread_rng().gen_range(min..max);
        self.election_deadline = Instant::now() + Duration::from_millis(timeout);
    }

    fn reset_heartbeat_timer(&mut self) {
        self.heartbeat_deadline =
            Instant::now() + Duration::from_millis(self.config.replication.rpc_append_entries_clock_in_ms);
    }

    fn tick(&mut self) -> Result<()> {
        let now = Instant::now();
        match self.role {
            RoleState::Leader(_) => {
                if now >= self.heartbeat_deadline {
                    self.broadcast_append_entries()?;
                    self.reset_heartbeat_timer();
                }
            }
            RoleState::Learner => {}
            _ => {
                if now >= self.election_deadline {
                    self.start_election()?;
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Role transitions

    /// Follower for voters, learner for everyone else
    fn passive_role(&self) -> RoleState {
        if self.membership.is_voter(self.node_id) {
            RoleState::Follower
        } else {
            RoleState::Learner
        }
    }

    fn persist_hard_state(
        &mut self,
        hard_state: HardState,
    ) -> Result<()> {
        self.state_storage.save_hard_state(&hard_state)?;
        self.hard_state = hard_state;
        Ok(())
    }

    /// Adopts `term` (when higher) and steps down to a passive role.
    fn step_down(
        &mut self,
        term: u64,
        leader_id: Option<u64>,
    ) -> Result<()> {
        if term > self.hard_state.current_term {
            self.persist_hard_state(HardState {
                current_term: term,
                voted_for: None,
            })?;
        }
        let was_leader = matches!(self.role, RoleState::Leader(_));
        let was_passive = matches!(self.role, RoleState::Follower | RoleState::Learner);
        let next_role = self.passive_role();
        if let RoleState::Leader(leader) = std::mem::replace(&mut self.role, next_role) {
            for (_, tx) in leader.pending_reads {
                let _ = tx.send(Err(self.not_leader_error(leader_id)));
            }
        }
        if was_leader {
            self.fail_pending(leader_id);
        }
        if !was_passive {
            info!(
                "[Raft:{}] become {} at term {} (leader: {:?})",
                self.node_id,
                self.role.role(),
                self.hard_state.current_term,
                leader_id
            );
        }
        self.leader_id = leader_id;
        self.reset_election_timer();
        Ok(())
    }

    fn start_election(&mut self) -> Result<()> {
        if !self.membership.is_voter(self.node_id) {
            self.role = RoleState::Learner;
            return Ok(());
        }
        let term = self.hard_state.current_term + 1;
        self.persist_hard_state(HardState {
            current_term: term,
            voted_for: Some(self.node_id),
        })?;
        self.leader_id = None;
        let mut votes = BTreeSet::new();
        votes.insert(self.node_id);
        let single_voter = ElectionHandler::has_quorum(&votes, &self.membership.voter_ids());
        self.role = RoleState::Candidate { votes };
        self.reset_election_timer();
        info!("[Raft:{}] start election for term {}", self.node_id, term);

        if single_voter {
            return self.become_leader();
        }

        let request = self
            .election_handler
            .build_vote_request(term, self.raft_log.last_log_id()?);
        for (peer_id, address) in self.membership.voting_peers(self.node_id) {
            let transport = self.transport.clone();
            let peer_tx = self.peer_tx.clone();
            let request = RaftRequest::Vote(request.clone());
            let rpc_timeout = self.rpc_timeout;
            tokio::spawn(async move {
                let result = match transport.send(peer_id, address, request, rpc_timeout).await {
                    Ok(RaftResponse::Vote(response)) => Ok(response),
                    Ok(_) => Err(NetworkError::UnexpectedResponse { request_type: "Vote" }.into()),
                    Err(e) => Err(e),
                };
                let _ = peer_tx.send(PeerEvent::VoteResult { term, peer_id, result });
            });
        }
        Ok(())
    }

    fn become_leader(&mut self) -> Result<()> {
        let term = self.hard_state.current_term;
        let last_index = self.raft_log.last_log_id()?.index;
        let progress = self
            .membership
            .replication_targets(self.node_id)
            .into_iter()
            .map(|(id, _)| (id, PeerProgress::new(last_index)))
            .collect();

        let noop_index = last_index + 1;
        self.raft_log.append(&[Entry {
            index: noop_index,
            term,
            payload: EntryPayload::Noop,
        }])?;

        self.role = RoleState::Leader(LeaderState {
            progress,
            term_start_index: noop_index,
            pending_reads: Vec::new(),
        });
        self.leader_id = Some(self.node_id);
        RAFT_LEADER_CHANGES.inc();
        info!("[Raft:{}] become leader at term {}", self.node_id, term);

        self.advance_commit_index()?;
        self.broadcast_append_entries()?;
        self.reset_heartbeat_timer();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Event handling

    fn handle_raft_event(
        &mut self,
        event: RaftEvent,
    ) -> Result<()> {
        match event {
            RaftEvent::ReceiveVoteRequest(request, tx) => {
                let response = self.handle_vote_request(request)?;
                let _ = tx.send(response);
            }
            RaftEvent::AppendEntries(request, tx) => {
                let response = self.handle_append_entries(request)?;
                let _ = tx.send(response);
            }
            RaftEvent::InstallSnapshot(request, tx) => {
                let response = self.handle_install_snapshot(request)?;
                let _ = tx.send(response);
            }
            RaftEvent::ClientWrite(command, tx) => {
                if !self.is_leader() {
                    let _ = tx.send(Err(self.not_leader_error(self.leader_id)));
                    return Ok(());
                }
                self.propose(EntryPayload::Command(command), Responder::Write(tx))?;
            }
            RaftEvent::ClientRead(query, tx) => self.handle_client_read(query, tx),
            RaftEvent::AddLearner(request, tx) => self.handle_add_learner(request, tx)?,
            RaftEvent::ChangeMembership(request, tx) => self.handle_change_membership(request, tx)?,
        }
        Ok(())
    }

    fn handle_vote_request(
        &mut self,
        request: VoteRequest,
    ) -> Result<VoteResponse> {
        if request.term > self.hard_state.current_term {
            self.step_down(request.term, None)?;
        }
        let (response, persist) =
            self.election_handler
                .handle_vote_request(&request, self.hard_state, self.raft_log.last_log_id()?);
        if let Some(hard_state) = persist {
            self.persist_hard_state(hard_state)?;
        }
        if response.vote_granted {
            self.reset_election_timer();
        }
        Ok(response)
    }

    fn handle_append_entries(
        &mut self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let current_term = self.hard_state.current_term;
        if request.term < current_term {
            debug!(
                "[Raft:{}] reject append from stale leader {} (term {} < {})",
                self.node_id, request.leader_id, request.term, current_term
            );
            return Ok(AppendEntriesResponse {
                term: current_term,
                success: false,
                match_index: 0,
                conflict_index: 0,
            });
        }

        if request.term > current_term
            || !matches!(self.role, RoleState::Follower | RoleState::Learner)
            || self.leader_id != Some(request.leader_id)
        {
            self.step_down(request.term, Some(request.leader_id))?;
        }
        self.reset_election_timer();

        let outcome = self.replication_handler.handle_append_entries(
            self.raft_log.as_ref(),
            request,
            self.hard_state.current_term,
            self.commit_index,
        )?;
        if outcome.membership_changed {
            self.reload_membership()?;
        }
        if let Some(commit_index) = outcome.commit_index {
            self.set_commit_index(commit_index);
        }
        Ok(outcome.response)
    }

    fn handle_install_snapshot(
        &mut self,
        request: InstallSnapshotRequest,
    ) -> Result<InstallSnapshotResponse> {
        let current_term = self.hard_state.current_term;
        if request.term < current_term {
            return Ok(InstallSnapshotResponse { term: current_term });
        }
        if request.term > current_term || !matches!(self.role, RoleState::Follower | RoleState::Learner) {
            self.step_down(request.term, Some(request.leader_id))?;
        }
        self.leader_id = Some(request.leader_id);
        self.reset_election_timer();

        let last_included = request.meta.last_included;
        if last_included.index <= self.commit_index {
            debug!(
                "[Raft:{}] ignore snapshot {} at or below commit index {}",
                self.node_id, last_included, self.commit_index
            );
            return Ok(InstallSnapshotResponse {
                term: self.hard_state.current_term,
            });
        }

        info!("[Raft:{}] install snapshot {}", self.node_id, last_included);
        self.state_machine.restore(&request.data)?;
        self.state_storage.save_snapshot(&request.meta, &request.data)?;

        if self.raft_log.entry_term(last_included.index)? != Some(last_included.term) {
            self.raft_log.truncate_from(0)?;
        }
        self.raft_log.purge_up_to(last_included)?;

        self.snapshot_last_included = last_included;
        self.committed_membership = request.meta.membership;
        self.last_applied = last_included.index;
        self.set_commit_index(last_included.index);
        self.reload_membership()?;

        Ok(InstallSnapshotResponse {
            term: self.hard_state.current_term,
        })
    }

    fn handle_client_read(
        &mut self,
        query: Vec<u8>,
        tx: oneshot::Sender<Result<Vec<u8>>>,
    ) {
        if !self.is_leader() {
            let _ = tx.send(Err(self.not_leader_error(self.leader_id)));
            return;
        }
        if self.leader_can_serve_reads() {
            let _ = tx.send(self.state_machine.query(&query));
        } else if let RoleState::Leader(leader) = &mut self.role {
            leader.pending_reads.push((query, tx));
        }
    }

    fn handle_add_learner(
        &mut self,
        request: AddLearnerRequest,
        tx: oneshot::Sender<Result<()>>,
    ) -> Result<()> {
        if !self.is_leader() {
            let _ = tx.send(Err(self.not_leader_error(self.leader_id)));
            return Ok(());
        }
        if self.membership.contains(request.node_id) {
            debug!("[Raft:{}] node {} already a member", self.node_id, request.node_id);
            let _ = tx.send(Ok(()));
            return Ok(());
        }
        if let Some(e) = self.config_change_in_progress() {
            let _ = tx.send(Err(e));
            return Ok(());
        }
        let next = self.membership.with_learner(request.node_id, request.address);
        self.propose(EntryPayload::Config(next), Responder::Membership(tx))
    }

    fn handle_change_membership(
        &mut self,
        request: ChangeMembershipRequest,
        tx: oneshot::Sender<Result<()>>,
    ) -> Result<()> {
        if !self.is_leader() {
            let _ = tx.send(Err(self.not_leader_error(self.leader_id)));
            return Ok(());
        }
        if let Some(e) = self.config_change_in_progress() {
            let _ = tx.send(Err(e));
            return Ok(());
        }
        match self.membership.with_voters(&request.voters) {
            Ok(next) => self.propose(EntryPayload::Config(next), Responder::Membership(tx)),
            Err(e) => {
                let _ = tx.send(Err(e));
                Ok(())
            }
        }
    }

    fn handle_peer_event(
        &mut self,
        event: PeerEvent,
    ) -> Result<()> {
        match event {
            PeerEvent::VoteResult { term, peer_id, result } => {
                let response = match result {
                    Ok(response) => response,
                    Err(e) => {
                        debug!("[Raft:{}] vote request to {} failed: {}", self.node_id, peer_id, e);
                        return Ok(());
                    }
                };
                if response.term > self.hard_state.current_term {
                    return self.step_down(response.term, None);
                }
                if term != self.hard_state.current_term || !response.vote_granted {
                    return Ok(());
                }
                let voters = self.membership.voter_ids();
                let won = match &mut self.role {
                    RoleState::Candidate { votes } => {
                        votes.insert(peer_id);
                        ElectionHandler::has_quorum(votes, &voters)
                    }
                    _ => false,
                };
                if won {
                    self.become_leader()?;
                }
            }
            PeerEvent::AppendResult { term, peer_id, result } => {
                if term != self.hard_state.current_term {
                    return Ok(());
                }
                let response = match result {
                    Ok(response) => response,
                    Err(e) => {
                        trace!("[Raft:{}] append to {} failed: {}", self.node_id, peer_id, e);
                        if let Some(progress) = self.progress_mut(peer_id) {
                            progress.inflight = false;
                        }
                        return Ok(());
                    }
                };
                if response.term > self.hard_state.current_term {
                    return self.step_down(response.term, None);
                }
                let handler = self.replication_handler.clone();
                let mut more = false;
                if let Some(progress) = self.progress_mut(peer_id) {
                    handler.handle_append_response(progress, &response);
                    more = true;
                }
                if more {
                    self.advance_commit_index()?;
                    // Keep a lagging peer busy until it catches up
                    let last_index = self.raft_log.last_log_id()?.index;
                    let needs_more = self
                        .progress_mut(peer_id)
                        .map(|p| !response.success || p.match_index < last_index)
                        .unwrap_or(false);
                    if needs_more {
                        self.replicate_to(peer_id)?;
                    }
                }
            }
            PeerEvent::SnapshotResult {
                term,
                peer_id,
                last_included_index,
                result,
            } => {
                if term != self.hard_state.current_term {
                    return Ok(());
                }
                match result {
                    Ok(response) if response.term > self.hard_state.current_term => {
                        return self.step_down(response.term, None);
                    }
                    Ok(_) => {
                        if let Some(progress) = self.progress_mut(peer_id) {
                            progress.inflight = false;
                            progress.match_index = progress.match_index.max(last_included_index);
                            progress.next_index = progress.match_index + 1;
                        }
                        self.advance_commit_index()?;
                        self.replicate_to(peer_id)?;
                    }
                    Err(e) => {
                        warn!("[Raft:{}] snapshot to {} failed: {}", self.node_id, peer_id, e);
                        if let Some(progress) = self.progress_mut(peer_id) {
                            progress.inflight = false;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Leader replication

    fn is_leader(&self) -> bool {
        matches!(self.role, RoleState::Leader(_))
    }

    fn progress_mut(
        &mut self,
        peer_id: u64,
    ) -> Option<&mut PeerProgress> {
        match &mut self.role {
            RoleState::Leader(leader) => leader.progress.get_mut(&peer_id),
            _ => None,
        }
    }

    fn propose(
        &mut self,
        payload: EntryPayload,
        responder: Responder,
    ) -> Result<()> {
        let term = self.hard_state.current_term;
        let index = self.raft_log.last_log_id()?.index + 1;
        let is_config = matches!(payload, EntryPayload::Config(_));
        let entry = Entry { index, term, payload };

        if let Err(e) = self.raft_log.append(std::slice::from_ref(&entry)) {
            error!("[Raft:{}] append proposal failed: {:?}", self.node_id, e);
            responder.fail(e);
            return Ok(());
        }
        self.pending.insert(index, Pending { term, responder });

        if is_config {
            if let EntryPayload::Config(membership) = entry.payload {
                self.apply_membership(membership)?;
            }
        }
        trace!("[Raft:{}] proposed entry {}", self.node_id, index);

        self.advance_commit_index()?;
        self.broadcast_append_entries()
    }

    fn broadcast_append_entries(&mut self) -> Result<()> {
        let peers: Vec<u64> = match &self.role {
            RoleState::Leader(leader) => leader.progress.keys().copied().collect(),
            _ => return Ok(()),
        };
        for peer_id in peers {
            self.replicate_to(peer_id)?;
        }
        Ok(())
    }

    fn replicate_to(
        &mut self,
        peer_id: u64,
    ) -> Result<()> {
        let term = self.hard_state.current_term;
        let commit_index = self.commit_index;
        let Some(address) = self.membership.address(peer_id).map(str::to_string) else {
            return Ok(());
        };
        let next_index = match self.progress_mut(peer_id) {
            Some(progress) if !progress.inflight => progress.next_index,
            _ => return Ok(()),
        };

        let request = match self.replication_handler.build_append_request(
            self.raft_log.as_ref(),
            term,
            next_index,
            commit_index,
        )? {
            Some(request) => request,
            None => return self.send_snapshot(peer_id, address),
        };

        if let Some(progress) = self.progress_mut(peer_id) {
            progress.inflight = true;
        }
        let transport = self.transport.clone();
        let peer_tx = self.peer_tx.clone();
        let rpc_timeout = self.rpc_timeout;
        tokio::spawn(async move {
            let result = match transport
                .send(peer_id, address, RaftRequest::AppendEntries(request), rpc_timeout)
                .await
            {
                Ok(RaftResponse::AppendEntries(response)) => Ok(response),
                Ok(_) => Err(NetworkError::UnexpectedResponse {
                    request_type: "AppendEntries",
                }
                .into()),
                Err(e) => Err(e),
            };
            let _ = peer_tx.send(PeerEvent::AppendResult { term, peer_id, result });
        });
        Ok(())
    }

    fn send_snapshot(
        &mut self,
        peer_id: u64,
        address: String,
    ) -> Result<()> {
        let Some((meta, data)) = self.state_storage.load_snapshot()? else {
            warn!("[Raft:{}] peer {} needs compacted entries but no snapshot exists", self.node_id, peer_id);
            return Ok(());
        };
        if let Some(progress) = self.progress_mut(peer_id) {
            progress.inflight = true;
        }
        info!("[Raft:{}] send snapshot {} to {}", self.node_id, meta.last_included, peer_id);

        let term = self.hard_state.current_term;
        let last_included_index = meta.last_included.index;
        let request = RaftRequest::InstallSnapshot(InstallSnapshotRequest {
            term,
            leader_id: self.node_id,
            meta,
            data,
        });
        let transport = self.transport.clone();
        let peer_tx = self.peer_tx.clone();
        // Snapshots may be large; allow a longer exchange than a heartbeat
        let rpc_timeout = self.rpc_timeout * 10;
        tokio::spawn(async move {
            let result = match transport.send(peer_id, address, request, rpc_timeout).await {
                Ok(RaftResponse::InstallSnapshot(response)) => Ok(response),
                Ok(_) => Err(NetworkError::UnexpectedResponse {
                    request_type: "InstallSnapshot",
                }
                .into()),
                Err(e) => Err(e),
            };
            let _ = peer_tx.send(PeerEvent::SnapshotResult {
                term,
                peer_id,
                last_included_index,
                result,
            });
        });
        Ok(())
    }

    fn advance_commit_index(&mut self) -> Result<()> {
        let voters = self.membership.voter_ids();
        let new_commit = match &self.role {
            RoleState::Leader(leader) => self.replication_handler.calculate_commit_index(
                self.raft_log.as_ref(),
                self.hard_state.current_term,
                self.commit_index,
                &voters,
                &leader.progress,
            )?,
            _ => None,
        };
        if let Some(commit_index) = new_commit {
            self.set_commit_index(commit_index);
        }
        Ok(())
    }

    fn set_commit_index(
        &mut self,
        commit_index: u64,
    ) {
        if commit_index > self.commit_index {
            trace!("[Raft:{}] commit index {} -> {}", self.node_id, self.commit_index, commit_index);
            self.commit_index = commit_index;
            RAFT_COMMIT_INDEX.set(commit_index as i64);
        }
    }

    // ---------------------------------------------------------------------
    // Apply, membership and snapshots

    fn apply_committed(&mut self) -> Result<()> {
        while self.last_applied < self.commit_index {
            let index = self.last_applied + 1;
            let entry = self.raft_log.entry(index)?.ok_or_else(|| {
                Error::Fatal(format!("committed entry {} missing from raft log", index))
            })?;

            let result = match &entry.payload {
                EntryPayload::Noop => Ok(Vec::new()),
                EntryPayload::Command(command) => self.state_machine.apply(index, command),
                EntryPayload::Config(membership) => {
                    self.committed_membership = membership.clone();
                    Ok(Vec::new())
                }
            };
            self.last_applied = index;

            if let Some(pending) = self.pending.remove(&index) {
                if pending.term == entry.term {
                    match pending.responder {
                        Responder::Write(tx) => {
                            let _ = tx.send(result);
                        }
                        Responder::Membership(tx) => {
                            let _ = tx.send(result.map(|_| ()));
                        }
                    }
                } else {
                    pending.responder.fail(self.not_leader_error(self.leader_id));
                }
            }

            if entry.is_config() && self.is_leader() && !self.membership.is_voter(self.node_id) {
                info!("[Raft:{}] removed from voters, stepping down", self.node_id);
                self.step_down(self.hard_state.current_term, None)?;
            }
        }

        if self.leader_can_serve_reads() {
            if let RoleState::Leader(leader) = &mut self.role {
                let reads = std::mem::take(&mut leader.pending_reads);
                for (query, tx) in reads {
                    let _ = tx.send(self.state_machine.query(&query));
                }
            }
        }
        Ok(())
    }

    fn leader_can_serve_reads(&self) -> bool {
        match &self.role {
            RoleState::Leader(leader) => self.last_applied >= leader.term_start_index,
            _ => false,
        }
    }

    fn maybe_snapshot(&mut self) -> Result<()> {
        if self.last_applied < self.snapshot_last_included.index + self.config.snapshot_threshold {
            return Ok(());
        }
        let term = self.raft_log.entry_term(self.last_applied)?.ok_or_else(|| {
            Error::Fatal(format!("applied entry {} missing from raft log", self.last_applied))
        })?;
        let meta = SnapshotMeta {
            last_included: LogId::new(term, self.last_applied),
            membership: self.committed_membership.clone(),
        };
        let data = self.state_machine.snapshot()?;
        self.state_storage.save_snapshot(&meta, &data)?;
        self.raft_log.purge_up_to(meta.last_included)?;
        self.snapshot_last_included = meta.last_included;
        info!(
            "[Raft:{}] snapshot at {} ({} bytes), log compacted",
            self.node_id,
            meta.last_included,
            data.len()
        );
        Ok(())
    }

    fn apply_membership(
        &mut self,
        membership: Membership,
    ) -> Result<()> {
        if membership == self.membership {
            return Ok(());
        }
        info!("[Raft:{}] membership changed to {:?}", self.node_id, membership);
        self.state_storage.save_membership(&membership)?;
        self.membership = membership;

        let last_index = self.raft_log.last_log_id()?.index;
        let targets = self.membership.replication_targets(self.node_id);
        if let RoleState::Leader(leader) = &mut self.role {
            leader.progress.retain(|id, _| targets.iter().any(|(t, _)| t == id));
            for (id, _) in targets {
                leader.progress.entry(id).or_insert_with(|| PeerProgress::new(last_index));
            }
        } else if matches!(self.role, RoleState::Follower | RoleState::Learner) {
            let next_role = self.passive_role();
            if next_role.role() != self.role.role() {
                self.reset_election_timer();
            }
            self.role = next_role;
        }
        Ok(())
    }

    /// Recomputes the effective configuration from the log after entries were
    /// appended or truncated by a leader.
    fn reload_membership(&mut self) -> Result<()> {
        let purged = self.raft_log.purged_log_id()?;
        let last = self.raft_log.last_log_id()?;
        let mut latest = None;
        let mut index = last.index;
        while index > purged.index {
            if let Some(Entry {
                payload: EntryPayload::Config(membership),
                ..
            }) = self.raft_log.entry(index)?
            {
                latest = Some(membership);
                break;
            }
            index -= 1;
        }
        let membership = latest.unwrap_or_else(|| self.committed_membership.clone());
        self.apply_membership(membership)
    }

    fn config_change_in_progress(&self) -> Option<Error> {
        let uncommitted_config = self
            .pending
            .values()
            .any(|p| matches!(p.responder, Responder::Membership(_)));
        if uncommitted_config || self.membership != self.committed_membership {
            return Some(MembershipError::ChangeInProgress.into());
        }
        None
    }

    // ---------------------------------------------------------------------
    // Helpers

    fn not_leader_error(
        &self,
        leader_id: Option<u64>,
    ) -> Error {
        ConsensusError::NotLeader {
            leader_id,
            leader_addr: leader_id
                .and_then(|id| self.membership.address(id))
                .map(str::to_string),
        }
        .into()
    }

    fn fail_pending(
        &mut self,
        leader_id: Option<u64>,
    ) {
        let pending = std::mem::take(&mut self.pending);
        for (_, p) in pending {
            p.responder.fail(self.not_leader_error(leader_id));
        }
    }

    fn shutdown(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for (_, p) in pending {
            p.responder.fail(ConsensusError::Shutdown.into());
        }
        if let Err(e) = self.raft_log.flush() {
            error!("[Raft:{}] flush raft log on shutdown failed: {:?}", self.node_id, e);
        }
    }

    fn publish_status(&self) {
        let status = RaftStatus {
            node_id: self.node_id,
            role: self.role.role(),
            current_term: self.hard_state.current_term,
            leader_id: self.leader_id,
            commit_index: self.commit_index,
            last_applied: self.last_applied,
            membership: self.membership.clone(),
        };
        self.status_tx.send_if_modified(|current| {
            if *current != status {
                *current = status;
                true
            } else {
                false
            }
        });
    }
}
