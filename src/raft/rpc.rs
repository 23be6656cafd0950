//! Raft plane RPC messages. They travel as bincode payloads inside the
//! length-delimited frames of the placement transport.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::Entry;
use super::SnapshotMeta;
use crate::ConsensusError;
use crate::Error;
use crate::JournalError;
use crate::MembershipError;
use crate::NetworkError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub term: u64,
    pub candidate_id: u64,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub leader_id: u64,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<Entry>,
    pub leader_commit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub success: bool,
    /// Last index known to match the leader when `success`
    pub match_index: u64,
    /// Where the leader should retry from when `!success`
    pub conflict_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallSnapshotRequest {
    pub term: u64,
    pub leader_id: u64,
    pub meta: SnapshotMeta,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallSnapshotResponse {
    pub term: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLearnerRequest {
    pub node_id: u64,
    pub address: String,
}

/// Target voter set; differs from the current one by exactly one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMembershipRequest {
    pub voters: BTreeSet<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaftRequest {
    Vote(VoteRequest),
    AppendEntries(AppendEntriesRequest),
    InstallSnapshot(InstallSnapshotRequest),
    /// State machine command forwarded by a non-leader
    ClientWrite(Vec<u8>),
    /// State machine query forwarded by a non-leader
    ClientRead(Vec<u8>),
    AddLearner(AddLearnerRequest),
    ChangeMembership(ChangeMembershipRequest),
}

impl RaftRequest {
    pub fn name(&self) -> &'static str {
        match self {
            RaftRequest::Vote(_) => "Vote",
            RaftRequest::AppendEntries(_) => "AppendEntries",
            RaftRequest::InstallSnapshot(_) => "InstallSnapshot",
            RaftRequest::ClientWrite(_) => "ClientWrite",
            RaftRequest::ClientRead(_) => "ClientRead",
            RaftRequest::AddLearner(_) => "AddLearner",
            RaftRequest::ChangeMembership(_) => "ChangeMembership",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaftResponse {
    Vote(VoteResponse),
    AppendEntries(AppendEntriesResponse),
    InstallSnapshot(InstallSnapshotResponse),
    /// Answer to ClientWrite, ClientRead, AddLearner and ChangeMembership
    Client(std::result::Result<Vec<u8>, RemoteError>),
}

/// Errors that cross the Raft RPC boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteError {
    NotLeader {
        leader_id: Option<u64>,
        leader_addr: Option<String>,
    },
    Timeout(u64),
    Journal(JournalError),
    Membership(String),
    Internal(String),
}

impl From<Error> for RemoteError {
    fn from(e: Error) -> Self {
        match e {
            Error::Consensus(ConsensusError::NotLeader { leader_id, leader_addr }) => {
                RemoteError::NotLeader { leader_id, leader_addr }
            }
            Error::Consensus(ConsensusError::Timeout(d)) => RemoteError::Timeout(d.as_millis() as u64),
            Error::Consensus(ConsensusError::Membership(m)) => RemoteError::Membership(m.to_string()),
            Error::Journal(j) => RemoteError::Journal(j),
            other => RemoteError::Internal(other.to_string()),
        }
    }
}

impl From<RemoteError> for Error {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::NotLeader { leader_id, leader_addr } => {
                ConsensusError::NotLeader { leader_id, leader_addr }.into()
            }
            RemoteError::Timeout(ms) => ConsensusError::Timeout(Duration::from_millis(ms)).into(),
            RemoteError::Journal(j) => j.into(),
            RemoteError::Membership(m) => MembershipError::UnsafeChange(m).into(),
            RemoteError::Internal(m) => NetworkError::Remote(m).into(),
        }
    }
}
