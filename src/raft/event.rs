use tokio::sync::oneshot;

use super::AddLearnerRequest;
use super::AppendEntriesRequest;
use super::AppendEntriesResponse;
use super::ChangeMembershipRequest;
use super::InstallSnapshotRequest;
use super::InstallSnapshotResponse;
use super::VoteRequest;
use super::VoteResponse;
use crate::Result;

/// Requests delivered to the Raft core by peers and local clients
#[derive(Debug)]
pub(crate) enum RaftEvent {
    ReceiveVoteRequest(VoteRequest, oneshot::Sender<VoteResponse>),

    AppendEntries(AppendEntriesRequest, oneshot::Sender<AppendEntriesResponse>),

    InstallSnapshot(InstallSnapshotRequest, oneshot::Sender<InstallSnapshotResponse>),

    ClientWrite(Vec<u8>, oneshot::Sender<Result<Vec<u8>>>),

    ClientRead(Vec<u8>, oneshot::Sender<Result<Vec<u8>>>),

    AddLearner(AddLearnerRequest, oneshot::Sender<Result<()>>),

    ChangeMembership(ChangeMembershipRequest, oneshot::Sender<Result<()>>),
}

/// Outcomes of RPCs the core sent out, fed back into its loop
#[derive(Debug)]
pub(crate) enum PeerEvent {
    VoteResult {
        term: u64,
        peer_id: u64,
        result: Result<VoteResponse>,
    },

    AppendResult {
        term: u64,
        peer_id: u64,
        result: Result<AppendEntriesResponse>,
    },

    SnapshotResult {
        term: u64,
        peer_id: u64,
        last_included_index: u64,
        result: Result<InstallSnapshotResponse>,
    },
}
