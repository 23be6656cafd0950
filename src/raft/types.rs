use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::MembershipError;
use crate::NodeMeta;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LogId {
    pub term: u64,
    pub index: u64,
}

impl LogId {
    pub fn new(
        term: u64,
        index: u64,
    ) -> Self {
        Self { term, index }
    }
}

impl fmt::Display for LogId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}-{}", self.term, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPayload {
    /// Appended by a new leader to commit entries of earlier terms
    Noop,
    /// Opaque state machine command
    Command(Vec<u8>),
    /// Membership configuration, effective as soon as it is appended
    Config(Membership),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub index: u64,
    pub term: u64,
    pub payload: EntryPayload,
}

impl Entry {
    pub fn log_id(&self) -> LogId {
        LogId::new(self.term, self.index)
    }

    #[inline]
    pub fn is_config(&self) -> bool {
        matches!(self.payload, EntryPayload::Config(_))
    }
}

/// Persistent election state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HardState {
    pub current_term: u64,
    pub voted_for: Option<u64>,
}

/// Voters and learners of the placement cluster with their Raft RPC
/// addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Membership {
    pub voters: BTreeMap<u64, String>,
    pub learners: BTreeMap<u64, String>,
}

impl Membership {
    pub fn from_initial_cluster(nodes: &[NodeMeta]) -> Self {
        Self {
            voters: nodes.iter().map(|n| (n.id, n.address.clone())).collect(),
            learners: BTreeMap::new(),
        }
    }

    pub fn is_voter(
        &self,
        node_id: u64,
    ) -> bool {
        self.voters.contains_key(&node_id)
    }

    pub fn is_learner(
        &self,
        node_id: u64,
    ) -> bool {
        self.learners.contains_key(&node_id)
    }

    pub fn contains(
        &self,
        node_id: u64,
    ) -> bool {
        self.is_voter(node_id) || self.is_learner(node_id)
    }

    pub fn address(
        &self,
        node_id: u64,
    ) -> Option<&str> {
        self.voters
            .get(&node_id)
            .or_else(|| self.learners.get(&node_id))
            .map(String::as_str)
    }

    pub fn voter_ids(&self) -> BTreeSet<u64> {
        self.voters.keys().copied().collect()
    }

    /// Every member except `self_id`, voters and learners alike
    pub fn replication_targets(
        &self,
        self_id: u64,
    ) -> Vec<(u64, String)> {
        self.voters
            .iter()
            .chain(self.learners.iter())
            .filter(|(id, _)| **id != self_id)
            .map(|(id, addr)| (*id, addr.clone()))
            .collect()
    }

    pub fn voting_peers(
        &self,
        self_id: u64,
    ) -> Vec<(u64, String)> {
        self.voters
            .iter()
            .filter(|(id, _)| **id != self_id)
            .map(|(id, addr)| (*id, addr.clone()))
            .collect()
    }

    pub fn with_learner(
        &self,
        node_id: u64,
        address: String,
    ) -> Self {
        let mut next = self.clone();
        if !next.voters.contains_key(&node_id) {
            next.learners.insert(node_id, address);
        }
        next
    }

    /// New configuration with voter set `voters`.
    ///
    /// Only one voter may be added or removed at a time; an added voter must
    /// already be a learner (so its address is known and its log caught up).
    pub fn with_voters(
        &self,
        voters: &BTreeSet<u64>,
    ) -> Result<Self> {
        let current = self.voter_ids();
        let added: Vec<u64> = voters.difference(&current).copied().collect();
        let removed: Vec<u64> = current.difference(voters).copied().collect();

        if added.len() + removed.len() != 1 {
            return Err(MembershipError::UnsafeChange(format!(
                "from {:?} to {:?} adds {:?} and removes {:?}",
                current, voters, added, removed
            ))
            .into());
        }
        if voters.is_empty() {
            return Err(MembershipError::UnsafeChange("voter set would be empty".to_string()).into());
        }

        let mut next = self.clone();
        for id in added {
            let address = next
                .learners
                .remove(&id)
                .ok_or(MembershipError::NoMetadataFoundForNode { node_id: id })?;
            next.voters.insert(id, address);
        }
        for id in removed {
            next.voters.remove(&id);
        }
        Ok(next)
    }
}

/// Describes the state captured by a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub last_included: LogId,
    pub membership: Membership,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
    Learner,
}

impl fmt::Display for RaftRole {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            RaftRole::Follower => "follower",
            RaftRole::Candidate => "candidate",
            RaftRole::Leader => "leader",
            RaftRole::Learner => "learner",
        };
        f.write_str(s)
    }
}

/// Observable state of a Raft node, published on every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftStatus {
    pub node_id: u64,
    pub role: RaftRole,
    pub current_term: u64,
    pub leader_id: Option<u64>,
    pub commit_index: u64,
    pub last_applied: u64,
    pub membership: Membership,
}

impl RaftStatus {
    pub fn initial(node_id: u64) -> Self {
        Self {
            node_id,
            role: RaftRole::Follower,
            current_term: 0,
            leader_id: None,
            commit_index: 0,
            last_applied: 0,
            membership: Membership::default(),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role == RaftRole::Leader
    }

    pub fn leader_address(&self) -> Option<String> {
        self.leader_id
            .and_then(|id| self.membership.address(id))
            .map(str::to_string)
    }
}
