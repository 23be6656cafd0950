use std::collections::BTreeMap;
use std::collections::BTreeSet;

use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::AppendEntriesRequest;
use super::AppendEntriesResponse;
use crate::cluster::majority_count;
use crate::RaftLog;
use crate::ReplicationError;
use crate::Result;

/// Leader's view of one follower or learner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerProgress {
    pub next_index: u64,
    pub match_index: u64,
    /// One AppendEntries or InstallSnapshot in flight at a time
    pub inflight: bool,
}

impl PeerProgress {
    pub fn new(leader_last_index: u64) -> Self {
        Self {
            next_index: leader_last_index + 1,
            match_index: 0,
            inflight: false,
        }
    }
}

/// Result of applying an AppendEntries request on a follower
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerAppendOutcome {
    pub response: AppendEntriesResponse,
    /// A config entry was appended or truncated away
    pub membership_changed: bool,
    /// New commit index to adopt, if it advanced
    pub commit_index: Option<u64>,
}

/// Log replication rules of §5.3 of the Raft paper.
#[derive(Debug, Clone)]
pub struct ReplicationHandler {
    pub(crate) my_id: u64,
    max_entries: usize,
}

impl ReplicationHandler {
    pub fn new(
        my_id: u64,
        max_entries: usize,
    ) -> Self {
        Self {
            my_id,
            max_entries: max_entries.max(1),
        }
    }

    /// Builds the next AppendEntries for a peer whose next index is
    /// `next_index`. Returns `None` when the entries it needs were compacted
    /// away and a snapshot must be sent instead.
    pub fn build_append_request(
        &self,
        log: &dyn RaftLog,
        term: u64,
        next_index: u64,
        commit_index: u64,
    ) -> Result<Option<AppendEntriesRequest>> {
        let next_index = next_index.max(1);
        let prev_log_index = next_index - 1;
        let prev_log_term = match log.entry_term(prev_log_index)? {
            Some(term) => term,
            None => {
                debug!("entry {} compacted, peer needs a snapshot", prev_log_index);
                return Ok(None);
            }
        };

        let last_index = log.last_log_id()?.index;
        let entries = if next_index <= last_index {
            log.entries(next_index..=last_index, self.max_entries)?
        } else {
            Vec::new()
        };

        Ok(Some(AppendEntriesRequest {
            term,
            leader_id: self.my_id,
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit: commit_index,
        }))
    }

    /// Follower side of AppendEntries. The caller has already checked the
    /// request term and adopted the sender as leader.
    pub fn handle_append_entries(
        &self,
        log: &dyn RaftLog,
        request: AppendEntriesRequest,
        current_term: u64,
        commit_index: u64,
    ) -> Result<FollowerAppendOutcome> {
        let purged = log.purged_log_id()?;
        let last = log.last_log_id()?;

        let reject = |conflict_index: u64| FollowerAppendOutcome {
            response: AppendEntriesResponse {
                term: current_term,
                success: false,
                match_index: 0,
                conflict_index: conflict_index.max(1),
            },
            membership_changed: false,
            commit_index: None,
        };

        if request.prev_log_index > last.index {
            trace!("prev_log_index {} beyond last {}", request.prev_log_index, last.index);
            return Ok(reject(last.index + 1));
        }
        if request.prev_log_index >= purged.index {
            match log.entry_term(request.prev_log_index)? {
                Some(term) if term == request.prev_log_term => {}
                _ => {
                    debug!(
                        "log mismatch at prev_log_index {} (leader term {})",
                        request.prev_log_index, request.prev_log_term
                    );
                    return Ok(reject(request.prev_log_index));
                }
            }
        }

        let match_index = request.prev_log_index + request.entries.len() as u64;
        let mut membership_changed = false;
        let mut to_append = Vec::new();
        for entry in request.entries {
            if entry.index <= purged.index {
                continue;
            }
            if !to_append.is_empty() {
                to_append.push(entry);
                continue;
            }
            match log.entry_term(entry.index)? {
                Some(term) if term == entry.term => continue,
                Some(term) => {
                    if entry.index <= commit_index {
                        warn!("leader conflicts with committed entry {}", entry.index);
                        return Err(ReplicationError::LogConflict {
                            index: entry.index,
                            expected_term: entry.term,
                            actual_term: term,
                        }
                        .into());
                    }
                    debug!("truncate conflicting suffix from {}", entry.index);
                    log.truncate_from(entry.index)?;
                    membership_changed = true;
                    to_append.push(entry);
                }
                None => to_append.push(entry),
            }
        }

        if to_append.iter().any(|e| e.is_config()) {
            membership_changed = true;
        }
        log.append(&to_append)?;

        let new_commit = request.leader_commit.min(match_index);
        Ok(FollowerAppendOutcome {
            response: AppendEntriesResponse {
                term: current_term,
                success: true,
                match_index,
                conflict_index: 0,
            },
            membership_changed,
            commit_index: (new_commit > commit_index).then_some(new_commit),
        })
    }

    /// Leader side: folds a successful or rejected AppendEntries answer into
    /// the peer's progress.
    pub fn handle_append_response(
        &self,
        progress: &mut PeerProgress,
        response: &AppendEntriesResponse,
    ) {
        progress.inflight = false;
        if response.success {
            progress.match_index = progress.match_index.max(response.match_index);
            progress.next_index = progress.match_index + 1;
        } else {
            let backed_off = response
                .conflict_index
                .min(progress.next_index.saturating_sub(1))
                .max(progress.match_index + 1);
            progress.next_index = backed_off;
        }
    }

    /// Highest index replicated on a majority of `voters` whose entry belongs
    /// to `current_term` (§5.4.2), if it is beyond `commit_index`.
    pub fn calculate_commit_index(
        &self,
        log: &dyn RaftLog,
        current_term: u64,
        commit_index: u64,
        voters: &BTreeSet<u64>,
        progress: &BTreeMap<u64, PeerProgress>,
    ) -> Result<Option<u64>> {
        if voters.is_empty() {
            return Ok(None);
        }
        let leader_last_index = log.last_log_id()?.index;
        let mut matched: Vec<u64> = voters
            .iter()
            .map(|id| {
                if *id == self.my_id {
                    leader_last_index
                } else {
                    progress.get(id).map(|p| p.match_index).unwrap_or(0)
                }
            })
            .collect();
        matched.sort_unstable_by(|a, b| b.cmp(a));

        let quorum_index = matched[majority_count(matched.len()) - 1];
        if quorum_index > commit_index && log.entry_term(quorum_index)? == Some(current_term) {
            return Ok(Some(quorum_index));
        }
        Ok(None)
    }
}
