use std::collections::BTreeSet;

use tracing::debug;

use super::HardState;
use super::LogId;
use super::VoteRequest;
use super::VoteResponse;
use crate::cluster::is_majority;

/// Election rules of §5.2 and §5.4.1 of the Raft paper.
#[derive(Debug, Clone)]
pub struct ElectionHandler {
    pub(crate) my_id: u64,
}

impl ElectionHandler {
    pub fn new(my_id: u64) -> Self {
        Self { my_id }
    }

    pub fn build_vote_request(
        &self,
        term: u64,
        last_log: LogId,
    ) -> VoteRequest {
        VoteRequest {
            term,
            candidate_id: self.my_id,
            last_log_index: last_log.index,
            last_log_term: last_log.term,
        }
    }

    /// Decides a vote request.
    ///
    /// Returns the response and, when the vote is granted, the hard state
    /// that must be persisted before the response is sent. The caller has
    /// already adopted a higher request term.
    pub fn handle_vote_request(
        &self,
        request: &VoteRequest,
        hard_state: HardState,
        last_log: LogId,
    ) -> (VoteResponse, Option<HardState>) {
        let granted = self.check_vote_request_is_legal(request, hard_state, last_log);
        debug!(
            "vote request from {} term {}: granted={}",
            request.candidate_id, request.term, granted
        );

        let response = VoteResponse {
            term: hard_state.current_term,
            vote_granted: granted,
        };
        if granted && hard_state.voted_for != Some(request.candidate_id) {
            return (
                response,
                Some(HardState {
                    current_term: hard_state.current_term,
                    voted_for: Some(request.candidate_id),
                }),
            );
        }
        (response, None)
    }

    pub fn check_vote_request_is_legal(
        &self,
        request: &VoteRequest,
        hard_state: HardState,
        last_log: LogId,
    ) -> bool {
        if request.term < hard_state.current_term {
            return false;
        }
        if let Some(voted_for) = hard_state.voted_for {
            if voted_for != request.candidate_id {
                return false;
            }
        }
        is_candidate_log_up_to_date(request.last_log_term, request.last_log_index, last_log)
    }

    /// Whether `votes` form a majority of `voters`
    pub fn has_quorum(
        votes: &BTreeSet<u64>,
        voters: &BTreeSet<u64>,
    ) -> bool {
        let granted = votes.intersection(voters).count();
        !voters.is_empty() && is_majority(granted, voters.len())
    }
}

/// Candidate's log is at least as up-to-date as ours
pub fn is_candidate_log_up_to_date(
    candidate_last_term: u64,
    candidate_last_index: u64,
    local_last: LogId,
) -> bool {
    candidate_last_term > local_last.term
        || (candidate_last_term == local_last.term && candidate_last_index >= local_last.index)
}
