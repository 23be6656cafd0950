use std::collections::BTreeSet;

use super::*;

fn request(
    term: u64,
    candidate_id: u64,
    last_log_index: u64,
    last_log_term: u64,
) -> VoteRequest {
    VoteRequest {
        term,
        candidate_id,
        last_log_index,
        last_log_term,
    }
}

/// # Case 1: fresh term, up-to-date log
/// # Case 2: already voted for another candidate
/// # Case 3: repeated request from the same candidate
/// # Case 4: stale term
#[test]
fn test_handle_vote_request() {
    let handler = ElectionHandler::new(1);
    let last_log = LogId::new(2, 10);
    let fresh = HardState {
        current_term: 3,
        voted_for: None,
    };

    // Case 1
    let (resp, persist) = handler.handle_vote_request(&request(3, 2, 10, 2), fresh, last_log);
    assert!(resp.vote_granted);
    assert_eq!(resp.term, 3);
    assert_eq!(persist.unwrap().voted_for, Some(2));

    // Case 2
    let voted = HardState {
        current_term: 3,
        voted_for: Some(3),
    };
    let (resp, persist) = handler.handle_vote_request(&request(3, 2, 10, 2), voted, last_log);
    assert!(!resp.vote_granted);
    assert!(persist.is_none());

    // Case 3
    let voted = HardState {
        current_term: 3,
        voted_for: Some(2),
    };
    let (resp, persist) = handler.handle_vote_request(&request(3, 2, 10, 2), voted, last_log);
    assert!(resp.vote_granted);
    assert!(persist.is_none());

    // Case 4
    let (resp, _) = handler.handle_vote_request(&request(2, 2, 10, 2), fresh, last_log);
    assert!(!resp.vote_granted);
}

#[test]
fn test_candidate_log_must_be_up_to_date() {
    let local = LogId::new(2, 10);
    assert!(is_candidate_log_up_to_date(3, 1, local));
    assert!(is_candidate_log_up_to_date(2, 10, local));
    assert!(!is_candidate_log_up_to_date(2, 9, local));
    assert!(!is_candidate_log_up_to_date(1, 100, local));
}

#[test]
fn test_has_quorum_counts_only_voters() {
    let voters: BTreeSet<u64> = [1, 2, 3].into_iter().collect();
    assert!(!ElectionHandler::has_quorum(&[1].into_iter().collect(), &voters));
    assert!(ElectionHandler::has_quorum(&[1, 2].into_iter().collect(), &voters));
    // Learner 4 does not count
    assert!(!ElectionHandler::has_quorum(&[1, 4].into_iter().collect(), &voters));

    let single: BTreeSet<u64> = [1].into_iter().collect();
    assert!(ElectionHandler::has_quorum(&[1].into_iter().collect(), &single));
    assert!(!ElectionHandler::has_quorum(&BTreeSet::new(), &BTreeSet::new()));
}
