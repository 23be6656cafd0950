use std::sync::Arc;

use super::*;
use crate::placement::MetadataCommand;
use crate::placement::MetadataResponse;
use crate::placement::MockMetadataClient;
use crate::test_utils::LocalMetadataClient;
use crate::Error;
use crate::NetworkError;

fn tracker() -> OffsetTracker {
    OffsetTracker::new("c1", Arc::new(LocalMetadataClient::new()))
}

/// # Case 1: first sighting records the pair
/// # Case 2: retry of the same pair is a duplicate
/// # Case 3: other producers are independent
#[tokio::test]
async fn test_check_and_record() {
    let tracker = tracker();

    // Case 1
    assert!(!tracker.check_and_record("p1", 1).await.unwrap().duplicate);
    assert!(tracker.exists("p1", 1).await.unwrap());

    // Case 2
    assert!(tracker.check_and_record("p1", 1).await.unwrap().duplicate);

    // Case 3
    assert!(!tracker.check_and_record("p2", 1).await.unwrap().duplicate);
    assert!(!tracker.check_and_record("p1", 2).await.unwrap().duplicate);
}

#[tokio::test]
async fn test_concurrent_check_and_record_admits_one() {
    let tracker = Arc::new(tracker());
    let mut tasks = Vec::new();
    for _ in 0..16 {
        let tracker = tracker.clone();
        tasks.push(tokio::spawn(
            async move { tracker.check_and_record("p1", 9).await.unwrap() },
        ));
    }
    let mut fresh = 0;
    for task in tasks {
        if !task.await.unwrap().duplicate {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1);
}

#[tokio::test]
async fn test_delete_is_advisory() {
    let tracker = tracker();
    tracker.delete("p1", 1).await.unwrap();
    tracker.check_and_record("p1", 1).await.unwrap();
    tracker.delete("p1", 1).await.unwrap();
    assert!(!tracker.exists("p1", 1).await.unwrap());
    assert!(!tracker.check_and_record("p1", 1).await.unwrap().duplicate);
}

#[tokio::test]
async fn test_offsets_per_group() {
    let tracker = tracker();
    tracker.save_offset("g1", "ns", "a", 10).await.unwrap();
    tracker.save_offset("g1", "ns", "a", 4).await.unwrap();
    tracker.save_offset("g1", "ns", "b", 7).await.unwrap();
    tracker.save_offset("g2", "ns", "a", 99).await.unwrap();

    let offsets = tracker.get_offset("g1").await.unwrap();
    assert_eq!(offsets.len(), 2);
    assert_eq!(tracker.shard_offset("g1", "ns", "a").await.unwrap(), Some(4));
    assert_eq!(tracker.shard_offset("g1", "ns", "c").await.unwrap(), None);
    assert!(tracker.get_offset("unknown").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_metadata_failure_propagates() {
    let mut metadata = MockMetadataClient::new();
    metadata.expect_write().returning(|command| match command {
        MetadataCommand::IdempotentSetIfAbsent { .. } => Err(NetworkError::ConnectionClosed("leader".to_string()).into()),
        _ => Ok(MetadataResponse::Done),
    });
    let tracker = OffsetTracker::new("c1", Arc::new(metadata));
    assert!(matches!(
        tracker.check_and_record("p1", 1).await,
        Err(Error::System(_))
    ));
    tracker.save_offset("g", "ns", "s", 1).await.unwrap();
}
