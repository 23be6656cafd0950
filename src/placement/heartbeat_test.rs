use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::*;

fn node(
    id: u64,
    last_heartbeat: u64,
) -> BrokerNode {
    BrokerNode {
        node_id: id,
        address: format!("127.0.0.1:{}", 9000 + id),
        cluster_type: ClusterType::JournalServer,
        register_time: 0,
        last_heartbeat,
    }
}

/// # Case 1: a quiet node becomes suspect once
/// # Case 2: it is not reported again while still quiet
/// # Case 3: a fresh heartbeat clears it
#[test]
fn test_monitor_reports_quiet_nodes() {
    let mut monitor = HeartbeatMonitor::new(1000, 3);

    // Case 1
    let suspects = monitor.check(&[node(1, 0), node(2, 9_000)], 10_000);
    assert_eq!(suspects, vec![1]);
    assert_eq!(monitor.suspects(), vec![1]);

    // Case 2
    let suspects = monitor.check(&[node(1, 0), node(2, 10_500)], 11_000);
    assert!(suspects.is_empty());
    assert_eq!(monitor.suspects(), vec![1]);

    // Case 3
    let suspects = monitor.check(&[node(1, 11_500), node(2, 11_500)], 12_000);
    assert!(suspects.is_empty());
    assert!(monitor.suspects().is_empty());
}

#[test]
fn test_monitor_below_threshold() {
    let mut monitor = HeartbeatMonitor::new(1000, 3);
    assert!(monitor.check(&[node(1, 8_000)], 10_999).is_empty());
    assert_eq!(monitor.check(&[node(1, 8_000)], 11_000), vec![1]);
}

#[tokio::test]
async fn test_sender_registers_then_heartbeats() {
    let client = Arc::new(crate::test_utils::LocalMetadataClient::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let task = tokio::spawn(run_heartbeat_sender(
        client.clone(),
        ClusterType::JournalServer,
        7,
        "127.0.0.1:1771".to_string(),
        20,
        shutdown_rx,
    ));

    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown_tx.send(()).unwrap();
    task.await.unwrap();

    let nodes = match client
        .read(MetadataQuery::ListNodes {
            cluster_type: Some(ClusterType::JournalServer),
        })
        .await
        .unwrap()
    {
        MetadataResponse::Nodes(nodes) => nodes,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].node_id, 7);
    assert!(nodes[0].last_heartbeat > nodes[0].register_time);
}
