use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::BrokerNode;
use super::ClusterType;
use super::MetadataClient;
use super::MetadataCommand;
use super::MetadataQuery;
use super::MetadataResponse;
use crate::raft::RaftNode;
use crate::time::timestamp_millis;
use crate::Error;
use crate::JournalError;
use crate::HEARTBEAT_MISSES;
use crate::SUSPECT_NODES;

/// Tracks committed heartbeats and reports nodes that went quiet.
///
/// Suspects are only reported; unregistering stays administrative.
pub struct HeartbeatMonitor {
    interval_ms: u64,
    miss_threshold: u32,
    /// node id -> misses already reported
    suspects: HashMap<u64, u64>,
}

impl HeartbeatMonitor {
    pub fn new(
        interval_ms: u64,
        miss_threshold: u32,
    ) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            miss_threshold: miss_threshold.max(1),
            suspects: HashMap::new(),
        }
    }

    /// Returns the nodes that became suspect since the previous check.
    pub fn check(
        &mut self,
        nodes: &[BrokerNode],
        now: u64,
    ) -> Vec<u64> {
        let mut newly_suspect = Vec::new();
        let mut current = HashMap::new();
        for node in nodes {
            let misses = now.saturating_sub(node.last_heartbeat) / self.interval_ms;
            if misses < self.miss_threshold as u64 {
                continue;
            }
            let reported = self.suspects.get(&node.node_id).copied().unwrap_or(0);
            if reported == 0 {
                warn!(
                    "node {} ({:?} at {}) missed {} heartbeats",
                    node.node_id, node.cluster_type, node.address, misses
                );
                newly_suspect.push(node.node_id);
            }
            if misses > reported {
                HEARTBEAT_MISSES
                    .with_label_values(&[&node.node_id.to_string()])
                    .inc_by(misses - reported);
            }
            current.insert(node.node_id, misses);
        }
        for id in self.suspects.keys() {
            if !current.contains_key(id) {
                info!("node {} is heartbeating again", id);
            }
        }
        self.suspects = current;
        SUSPECT_NODES.set(self.suspects.len() as i64);
        newly_suspect
    }

    pub fn suspects(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.suspects.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Runs the monitor while this node leads the placement group.
pub async fn run_heartbeat_monitor(
    node: RaftNode,
    client: Arc<dyn MetadataClient>,
    mut monitor: HeartbeatMonitor,
    mut shutdown_signal: watch::Receiver<()>,
) {
    let mut ticker = interval(Duration::from_millis(monitor.interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown_signal.changed() => {
                debug!("heartbeat monitor stopped");
                return;
            }
            _ = ticker.tick() => {
                if !node.status().is_leader() {
                    continue;
                }
                match client.read(MetadataQuery::ListNodes { cluster_type: None }).await {
                    Ok(MetadataResponse::Nodes(nodes)) => {
                        monitor.check(&nodes, timestamp_millis());
                    }
                    Ok(other) => warn!("unexpected node list response: {:?}", other),
                    Err(e) => debug!("list nodes failed: {}", e),
                }
            }
        }
    }
}

/// Registers this node and commits a heartbeat every `interval`.
pub async fn run_heartbeat_sender(
    client: Arc<dyn MetadataClient>,
    cluster_type: ClusterType,
    node_id: u64,
    address: String,
    interval_ms: u64,
    mut shutdown_signal: watch::Receiver<()>,
) {
    let mut ticker = interval(Duration::from_millis(interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut registered = false;
    loop {
        tokio::select! {
            _ = shutdown_signal.changed() => {
                debug!("heartbeat sender stopped");
                return;
            }
            _ = ticker.tick() => {
                let now = timestamp_millis();
                let command = if registered {
                    MetadataCommand::NodeHeartbeat { cluster_type, node_id, time: now }
                } else {
                    MetadataCommand::RegisterNode(BrokerNode {
                        node_id,
                        address: address.clone(),
                        cluster_type,
                        register_time: now,
                        last_heartbeat: now,
                    })
                };
                match client.write(command).await {
                    Ok(_) => {
                        if !registered {
                            info!("node {} registered as {:?} at {}", node_id, cluster_type, address);
                        }
                        registered = true;
                    }
                    Err(Error::Journal(JournalError::NodeNotFound(_))) => {
                        warn!("node {} is no longer registered, registering again", node_id);
                        registered = false;
                    }
                    Err(e) => debug!("heartbeat of node {} failed: {}", node_id, e),
                }
            }
        }
    }
}
