use std::path::Path;

use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

use crate::JournalNodeConfig;
use crate::NodeMeta;
use crate::RaftConfig;

static LOGGER_INIT: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Raft timings short enough for in-process clusters
pub fn fast_raft_config() -> RaftConfig {
    let mut config = RaftConfig::default();
    config.election.election_timeout_min = 150;
    config.election.election_timeout_max = 300;
    config.replication.rpc_append_entries_clock_in_ms = 30;
    config.proposal_timeout_ms = 2000;
    config
}

/// One voter placement group with ephemeral listeners rooted at `dir`
pub fn single_node_settings(dir: &Path) -> JournalNodeConfig {
    let mut settings = JournalNodeConfig::default();
    settings.cluster.node_id = 1;
    settings.cluster.db_root_dir = dir.join("db");
    settings.cluster.log_dir = dir.join("logs");
    settings.cluster.raft_listen_address = "127.0.0.1:0".parse().unwrap();
    settings.cluster.journal_listen_address = "127.0.0.1:0".parse().unwrap();
    settings.cluster.initial_cluster = vec![NodeMeta {
        id: 1,
        address: "127.0.0.1:0".to_string(),
    }];
    settings.raft = fast_raft_config();
    settings.raft.node_heartbeat_interval_ms = 50;
    settings
}
