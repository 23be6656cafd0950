use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Raft plane node descriptor: where a placement member serves Raft RPCs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NodeMeta {
    pub id: u64,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    #[serde(default = "default_node_id")]
    pub node_id: u64,

    /// Namespace of idempotency records and consumer offsets
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Journal protocol listener
    #[serde(default = "default_journal_addr")]
    pub journal_listen_address: SocketAddr,

    /// Placement Raft RPC listener
    #[serde(default = "default_raft_addr")]
    pub raft_listen_address: SocketAddr,

    /// Voting members of the placement Raft group at bootstrap
    #[serde(default = "default_initial_cluster")]
    pub initial_cluster: Vec<NodeMeta>,

    /// Join the placement group as a learner instead of a voter
    #[serde(default)]
    pub join_as_learner: bool,

    #[serde(default = "default_db_dir")]
    pub db_root_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            cluster_name: default_cluster_name(),
            journal_listen_address: default_journal_addr(),
            raft_listen_address: default_raft_addr(),
            initial_cluster: default_initial_cluster(),
            join_as_learner: false,
            db_root_dir: default_db_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl ClusterConfig {
    /// Validates cluster configuration consistency
    pub fn validate(&self) -> Result<()> {
        if self.node_id == 0 {
            return Err(Error::Config(ConfigError::Message(
                "node_id cannot be 0 (reserved for invalid nodes)".into(),
            )));
        }

        if self.cluster_name.is_empty() {
            return Err(Error::Config(ConfigError::Message("cluster_name cannot be empty".into())));
        }

        if self.initial_cluster.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "initial_cluster must contain at least one node".into(),
            )));
        }

        if !self.join_as_learner && !self.initial_cluster.iter().any(|n| n.id == self.node_id) {
            return Err(Error::Config(ConfigError::Message(format!(
                "Current node {} not found in initial_cluster",
                self.node_id
            ))));
        }

        let mut ids = std::collections::HashSet::new();
        for node in &self.initial_cluster {
            if !ids.insert(node.id) {
                return Err(Error::Config(ConfigError::Message(format!(
                    "Duplicate node_id {} in initial_cluster",
                    node.id
                ))));
            }
        }

        if self.journal_listen_address.port() == 0 || self.raft_listen_address.port() == 0 {
            return Err(Error::Config(ConfigError::Message(
                "listen addresses must specify a non-zero port".into(),
            )));
        }

        if self.journal_listen_address == self.raft_listen_address {
            return Err(Error::Config(ConfigError::Message(
                "journal_listen_address and raft_listen_address must differ".into(),
            )));
        }

        validate_directory(&self.db_root_dir, "db_root_dir")?;
        validate_directory(&self.log_dir, "log_dir")?;

        Ok(())
    }

    /// Segment files and their index live under this directory
    pub fn journal_data_dir(&self) -> PathBuf {
        self.db_root_dir.join("journal").join(self.node_id.to_string())
    }

    /// Placement Raft log, hard state and snapshots live under this directory
    pub fn raft_data_dir(&self) -> PathBuf {
        self.db_root_dir.join("placement").join(self.node_id.to_string())
    }

    pub fn peer_address(
        &self,
        id: u64,
    ) -> Option<&str> {
        self.initial_cluster
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.address.as_str())
    }
}

/// Ensures directory path is valid and writable
pub(super) fn validate_directory(
    path: &Path,
    name: &str,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::Config(ConfigError::Message(format!(
            "{} path cannot be empty",
            name
        ))));
    }

    #[cfg(not(test))]
    {
        use std::fs;
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                Error::Config(ConfigError::Message(format!(
                    "Failed to create {} directory at {}: {}",
                    name,
                    path.display(),
                    e
                )))
            })?;
        }

        let test_file = path.join(".permission_test");
        fs::write(&test_file, b"test").map_err(|e| {
            Error::Config(ConfigError::Message(format!(
                "No write permission in {} directory {}: {}",
                name,
                path.display(),
                e
            )))
        })?;
        fs::remove_file(&test_file).ok();
    }

    Ok(())
}

fn default_node_id() -> u64 {
    1
}
fn default_cluster_name() -> String {
    "journal-cluster".to_string()
}
fn default_initial_cluster() -> Vec<NodeMeta> {
    vec![NodeMeta {
        id: 1,
        address: "127.0.0.1:9081".to_string(),
    }]
}
fn default_journal_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3110))
}
fn default_raft_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9081))
}
fn default_db_dir() -> PathBuf {
    PathBuf::from("/tmp/journal/db")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/journal/logs")
}
