use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Configuration parameters of the placement Raft group
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RaftConfig {
    #[serde(default)]
    pub election: ElectionConfig,

    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Applied entries between two snapshots (and log compactions)
    #[serde(default = "default_snapshot_threshold")]
    pub snapshot_threshold: u64,

    /// Caller deadline of a metadata proposal or linearizable read
    #[serde(default = "default_proposal_timeout_ms")]
    pub proposal_timeout_ms: u64,

    /// How often a journal node commits its liveness heartbeat
    #[serde(default = "default_node_heartbeat_interval_ms")]
    pub node_heartbeat_interval_ms: u64,

    /// Missed heartbeat intervals before a node is reported as suspect
    #[serde(default = "default_heartbeat_miss_threshold")]
    pub heartbeat_miss_threshold: u32,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election: ElectionConfig::default(),
            replication: ReplicationConfig::default(),
            snapshot_threshold: default_snapshot_threshold(),
            proposal_timeout_ms: default_proposal_timeout_ms(),
            node_heartbeat_interval_ms: default_node_heartbeat_interval_ms(),
            heartbeat_miss_threshold: default_heartbeat_miss_threshold(),
        }
    }
}

impl RaftConfig {
    /// Validates all Raft subsystem configurations
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_threshold == 0 {
            return Err(Error::Config(ConfigError::Message(
                "snapshot_threshold must be greater than 0".into(),
            )));
        }

        if self.proposal_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "proposal_timeout_ms must be at least 1ms".into(),
            )));
        }

        if self.node_heartbeat_interval_ms == 0 || self.heartbeat_miss_threshold == 0 {
            return Err(Error::Config(ConfigError::Message(
                "node heartbeat interval and miss threshold must be > 0".into(),
            )));
        }

        self.election.validate()?;
        self.replication.validate()?;

        if self.replication.rpc_append_entries_clock_in_ms >= self.election.election_timeout_min {
            return Err(Error::Config(ConfigError::Message(format!(
                "append interval {}ms must be shorter than election_timeout_min {}ms",
                self.replication.rpc_append_entries_clock_in_ms, self.election.election_timeout_min
            ))));
        }

        Ok(())
    }
}

fn default_snapshot_threshold() -> u64 {
    1000
}
fn default_proposal_timeout_ms() -> u64 {
    3000
}
fn default_node_heartbeat_interval_ms() -> u64 {
    1000
}
fn default_heartbeat_miss_threshold() -> u32 {
    3
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ElectionConfig {
    #[serde(default = "default_election_timeout_min")]
    pub election_timeout_min: u64,

    #[serde(default = "default_election_timeout_max")]
    pub election_timeout_max: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: default_election_timeout_min(),
            election_timeout_max: default_election_timeout_max(),
        }
    }
}

impl ElectionConfig {
    fn validate(&self) -> Result<()> {
        if self.election_timeout_min >= self.election_timeout_max {
            return Err(Error::Config(ConfigError::Message(format!(
                "election_timeout_min {}ms must be less than election_timeout_max {}ms",
                self.election_timeout_min, self.election_timeout_max
            ))));
        }
        Ok(())
    }
}

fn default_election_timeout_min() -> u64 {
    500
}
fn default_election_timeout_max() -> u64 {
    1000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReplicationConfig {
    /// Leader heartbeat / replication clock
    #[serde(default = "default_append_interval")]
    pub rpc_append_entries_clock_in_ms: u64,

    #[serde(default = "default_entries_per_replication")]
    pub append_entries_max_entries_per_replication: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            rpc_append_entries_clock_in_ms: default_append_interval(),
            append_entries_max_entries_per_replication: default_entries_per_replication(),
        }
    }
}

impl ReplicationConfig {
    fn validate(&self) -> Result<()> {
        if self.rpc_append_entries_clock_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "rpc_append_entries_clock_in_ms cannot be 0".into(),
            )));
        }

        if self.append_entries_max_entries_per_replication == 0 {
            return Err(Error::Config(ConfigError::Message(
                "append_entries_max_entries_per_replication must be > 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_append_interval() -> u64 {
    100
}
fn default_entries_per_replication() -> u64 {
    100
}
