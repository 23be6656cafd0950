use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Upper bound of a journal protocol frame (1 GiB)
pub const MAX_JOURNAL_FRAME_SIZE: usize = 1024 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Raft RPC completion timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// Largest accepted journal protocol frame in bytes
    #[serde(default = "default_max_journal_frame")]
    pub max_journal_frame_size: usize,

    /// Largest accepted Raft RPC frame in bytes (snapshots travel in one frame)
    #[serde(default = "default_max_raft_frame")]
    pub max_raft_frame_size: usize,

    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
            max_journal_frame_size: default_max_journal_frame(),
            max_raft_frame_size: default_max_raft_frame(),
            tcp_nodelay: default_tcp_nodelay(),
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_in_ms == 0 || self.request_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "network timeouts must be > 0".into(),
            )));
        }

        if self.max_journal_frame_size == 0 || self.max_journal_frame_size > MAX_JOURNAL_FRAME_SIZE {
            return Err(Error::Config(ConfigError::Message(format!(
                "max_journal_frame_size must be within 1..={}",
                MAX_JOURNAL_FRAME_SIZE
            ))));
        }

        if self.max_raft_frame_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_raft_frame_size must be > 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_connect_timeout() -> u64 {
    500
}
fn default_request_timeout() -> u64 {
    1000
}
fn default_max_journal_frame() -> usize {
    MAX_JOURNAL_FRAME_SIZE
}
fn default_max_raft_frame() -> usize {
    256 * 1024 * 1024
}
fn default_tcp_nodelay() -> bool {
    true
}
