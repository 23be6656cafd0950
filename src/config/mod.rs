//! Configuration management for a journal engine node.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`JOURNAL__` prefix)
//! - Component-wise validation
mod cluster;
mod journal;
mod monitoring;
mod network;
mod raft;
mod retry;
pub use cluster::*;
pub use journal::*;
pub use monitoring::*;
pub use network::*;
pub use raft::*;
pub use retry::*;

#[cfg(test)]
mod config_test;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix of every override, e.g. `JOURNAL__CLUSTER__NODE_ID`
pub const ENV_PREFIX: &str = "JOURNAL";

/// Main configuration container of a journal engine node
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct JournalNodeConfig {
    /// Cluster topology and node identity
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Segment store and request path limits
    #[serde(default)]
    pub journal: JournalConfig,
    /// Placement Raft parameters
    #[serde(default)]
    pub raft: RaftConfig,
    /// Socket and frame limits
    #[serde(default)]
    pub network: NetworkConfig,
    /// Retry policies for distributed and storage operations
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Prometheus endpoint
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Debug for JournalNodeConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("JournalNodeConfig")
            .field("cluster", &self.cluster)
            .field("journal", &self.journal)
            .finish()
    }
}

impl JournalNodeConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `JOURNAL__` prefix
    ///
    /// Callers MUST call [`JournalNodeConfig::validate`] before using the result.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Environment variables are layered again on top so they keep the
    /// highest priority.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every subsystem and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.cluster.validate()?;
        self.journal.validate()?;
        self.raft.validate()?;
        self.network.validate()?;
        self.retry.validate()?;
        self.monitoring.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
