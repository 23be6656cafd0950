use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct BackoffPolicy {
    /// Maximum number of attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{}.max_retries must be > 0",
                name
            ))));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{}.base_delay_ms must not exceed max_delay_ms",
                name
            ))));
        }
        Ok(())
    }
}

/// Divide strategies by business domain
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    // Log replication strategy (AppendEntries RPC)
    #[serde(default = "default_append_entries")]
    pub append_entries: BackoffPolicy,

    // Election strategy (RequestVote RPC)
    #[serde(default = "default_election")]
    pub election: BackoffPolicy,

    // Remote metadata client following leader redirects
    #[serde(default = "default_metadata_client")]
    pub metadata_client: BackoffPolicy,

    // Local segment append retried on io failure
    #[serde(default = "default_journal_io")]
    pub journal_io: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            append_entries: default_append_entries(),
            election: default_election(),
            metadata_client: default_metadata_client(),
            journal_io: default_journal_io(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.append_entries.validate("append_entries")?;
        self.election.validate("election")?;
        self.metadata_client.validate("metadata_client")?;
        self.journal_io.validate("journal_io")?;
        Ok(())
    }
}

fn default_append_entries() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 1,
        timeout_ms: 100,
        base_delay_ms: 10,
        max_delay_ms: 100,
    }
}
fn default_election() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 1,
        timeout_ms: 200,
        base_delay_ms: 10,
        max_delay_ms: 100,
    }
}
fn default_metadata_client() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 5,
        timeout_ms: 3000,
        base_delay_ms: 100,
        max_delay_ms: 2000,
    }
}
fn default_journal_io() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        timeout_ms: 1000,
        base_delay_ms: 5,
        max_delay_ms: 50,
    }
}
fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    100
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
