use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Segment store limits and request path defaults
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JournalConfig {
    /// A segment reports `SegmentFull` once its file would grow past this size
    #[serde(default = "default_segment_max_bytes")]
    pub segment_max_bytes: u64,

    /// A segment reports `SegmentFull` once it holds this many records
    #[serde(default = "default_segment_max_records")]
    pub segment_max_records: u64,

    /// Read budget used when a read request carries `max_size = 0`
    #[serde(default = "default_read_max_size")]
    pub default_read_max_size: u64,

    /// Record budget used when a read request carries `max_record = 0`
    #[serde(default = "default_read_max_records")]
    pub default_read_max_records: u64,

    /// fsync the segment file after every append
    #[serde(default)]
    pub flush_on_append: bool,

    /// Delay between the tombstone and the data removal of a deleted shard
    #[serde(default = "default_shard_gc_delay_ms")]
    pub shard_gc_delay_ms: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            segment_max_bytes: default_segment_max_bytes(),
            segment_max_records: default_segment_max_records(),
            default_read_max_size: default_read_max_size(),
            default_read_max_records: default_read_max_records(),
            flush_on_append: false,
            shard_gc_delay_ms: default_shard_gc_delay_ms(),
        }
    }
}

impl JournalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.segment_max_bytes == 0 {
            return Err(Error::Config(ConfigError::Message("segment_max_bytes must be > 0".into())));
        }

        if self.segment_max_records == 0 {
            return Err(Error::Config(ConfigError::Message(
                "segment_max_records must be > 0".into(),
            )));
        }

        if self.default_read_max_size == 0 || self.default_read_max_records == 0 {
            return Err(Error::Config(ConfigError::Message(
                "default read limits must be > 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_segment_max_bytes() -> u64 {
    1024 * 1024 * 1024
}
fn default_segment_max_records() -> u64 {
    10_000_000
}
fn default_read_max_size() -> u64 {
    1024 * 1024
}
fn default_read_max_records() -> u64 {
    100
}
fn default_shard_gc_delay_ms() -> u64 {
    1000
}
