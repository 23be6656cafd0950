//! Segment Store: per-segment append-only record files plus their indices.
//!
//! A segment file lives at `<data_dir>/<namespace>/<shard>/<segment_no>.msg`
//! and holds CRC-checked frames of prost-encoded [`JournalRecord`]s. The
//! offset, timestamp, key and tag indices of every segment on this node live
//! in one sled database (`<data_dir>/index`).
//!
//! Offsets inside a segment are contiguous: the first record gets the
//! segment's `start_offset`, every append takes the next one. A reader only
//! ever observes offsets below the published `end_offset`.
//!
//! [`JournalRecord`]: crate::proto::journal_record::JournalRecord

mod file;
mod index;
mod segment;
mod store;

pub use file::*;
pub use index::*;
pub use segment::*;
pub use store::*;

#[cfg(test)]
mod segment_test;

use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::JournalConfig;
use crate::JournalError;

/// `(namespace, shard_name, segment_no)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentIdentity {
    pub namespace: String,
    pub shard_name: String,
    pub segment_no: u32,
}

impl SegmentIdentity {
    pub fn new(
        namespace: &str,
        shard_name: &str,
        segment_no: u32,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            shard_name: shard_name.to_string(),
            segment_no,
        }
    }

    /// `<namespace>/<shard>` key of the owning shard
    pub fn shard_key(&self) -> String {
        shard_key(&self.namespace, &self.shard_name)
    }

    pub fn file_path(
        &self,
        data_dir: &Path,
    ) -> PathBuf {
        shard_dir(data_dir, &self.namespace, &self.shard_name).join(format!("{}.msg", self.segment_no))
    }
}

impl fmt::Display for SegmentIdentity {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.shard_name, self.segment_no)
    }
}

pub fn shard_key(
    namespace: &str,
    shard_name: &str,
) -> String {
    format!("{}/{}", namespace, shard_name)
}

/// Namespace and shard names become one directory level each under the
/// data dir and one component of the shard key.
pub fn validate_shard_name(
    namespace: &str,
    shard_name: &str,
) -> std::result::Result<(), JournalError> {
    for (field, name) in [("namespace", namespace), ("shard_name", shard_name)] {
        if name.is_empty() || name == "." || name == ".." {
            return Err(JournalError::InvalidShardName(format!("{} {:?}", field, name)));
        }
        if name.contains(|c: char| matches!(c, '/' | '\\' | '\0')) {
            return Err(JournalError::InvalidShardName(format!(
                "{} {:?} contains a path separator or NUL",
                field, name
            )));
        }
    }
    Ok(())
}

pub fn shard_dir(
    data_dir: &Path,
    namespace: &str,
    shard_name: &str,
) -> PathBuf {
    data_dir.join(namespace).join(shard_name)
}

/// Limits of one segment
#[derive(Debug, Clone, Copy)]
pub struct SegmentConfig {
    pub max_bytes: u64,
    pub max_records: u64,
    pub flush_on_append: bool,
}

impl From<&JournalConfig> for SegmentConfig {
    fn from(config: &JournalConfig) -> Self {
        Self {
            max_bytes: config.segment_max_bytes,
            max_records: config.segment_max_records,
            flush_on_append: config.flush_on_append,
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        SegmentConfig::from(&JournalConfig::default())
    }
}

/// Read budget of a single read call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimit {
    /// Stop once this many payload bytes are collected (the first record is
    /// always returned)
    pub max_size: u64,
    pub max_records: u64,
}

impl ReadLimit {
    pub fn new(
        max_size: u64,
        max_records: u64,
    ) -> Self {
        Self { max_size, max_records }
    }
}
