//! Core model in Raft: RaftLog Definition

use std::ops::RangeInclusive;

#[cfg(test)]
use mockall::automock;
use sled::Batch;
use tracing::debug;
use tracing::trace;

use crate::convert::safe_kv;
use crate::convert::safe_vk;
use crate::raft::Entry;
use crate::raft::LogId;
use crate::Result;
use crate::StorageError;

pub(crate) const RAFT_LOG_TREE: &str = "raft_log";
const RAFT_LOG_META_TREE: &str = "raft_log_meta";
const PURGED_KEY: &[u8] = b"purged";

#[cfg_attr(test, automock)]
pub trait RaftLog: Send + Sync + 'static {
    fn entry(
        &self,
        index: u64,
    ) -> Result<Option<Entry>>;

    /// Term at `index`, also answering for the last purged index
    fn entry_term(
        &self,
        index: u64,
    ) -> Result<Option<u64>>;

    /// Id of the last entry; falls back to the last purged id when the log
    /// is empty
    fn last_log_id(&self) -> Result<LogId>;

    /// Id of the last entry removed by compaction
    fn purged_log_id(&self) -> Result<LogId>;

    /// Entries in `range`, at most `max_entries` of them
    fn entries(
        &self,
        range: RangeInclusive<u64>,
        max_entries: usize,
    ) -> Result<Vec<Entry>>;

    fn append(
        &self,
        entries: &[Entry],
    ) -> Result<()>;

    /// Removes `index` and everything after it
    fn truncate_from(
        &self,
        index: u64,
    ) -> Result<()>;

    /// Removes everything up to and including `log_id.index`
    fn purge_up_to(
        &self,
        log_id: LogId,
    ) -> Result<()>;

    fn flush(&self) -> Result<()>;
}

pub struct SledRaftLog {
    tree: sled::Tree,
    meta: sled::Tree,
}

impl std::fmt::Debug for SledRaftLog {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledRaftLog").field("tree_len", &self.tree.len()).finish()
    }
}

impl SledRaftLog {
    pub fn new(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(RAFT_LOG_TREE)?,
            meta: db.open_tree(RAFT_LOG_META_TREE)?,
        })
    }

    fn decode(bytes: &[u8]) -> Result<Entry> {
        bincode::deserialize(bytes).map_err(|e| StorageError::BincodeError(e).into())
    }
}

impl RaftLog for SledRaftLog {
    fn entry(
        &self,
        index: u64,
    ) -> Result<Option<Entry>> {
        match self.tree.get(safe_kv(index))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn entry_term(
        &self,
        index: u64,
    ) -> Result<Option<u64>> {
        if let Some(entry) = self.entry(index)? {
            return Ok(Some(entry.term));
        }
        let purged = self.purged_log_id()?;
        if index == purged.index {
            return Ok(Some(purged.term));
        }
        Ok(None)
    }

    fn last_log_id(&self) -> Result<LogId> {
        match self.tree.last()? {
            Some((_, bytes)) => Ok(Self::decode(&bytes)?.log_id()),
            None => self.purged_log_id(),
        }
    }

    fn purged_log_id(&self) -> Result<LogId> {
        match self.meta.get(PURGED_KEY)? {
            Some(bytes) => Ok(bincode::deserialize(&bytes).map_err(StorageError::BincodeError)?),
            None => Ok(LogId::default()),
        }
    }

    fn entries(
        &self,
        range: RangeInclusive<u64>,
        max_entries: usize,
    ) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for item in self
            .tree
            .range(safe_kv(*range.start())..=safe_kv(*range.end()))
            .take(max_entries)
        {
            let (_, bytes) = item?;
            entries.push(Self::decode(&bytes)?);
        }
        Ok(entries)
    }

    fn append(
        &self,
        entries: &[Entry],
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut batch = Batch::default();
        for entry in entries {
            let bytes = bincode::serialize(entry).map_err(StorageError::BincodeError)?;
            batch.insert(safe_kv(entry.index).to_vec(), bytes);
        }
        self.tree.apply_batch(batch)?;
        trace!(
            "appended raft log entries [{}..={}]",
            entries[0].index,
            entries[entries.len() - 1].index
        );
        Ok(())
    }

    fn truncate_from(
        &self,
        index: u64,
    ) -> Result<()> {
        let mut batch = Batch::default();
        for item in self.tree.range(safe_kv(index)..) {
            let (key, _) = item?;
            batch.remove(key);
        }
        self.tree.apply_batch(batch)?;
        debug!("truncated raft log from index {}", index);
        Ok(())
    }

    fn purge_up_to(
        &self,
        log_id: LogId,
    ) -> Result<()> {
        let mut batch = Batch::default();
        for item in self.tree.range(..=safe_kv(log_id.index)) {
            let (key, _) = item?;
            trace!("purge raft log index {}", safe_vk(&key)?);
            batch.remove(key);
        }
        self.meta.insert(
            PURGED_KEY,
            bincode::serialize(&log_id).map_err(StorageError::BincodeError)?,
        )?;
        self.tree.apply_batch(batch)?;
        debug!("purged raft log up to {}", log_id);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        self.meta.flush()?;
        Ok(())
    }
}
