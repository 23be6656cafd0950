//! Core model in Raft: StateStorage Definition, persistent state: e.g.
//! current_term, membership and the latest snapshot

#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::raft::HardState;
use crate::raft::Membership;
use crate::raft::SnapshotMeta;
use crate::Result;
use crate::StorageError;

const RAFT_STATE_TREE: &str = "raft_state";
const HARD_STATE_KEY: &[u8] = b"hard_state";
const MEMBERSHIP_KEY: &[u8] = b"membership";
const SNAPSHOT_META_KEY: &[u8] = b"snapshot_meta";
const SNAPSHOT_DATA_KEY: &[u8] = b"snapshot_data";

#[cfg_attr(test, automock)]
pub trait StateStorage: Send + Sync + 'static {
    /// When node restarts, check if there is stored state from disk
    fn load_hard_state(&self) -> Result<Option<HardState>>;

    /// Persisted and flushed before the call returns
    fn save_hard_state(
        &self,
        hard_state: &HardState,
    ) -> Result<()>;

    fn load_membership(&self) -> Result<Option<Membership>>;

    fn save_membership(
        &self,
        membership: &Membership,
    ) -> Result<()>;

    fn load_snapshot(&self) -> Result<Option<(SnapshotMeta, Vec<u8>)>>;

    fn save_snapshot(
        &self,
        meta: &SnapshotMeta,
        data: &[u8],
    ) -> Result<()>;
}

pub struct SledStateStorage {
    tree: sled::Tree,
}

impl std::fmt::Debug for SledStateStorage {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledStateStorage").finish()
    }
}

impl SledStateStorage {
    pub fn new(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(RAFT_STATE_TREE)?,
        })
    }

    fn get<T: DeserializeOwned>(
        &self,
        key: &[u8],
    ) -> Result<Option<T>> {
        match self.tree.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(StorageError::BincodeError)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(
        &self,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let bytes = bincode::serialize(value).map_err(StorageError::BincodeError)?;
        self.tree.insert(key, bytes)?;
        self.tree.flush()?;
        Ok(())
    }
}

impl StateStorage for SledStateStorage {
    fn load_hard_state(&self) -> Result<Option<HardState>> {
        self.get(HARD_STATE_KEY)
    }

    fn save_hard_state(
        &self,
        hard_state: &HardState,
    ) -> Result<()> {
        debug!("persist hard state: {:?}", hard_state);
        self.put(HARD_STATE_KEY, hard_state)
    }

    fn load_membership(&self) -> Result<Option<Membership>> {
        self.get(MEMBERSHIP_KEY)
    }

    fn save_membership(
        &self,
        membership: &Membership,
    ) -> Result<()> {
        self.put(MEMBERSHIP_KEY, membership)
    }

    fn load_snapshot(&self) -> Result<Option<(SnapshotMeta, Vec<u8>)>> {
        let meta: Option<SnapshotMeta> = self.get(SNAPSHOT_META_KEY)?;
        let data = self.tree.get(SNAPSHOT_DATA_KEY)?;
        match (meta, data) {
            (Some(meta), Some(data)) => Ok(Some((meta, data.to_vec()))),
            _ => Ok(None),
        }
    }

    /// Meta and data go in one atomic batch
    fn save_snapshot(
        &self,
        meta: &SnapshotMeta,
        data: &[u8],
    ) -> Result<()> {
        let mut batch = sled::Batch::default();
        batch.insert(
            SNAPSHOT_META_KEY,
            bincode::serialize(meta).map_err(StorageError::BincodeError)?,
        );
        batch.insert(SNAPSHOT_DATA_KEY, data.to_vec());
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        debug!("snapshot saved at {}", meta.last_included);
        Ok(())
    }
}
