//! sled-backed persistence shared by the segment indices and the placement
//! Raft node.

mod raft_log;
mod state_storage;


use std::path::Path;

pub use raft_log::*;
pub use state_storage::*;
use tracing::debug;
use tracing::warn;

use crate::Result;
use crate::StorageError;

/// Segment indices of every segment hosted on this node:
/// `<data_dir>/index`
pub fn init_sled_index_db(data_dir: impl AsRef<Path> + std::fmt::Debug) -> Result<sled::Db> {
    debug!("init_sled_index_db from path: {:?}", &data_dir);

    let index_db_path = data_dir.as_ref().join("index");
    sled::Config::default()
        .path(&index_db_path)
        .cache_capacity(64 * 1024 * 1024) //64MB
        .flush_every_ms(Some(100))
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!(
                "Try to open DB at this location: {:?} and failed: {:?}",
                index_db_path, e
            );
            StorageError::DbError(e.to_string()).into()
        })
}

/// Raft log, hard state and snapshot of the placement node:
/// `<raft_data_dir>/raft`
pub fn init_sled_raft_db(raft_data_dir: impl AsRef<Path> + std::fmt::Debug) -> Result<sled::Db> {
    debug!("init_sled_raft_db from path: {:?}", &raft_data_dir);

    let raft_db_path = raft_data_dir.as_ref().join("raft");
    sled::Config::default()
        .path(&raft_db_path)
        .cache_capacity(32 * 1024 * 1024) //32MB
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!(
                "Try to open DB at this location: {:?} and failed: {:?}",
                raft_db_path, e
            );
            StorageError::DbError(e.to_string()).into()
        })
}
